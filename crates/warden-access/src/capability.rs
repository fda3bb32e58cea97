//! Collaborator contracts the access loop depends on.

use crate::alert::{AlertEvent, DispatchError};
use crate::store::ImageStoreError;
use std::time::Duration;
use thiserror::Error;
use warden_core::{AlignedDescriptor, DetectionSet, FaceBox};
use warden_hw::{Frame, GeoFix};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no frame buffer available")]
    AllocationFailed,
    #[error("capture failed: {0}")]
    Device(String),
}

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("candidate has no landmarks")]
    NoLandmarks,
    #[error("landmarks do not define a usable alignment")]
    Degenerate,
    #[error("descriptor backend failed: {0}")]
    Backend(String),
}

/// Acquires one frame on demand. The frame's buffer is released when the
/// returned [`Frame`] drops.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

/// Locates candidate faces. Internal failures degrade to an empty set.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> DetectionSet;
}

/// Turns one candidate region into a comparable descriptor.
pub trait Aligner {
    fn align(&mut self, frame: &Frame, face: &FaceBox) -> Result<AlignedDescriptor, AlignError>;
}

/// Named reference images (the enrollment photo).
pub trait ImageStore {
    fn read_enrollment_image(&self, name: &str) -> Result<Vec<u8>, ImageStoreError>;
}

/// Local status display and buzzer. Fire-and-forget; failures are swallowed
/// by the implementation.
pub trait Indicator {
    fn show_status(&mut self, message: &str);
    fn pulse_alarm(&mut self, duration: Duration);
}

/// Outbound alert paths. Each call makes at most one delivery attempt.
pub trait AlertDispatcher {
    /// Per-iteration telemetry record.
    fn report(&mut self, event: &AlertEvent) -> Result<(), DispatchError>;
    /// Human-readable intrusion message.
    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError>;
}

/// Where the device is, if known.
pub trait LocationSource {
    fn current_fix(&mut self) -> Option<GeoFix>;
}
