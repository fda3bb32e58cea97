//! Capability implementations over the real camera, models and hardware.

use crate::capability::{
    AlignError, Aligner, CaptureError, Detector, FrameSource, Indicator, LocationSource,
};
use std::time::Duration;
use tracing::{info, warn};
use warden_core::{AlignedDescriptor, DetectionSet, FaceBox, FaceDetector, FaceRecognizer, RecognizerError};
use warden_hw::{Camera, CameraError, Frame, GeoFix, GpsReceiver, SysfsIndicator};

impl From<CameraError> for CaptureError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::BufferExhausted(_) => CaptureError::AllocationFailed,
            other => CaptureError::Device(other.to_string()),
        }
    }
}

impl From<RecognizerError> for AlignError {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::NoLandmarks => AlignError::NoLandmarks,
            RecognizerError::DegenerateLandmarks => AlignError::Degenerate,
            other => AlignError::Backend(other.to_string()),
        }
    }
}

impl FrameSource for Camera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.capture_frame()?)
    }
}

impl Detector for FaceDetector {
    fn detect(&mut self, frame: &Frame) -> DetectionSet {
        match FaceDetector::detect(self, frame.pixels(), frame.width, frame.height) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "detection failed; treating frame as empty");
                DetectionSet::empty()
            }
        }
    }
}

impl Aligner for FaceRecognizer {
    fn align(&mut self, frame: &Frame, face: &FaceBox) -> Result<AlignedDescriptor, AlignError> {
        Ok(self.extract(frame.pixels(), frame.width, frame.height, face)?)
    }
}

impl Indicator for SysfsIndicator {
    fn show_status(&mut self, message: &str) {
        if let Err(e) = self.set_status(message) {
            warn!(error = %e, "status update failed");
        }
    }

    fn pulse_alarm(&mut self, duration: Duration) {
        if let Err(e) = self.pulse(duration) {
            warn!(error = %e, "buzzer pulse failed");
        }
    }
}

/// Indicator for headless runs: everything goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn show_status(&mut self, message: &str) {
        info!(status = message, "indicator");
    }

    fn pulse_alarm(&mut self, duration: Duration) {
        info!(ms = duration.as_millis() as u64, "alarm pulse");
    }
}

impl LocationSource for GpsReceiver {
    fn current_fix(&mut self) -> Option<GeoFix> {
        self.latest()
    }
}

/// A configured, unchanging position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoFix);

impl LocationSource for FixedLocation {
    fn current_fix(&mut self) -> Option<GeoFix> {
        Some(self.0)
    }
}

/// No position available; reports omit the location fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

impl LocationSource for NoLocation {
    fn current_fix(&mut self) -> Option<GeoFix> {
        None
    }
}
