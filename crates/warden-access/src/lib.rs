//! warden-access — The face-authentication access-control loop.
//!
//! [`AccessController`] runs capture → detect → align → match once per
//! [`tick`](AccessController::tick), keeps the attempt counter, and escalates
//! to the alert dispatcher when the counter reaches its threshold. Every
//! collaborator is a trait in [`capability`] so the loop runs against real
//! hardware (see [`adapters`]) or fakes alike.

pub mod adapters;
pub mod alert;
pub mod attempts;
pub mod capability;
pub mod enrollment;
pub mod machine;
pub mod store;

#[cfg(test)]
mod fakes;

pub use alert::{AlertEvent, DispatchError};
pub use attempts::AttemptState;
pub use capability::{
    AlertDispatcher, AlignError, Aligner, CaptureError, Detector, FrameSource, ImageStore,
    Indicator, LocationSource,
};
pub use enrollment::{load_enrolled_template, EnrollmentError};
pub use machine::{AccessController, AccessPolicy, AccessState, DenyReason, Outcome, Pipeline};
pub use store::{DirImageStore, ImageStoreError};
