//! One-shot construction of the enrolled reference template.

use crate::capability::{AlignError, Aligner, Detector, ImageStore};
use crate::store::ImageStoreError;
use thiserror::Error;
use tracing::{debug, info};
use warden_core::EnrolledTemplate;
use warden_hw::{Frame, FramePool};

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("enrollment image unavailable")]
    ResourceUnavailable(#[source] ImageStoreError),
    #[error("enrollment image could not be decoded: {0}")]
    DecodeFailed(String),
    #[error("no face found in enrollment image")]
    NoFaceFound,
    #[error("enrollment face could not be aligned")]
    AlignmentFailed(#[source] AlignError),
    #[error("no buffer available for enrollment image")]
    AllocationFailed,
}

/// Decode the named reference image and build a template from its most
/// confident face.
///
/// The decode buffer is taken from `pool` and returned before this function
/// exits, on success and on every error path.
pub fn load_enrolled_template(
    store: &dyn ImageStore,
    name: &str,
    pool: &FramePool,
    detector: &mut dyn Detector,
    aligner: &mut dyn Aligner,
) -> Result<EnrolledTemplate, EnrollmentError> {
    let bytes = store
        .read_enrollment_image(name)
        .map_err(EnrollmentError::ResourceUnavailable)?;

    let luma = image::load_from_memory(&bytes)
        .map_err(|e| EnrollmentError::DecodeFailed(e.to_string()))?
        .to_luma8();
    let (width, height) = luma.dimensions();
    debug!(name, width, height, "decoded enrollment image");

    let mut buffer = pool.acquire().ok_or(EnrollmentError::AllocationFailed)?;
    buffer.extend_from_slice(luma.as_raw());
    drop(luma);
    let frame = Frame::from_luma(buffer, width, height)
        .map_err(|e| EnrollmentError::DecodeFailed(e.to_string()))?;

    let detections = detector.detect(&frame);
    let best = detections.best().ok_or(EnrollmentError::NoFaceFound)?;
    let descriptor = aligner
        .align(&frame, best)
        .map_err(EnrollmentError::AlignmentFailed)?;

    info!(
        name,
        candidates = detections.len(),
        confidence = best.confidence,
        dims = descriptor.dims(),
        "enrolled reference template"
    );
    Ok(EnrolledTemplate::new(descriptor, name, best.confidence))
}
