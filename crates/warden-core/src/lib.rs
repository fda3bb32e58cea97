//! warden-core — Face detection, alignment and matching.
//!
//! Uses SCRFD for face detection and ArcFace for descriptor extraction,
//! both running via ONNX Runtime for CPU inference. Everything here works on
//! raw 8-bit luma slices; cameras and access policy live in other crates.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod types;

pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::{
    AlignedDescriptor, CosineMatcher, DescriptorGeometry, DetectionSet, EnrolledTemplate, FaceBox,
    Matcher,
};

use std::path::PathBuf;

/// Default directory for ONNX model files.
///
/// `$XDG_DATA_HOME/warden/models`, falling back to `~/.local/share/warden/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("warden/models")
}
