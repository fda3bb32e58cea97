use chrono::{DateTime, Utc};

/// Candidate face region reported by a detector, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Ordered detector output for one frame.
///
/// Order is whatever the detector produced; consumers must not assume it is
/// re-sorted after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    boxes: Vec<FaceBox>,
}

impl DetectionSet {
    pub fn new(boxes: Vec<FaceBox>) -> Self {
        Self { boxes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FaceBox> {
        self.boxes.iter()
    }

    /// Highest-confidence candidate; the earliest one wins ties.
    pub fn best(&self) -> Option<&FaceBox> {
        self.boxes.iter().fold(None, |best: Option<&FaceBox>, candidate| match best {
            Some(b) if b.confidence >= candidate.confidence => Some(b),
            _ => Some(candidate),
        })
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a FaceBox;
    type IntoIter = std::slice::Iter<'a, FaceBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}

/// Shape information carried alongside a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorGeometry {
    /// Edge length of the aligned square crop the descriptor was computed from.
    pub aligned_size: u32,
    /// Model version that produced the descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

/// Normalized face representation (typically a 512-dimensional ArcFace embedding).
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedDescriptor {
    pub values: Vec<f32>,
    pub geometry: DescriptorGeometry,
}

impl AlignedDescriptor {
    /// Compute cosine similarity between two descriptors.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Uses constant-time computation: always processes all dimensions.
    pub fn similarity(&self, other: &AlignedDescriptor) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    pub fn dims(&self) -> usize {
        self.values.len()
    }
}

/// The single authorized identity, built once at startup.
#[derive(Debug, Clone)]
pub struct EnrolledTemplate {
    pub descriptor: AlignedDescriptor,
    /// Name of the reference image the template was built from.
    pub source: String,
    /// Detector confidence of the enrolled face.
    pub confidence: f32,
    pub enrolled_at: DateTime<Utc>,
}

impl EnrolledTemplate {
    pub fn new(descriptor: AlignedDescriptor, source: impl Into<String>, confidence: f32) -> Self {
        Self {
            descriptor,
            source: source.into(),
            confidence,
            enrolled_at: Utc::now(),
        }
    }
}

/// Strategy for scoring a probe descriptor against the enrolled template.
pub trait Matcher {
    /// Similarity in [0, 1]; higher = more similar.
    fn score(&self, probe: &AlignedDescriptor, template: &EnrolledTemplate) -> f32;
}

/// Cosine similarity matcher.
///
/// Negative similarities clamp to 0. Descriptors of different dimensionality
/// never match.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn score(&self, probe: &AlignedDescriptor, template: &EnrolledTemplate) -> f32 {
        if probe.dims() != template.descriptor.dims() {
            tracing::debug!(
                probe = probe.dims(),
                template = template.descriptor.dims(),
                "descriptor dimension mismatch"
            );
            return 0.0;
        }
        let sim = probe.similarity(&template.descriptor);
        if sim.is_nan() { 0.0 } else { sim.clamp(0.0, 1.0) }
    }
}
