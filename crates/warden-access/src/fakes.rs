//! Scriptable collaborators for exercising the controller without hardware.
//!
//! Candidates are identified by index: the fake detector places candidate
//! `i` at `x = i`, and the fake aligner emits a one-element descriptor
//! holding that index, which the fake matcher looks up in its score table.

use crate::alert::{AlertEvent, DispatchError};
use crate::capability::{
    AlertDispatcher, AlignError, Aligner, CaptureError, Detector, FrameSource, ImageStore,
    Indicator, LocationSource,
};
use crate::enrollment::{load_enrolled_template, EnrollmentError};
use crate::machine::{AccessController, AccessPolicy, Pipeline};
use crate::store::ImageStoreError;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::rc::Rc;
use std::time::Duration;
use warden_core::{
    AlignedDescriptor, DescriptorGeometry, DetectionSet, EnrolledTemplate, FaceBox, Matcher,
};
use warden_hw::{Frame, FramePool, GeoFix};

const FRAME_SIZE: u32 = 4;

/// Encode a mid-grey PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::GrayImage::from_pixel(width, height, image::Luma([128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Default)]
struct Shared {
    capture_failures: Cell<u32>,
    detections: RefCell<VecDeque<Vec<f32>>>,
    aligned: RefCell<Vec<usize>>,
    failing_alignments: RefCell<HashSet<usize>>,
    scores: RefCell<HashMap<usize, f32>>,
    statuses: RefCell<Vec<String>>,
    alarms: RefCell<Vec<Duration>>,
    reports: RefCell<Vec<AlertEvent>>,
    notifies: RefCell<Vec<AlertEvent>>,
    dispatch_fails: Cell<bool>,
}

pub struct Rig {
    pub pool: FramePool,
    pub store: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    shared: Rc<Shared>,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_pool(2)
    }

    pub fn with_pool(capacity: usize) -> Self {
        let mut images = HashMap::new();
        images.insert("user1.jpg".to_string(), png_bytes(8, 8));
        Self {
            pool: FramePool::new(capacity),
            store: Rc::new(RefCell::new(images)),
            shared: Rc::new(Shared::default()),
        }
    }

    /// Queue the candidates the detector reports on its next call.
    pub fn faces(&self, confidences: &[f32]) {
        self.shared.detections.borrow_mut().push_back(confidences.to_vec());
    }

    pub fn enroll_confidences(&self, confidences: &[f32]) {
        self.faces(confidences);
    }

    pub fn fail_capture(&self) {
        self.shared.capture_failures.set(self.shared.capture_failures.get() + 1);
    }

    pub fn fail_align(&self, candidate: usize) {
        self.shared.failing_alignments.borrow_mut().insert(candidate);
    }

    pub fn set_score(&self, candidate: usize, score: f32) {
        self.shared.scores.borrow_mut().insert(candidate, score);
    }

    pub fn fail_dispatch(&self) {
        self.shared.dispatch_fails.set(true);
    }

    pub fn clear_aligned(&self) {
        self.shared.aligned.borrow_mut().clear();
    }

    pub fn aligned_ids(&self) -> Vec<usize> {
        self.shared.aligned.borrow().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.shared.statuses.borrow().clone()
    }

    pub fn alarms(&self) -> Vec<Duration> {
        self.shared.alarms.borrow().clone()
    }

    pub fn reports(&self) -> Vec<AlertEvent> {
        self.shared.reports.borrow().clone()
    }

    pub fn notifies(&self) -> Vec<AlertEvent> {
        self.shared.notifies.borrow().clone()
    }

    pub fn image_store(&self) -> FakeStore {
        FakeStore(Rc::clone(&self.store))
    }

    pub fn enroll(&self) -> Result<EnrolledTemplate, EnrollmentError> {
        let mut detector = FakeDetector(Rc::clone(&self.shared));
        let mut aligner = FakeAligner(Rc::clone(&self.shared));
        load_enrolled_template(
            &self.image_store(),
            "user1.jpg",
            &self.pool,
            &mut detector,
            &mut aligner,
        )
    }

    pub fn controller(&self) -> AccessController {
        let pipeline = Pipeline {
            source: Box::new(FakeSource {
                pool: self.pool.clone(),
                shared: Rc::clone(&self.shared),
            }),
            detector: Box::new(FakeDetector(Rc::clone(&self.shared))),
            aligner: Box::new(FakeAligner(Rc::clone(&self.shared))),
            matcher: Box::new(FakeMatcher(Rc::clone(&self.shared))),
            indicator: Box::new(FakeIndicator(Rc::clone(&self.shared))),
            dispatcher: Box::new(FakeDispatcher(Rc::clone(&self.shared))),
            location: Box::new(FakeLocation),
        };
        AccessController::new(pipeline, AccessPolicy::default(), "test-device")
    }

    /// A controller whose startup enrollment succeeded.
    pub fn started_controller(&self) -> AccessController {
        let mut controller = self.controller();
        controller
            .on_startup(&self.image_store(), "user1.jpg", &self.pool)
            .unwrap();
        controller
    }
}

pub struct FakeStore(Rc<RefCell<HashMap<String, Vec<u8>>>>);

impl ImageStore for FakeStore {
    fn read_enrollment_image(&self, name: &str) -> Result<Vec<u8>, ImageStoreError> {
        self.0
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| ImageStoreError::NotFound(name.to_string()))
    }
}

struct FakeSource {
    pool: FramePool,
    shared: Rc<Shared>,
}

impl FrameSource for FakeSource {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let failures = self.shared.capture_failures.get();
        if failures > 0 {
            self.shared.capture_failures.set(failures - 1);
            return Err(CaptureError::Device("scripted failure".into()));
        }
        let mut buffer = self.pool.acquire().ok_or(CaptureError::AllocationFailed)?;
        buffer.resize((FRAME_SIZE * FRAME_SIZE) as usize, 128);
        Frame::from_luma(buffer, FRAME_SIZE, FRAME_SIZE)
            .map_err(|e| CaptureError::Device(e.to_string()))
    }
}

struct FakeDetector(Rc<Shared>);

impl Detector for FakeDetector {
    fn detect(&mut self, _frame: &Frame) -> DetectionSet {
        let confidences = self.0.detections.borrow_mut().pop_front().unwrap_or_default();
        DetectionSet::new(
            confidences
                .into_iter()
                .enumerate()
                .map(|(i, confidence)| FaceBox {
                    x: i as f32,
                    y: 0.0,
                    width: 2.0,
                    height: 2.0,
                    confidence,
                    landmarks: None,
                })
                .collect(),
        )
    }
}

struct FakeAligner(Rc<Shared>);

impl Aligner for FakeAligner {
    fn align(&mut self, _frame: &Frame, face: &FaceBox) -> Result<AlignedDescriptor, AlignError> {
        let id = face.x as usize;
        self.0.aligned.borrow_mut().push(id);
        if self.0.failing_alignments.borrow().contains(&id) {
            return Err(AlignError::Degenerate);
        }
        Ok(AlignedDescriptor {
            values: vec![id as f32],
            geometry: DescriptorGeometry {
                aligned_size: 112,
                model_version: None,
            },
        })
    }
}

struct FakeMatcher(Rc<Shared>);

impl Matcher for FakeMatcher {
    fn score(&self, probe: &AlignedDescriptor, _template: &EnrolledTemplate) -> f32 {
        let id = probe.values.first().copied().unwrap_or_default() as usize;
        self.0.scores.borrow().get(&id).copied().unwrap_or(0.0)
    }
}

struct FakeIndicator(Rc<Shared>);

impl Indicator for FakeIndicator {
    fn show_status(&mut self, message: &str) {
        self.0.statuses.borrow_mut().push(message.to_string());
    }

    fn pulse_alarm(&mut self, duration: Duration) {
        self.0.alarms.borrow_mut().push(duration);
    }
}

struct FakeDispatcher(Rc<Shared>);

impl FakeDispatcher {
    fn outcome(&self) -> Result<(), DispatchError> {
        if self.0.dispatch_fails.get() {
            Err(DispatchError::Transport("link down".into()))
        } else {
            Ok(())
        }
    }
}

impl AlertDispatcher for FakeDispatcher {
    fn report(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        self.0.reports.borrow_mut().push(event.clone());
        self.outcome()
    }

    fn notify(&mut self, event: &AlertEvent) -> Result<(), DispatchError> {
        self.0.notifies.borrow_mut().push(event.clone());
        self.outcome()
    }
}

struct FakeLocation;

impl LocationSource for FakeLocation {
    fn current_fix(&mut self) -> Option<GeoFix> {
        Some(GeoFix::fixed(-26.2041, 28.0473))
    }
}
