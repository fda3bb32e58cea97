//! The access-control state machine.
//!
//! One [`tick`](AccessController::tick) is one full iteration:
//!
//! ```text
//! Capturing -> Detecting -> (no face) ----------------------------> IdleReport
//!              Detecting -> AligningMatching -> Granted ----------> IdleReport
//!                                              Denied -> (< max) -> IdleReport
//!                                              Denied -> Escalating -> IdleReport
//! ```
//!
//! A failed capture goes straight to `IdleReport` and sends nothing.

use crate::alert::{AlertEvent, DispatchError};
use crate::attempts::AttemptState;
use crate::capability::{AlertDispatcher, Aligner, Detector, FrameSource, ImageStore, Indicator, LocationSource};
use crate::enrollment::{load_enrolled_template, EnrollmentError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use warden_core::{DetectionSet, EnrolledTemplate, Matcher};
use warden_hw::{FramePool, GeoFix};

pub const STATUS_INITIALIZING: &str = "Initializing...";
pub const STATUS_NO_TEMPLATE: &str = "No Face Loaded!";
pub const STATUS_READY: &str = "Present your face";
pub const STATUS_GRANTED: &str = "Access Granted";
pub const STATUS_DENIED: &str = "Access Denied";
pub const STATUS_INTRUDER: &str = "Intruder Alert!";

/// Slice used when sleeping between iterations so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Tunables for the decision policy and loop pacing.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// A candidate matches only when its score is strictly greater than this.
    pub acceptance_threshold: f32,
    pub max_attempts: u32,
    pub tick_interval: Duration,
    /// Delay after a failed capture, in place of `tick_interval`.
    pub capture_retry_delay: Duration,
    pub alarm_pulse: Duration,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            max_attempts: 3,
            tick_interval: Duration::from_millis(2000),
            capture_retry_delay: Duration::from_millis(500),
            alarm_pulse: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Capturing,
    Detecting,
    AligningMatching,
    Granted,
    Denied,
    Escalating,
    IdleReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Faces were compared and none scored above the threshold.
    NoMatch,
    /// No template is enrolled; every face is a failed attempt.
    NoTemplate,
}

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    CaptureFailed,
    /// Nobody in front of the sensor. Not an authentication attempt.
    NoFace,
    Granted {
        score: f32,
        /// Index of the matching candidate in detector order.
        candidate: usize,
    },
    Denied {
        reason: DenyReason,
        /// 1-based attempt number this denial counted as.
        attempt: u32,
        escalated: bool,
    },
}

impl Outcome {
    pub fn access_granted(&self) -> bool {
        matches!(self, Outcome::Granted { .. })
    }

    pub fn escalated(&self) -> bool {
        matches!(self, Outcome::Denied { escalated: true, .. })
    }
}

/// The collaborators one iteration runs through.
pub struct Pipeline {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub aligner: Box<dyn Aligner>,
    pub matcher: Box<dyn Matcher>,
    pub indicator: Box<dyn Indicator>,
    pub dispatcher: Box<dyn AlertDispatcher>,
    pub location: Box<dyn LocationSource>,
}

enum Verdict {
    Absent,
    Match { candidate: usize, score: f32 },
    Reject(DenyReason),
}

/// Owns the enrolled template and attempt counter for the process lifetime.
pub struct AccessController {
    pipeline: Pipeline,
    policy: AccessPolicy,
    device_id: String,
    template: Option<EnrolledTemplate>,
    attempts: AttemptState,
    state: AccessState,
}

impl AccessController {
    pub fn new(pipeline: Pipeline, policy: AccessPolicy, device_id: impl Into<String>) -> Self {
        let attempts = AttemptState::new(policy.max_attempts);
        Self {
            pipeline,
            policy,
            device_id: device_id.into(),
            template: None,
            attempts,
            state: AccessState::IdleReport,
        }
    }

    /// Load the enrolled template. On failure the controller stays locked
    /// until restart; the error is returned for the caller to log.
    pub fn on_startup(
        &mut self,
        store: &dyn ImageStore,
        image_name: &str,
        pool: &FramePool,
    ) -> Result<(), EnrollmentError> {
        self.pipeline.indicator.show_status(STATUS_INITIALIZING);
        let loaded = load_enrolled_template(
            store,
            image_name,
            pool,
            self.pipeline.detector.as_mut(),
            self.pipeline.aligner.as_mut(),
        );
        match loaded {
            Ok(template) => {
                self.template = Some(template);
                self.pipeline.indicator.show_status(STATUS_READY);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, image = image_name, "enrollment failed; access is locked until restart");
                self.pipeline.indicator.show_status(STATUS_NO_TEMPLATE);
                Err(e)
            }
        }
    }

    /// Run one iteration to completion.
    pub fn tick(&mut self) -> Outcome {
        self.enter(AccessState::Capturing);
        let frame = match self.pipeline.source.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "capture failed; skipping iteration");
                self.enter(AccessState::IdleReport);
                return Outcome::CaptureFailed;
            }
        };

        self.enter(AccessState::Detecting);
        let detections = self.pipeline.detector.detect(&frame);
        let verdict = if detections.is_empty() {
            Verdict::Absent
        } else {
            self.enter(AccessState::AligningMatching);
            self.evaluate(&frame, &detections)
        };
        // Release the frame buffer before any network I/O.
        drop(detections);
        drop(frame);

        let location = self.pipeline.location.current_fix();
        let outcome = self.apply(verdict, location);

        self.enter(AccessState::IdleReport);
        let event = AlertEvent::new(
            self.device_id.as_str(),
            location,
            outcome.access_granted(),
            outcome.escalated(),
        );
        if let Err(e) = self.pipeline.dispatcher.report(&event) {
            log_dispatch_failure("report", &e);
        }
        outcome
    }

    /// Tick until `shutdown` is set, pacing iterations per the policy.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            device = %self.device_id,
            locked = self.is_locked(),
            threshold = self.policy.acceptance_threshold,
            max_attempts = self.attempts.threshold(),
            "access loop started"
        );
        while !shutdown.load(Ordering::Relaxed) {
            let delay = match self.tick() {
                Outcome::CaptureFailed => self.policy.capture_retry_delay,
                _ => self.policy.tick_interval,
            };
            sleep_unless_shutdown(delay, shutdown);
        }
        info!("access loop stopped");
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.count()
    }

    pub fn is_locked(&self) -> bool {
        self.template.is_none()
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    fn enter(&mut self, next: AccessState) {
        trace!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Compare candidates in detector order; the first score above the
    /// threshold wins. Candidates that fail to align are skipped.
    fn evaluate(&mut self, frame: &warden_hw::Frame, detections: &DetectionSet) -> Verdict {
        let Some(template) = self.template.as_ref() else {
            return Verdict::Reject(DenyReason::NoTemplate);
        };
        for (candidate, face) in detections.iter().enumerate() {
            let probe = match self.pipeline.aligner.align(frame, face) {
                Ok(probe) => probe,
                Err(e) => {
                    debug!(candidate, error = %e, "skipping candidate");
                    continue;
                }
            };
            let score = self.pipeline.matcher.score(&probe, template);
            debug!(candidate, score, "candidate scored");
            if score > self.policy.acceptance_threshold {
                return Verdict::Match { candidate, score };
            }
        }
        Verdict::Reject(DenyReason::NoMatch)
    }

    fn apply(&mut self, verdict: Verdict, location: Option<GeoFix>) -> Outcome {
        match verdict {
            Verdict::Absent => {
                trace!("no face in frame");
                Outcome::NoFace
            }
            Verdict::Match { candidate, score } => {
                self.enter(AccessState::Granted);
                self.attempts.reset();
                self.pipeline.indicator.show_status(STATUS_GRANTED);
                info!(candidate, score, "access granted");
                Outcome::Granted { score, candidate }
            }
            Verdict::Reject(reason) => {
                self.enter(AccessState::Denied);
                self.pipeline.indicator.show_status(STATUS_DENIED);
                self.pipeline.indicator.pulse_alarm(self.policy.alarm_pulse);
                let failure = self.attempts.record_failure();
                info!(?reason, attempt = failure.attempt, max = self.attempts.threshold(), "access denied");
                if failure.escalate {
                    self.escalate(location);
                }
                Outcome::Denied {
                    reason,
                    attempt: failure.attempt,
                    escalated: failure.escalate,
                }
            }
        }
    }

    fn escalate(&mut self, location: Option<GeoFix>) {
        self.enter(AccessState::Escalating);
        info!(device = %self.device_id, "attempt limit reached; raising intruder alert");
        self.pipeline.indicator.show_status(STATUS_INTRUDER);
        let event = AlertEvent::new(self.device_id.as_str(), location, false, true);
        if let Err(e) = self.pipeline.dispatcher.notify(&event) {
            log_dispatch_failure("notify", &e);
        }
    }
}

fn log_dispatch_failure(path: &str, e: &DispatchError) {
    match e {
        DispatchError::Disabled(_) => debug!(path, error = %e, "dispatch skipped"),
        _ => warn!(path, error = %e, "dispatch failed"),
    }
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
