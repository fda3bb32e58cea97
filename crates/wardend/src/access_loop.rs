use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use warden_access::adapters::{FixedLocation, LogIndicator, NoLocation};
use warden_access::{AccessController, DirImageStore, Indicator, LocationSource, Pipeline};
use warden_core::{CosineMatcher, FaceDetector, FaceRecognizer};
use warden_hw::{Camera, FramePool, GeoFix, GpsReceiver, SysfsIndicator};
use warden_notify::{HttpReporter, NetworkDispatcher, SmtpNotifier};

/// Spawn the access loop on a dedicated OS thread.
///
/// The thread opens the camera, loads both ONNX models, discards warmup
/// frames and enrolls the reference face, then ticks until `shutdown` is
/// set. The returned receiver resolves once startup has finished; a camera
/// or model failure is reported there and ends the thread. A failed
/// enrollment is not: the loop runs locked.
pub fn spawn(
    config: Config,
    shutdown: Arc<AtomicBool>,
) -> Result<(JoinHandle<()>, oneshot::Receiver<Result<()>>)> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = std::thread::Builder::new()
        .name("warden-loop".into())
        .spawn(move || {
            let mut controller = match build(&config) {
                Ok(controller) => controller,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            controller.run(&shutdown);
        })
        .context("failed to spawn access loop thread")?;
    Ok((handle, ready_rx))
}

fn build(config: &Config) -> Result<AccessController> {
    let pool = FramePool::new(config.frame_buffers);

    let camera = Camera::open(&config.camera_device, &config.capture_settings(), pool.clone())
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    pool.set_retained_bytes(camera.width as usize * camera.height as usize);
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let detector_path = config.detector_model_path();
    let detector =
        FaceDetector::load(&detector_path)?.with_confidence_threshold(config.detection_confidence);
    tracing::info!(path = %detector_path, "SCRFD detector loaded");

    let recognizer_path = config.recognizer_model_path();
    let recognizer = FaceRecognizer::load(&recognizer_path)?;
    tracing::info!(path = %recognizer_path, "ArcFace recognizer loaded");

    camera.warm_up(config.warmup_frames);

    let pipeline = Pipeline {
        source: Box::new(camera),
        detector: Box::new(detector),
        aligner: Box::new(recognizer),
        matcher: Box::new(CosineMatcher),
        indicator: indicator(config),
        dispatcher: Box::new(dispatcher(config)),
        location: location(config),
    };

    let mut controller = AccessController::new(pipeline, config.policy(), config.device_id.as_str());
    let store = DirImageStore::new(&config.enrollment_dir);
    // Enrollment failure leaves the controller locked; already logged.
    let _ = controller.on_startup(&store, &config.enrollment_image, &pool);
    Ok(controller)
}

fn indicator(config: &Config) -> Box<dyn Indicator> {
    if config.buzzer_path.is_none() && config.status_path.is_none() {
        tracing::info!("no buzzer or status path configured; indicating via log");
        return Box::new(LogIndicator);
    }
    Box::new(SysfsIndicator::new(
        config.buzzer_path.clone(),
        config.status_path.clone(),
    ))
}

fn dispatcher(config: &Config) -> NetworkDispatcher {
    let reporter = config.report_config().and_then(|c| match HttpReporter::new(c) {
        Ok(reporter) => Some(reporter),
        Err(e) => {
            tracing::warn!(error = %e, "telemetry reporter unavailable");
            None
        }
    });
    let notifier = config.smtp_config().and_then(|c| match SmtpNotifier::new(c) {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            tracing::warn!(error = %e, "SMTP notifier unavailable");
            None
        }
    });
    tracing::info!(
        report = reporter.is_some(),
        notify = notifier.is_some(),
        "alert dispatcher configured"
    );
    NetworkDispatcher::new(reporter, notifier)
}

fn location(config: &Config) -> Box<dyn LocationSource> {
    let fixed = config
        .latitude
        .zip(config.longitude)
        .map(|(lat, lon)| FixedLocation(GeoFix::fixed(lat, lon)));

    if let Some(device) = &config.gps_device {
        match GpsReceiver::spawn(device) {
            Ok(receiver) => return Box::new(receiver),
            Err(e) => tracing::warn!(error = %e, "GPS unavailable; falling back"),
        }
    }
    match fixed {
        Some(fixed) => Box::new(fixed),
        None => Box::new(NoLocation),
    }
}
