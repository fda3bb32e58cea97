use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use warden_access::{load_enrolled_template, DirImageStore};
use warden_core::{FaceDetector, FaceRecognizer};
use warden_hw::{Camera, CaptureSettings, FramePool};

#[derive(Parser)]
#[command(name = "warden", about = "Warden access-control diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture one frame and run face detection on it
    Test {
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Directory containing det_10g.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Save the captured frame as PNG
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Build an enrollment template from an image and report the outcome
    CheckEnrollment {
        /// Reference image (e.g. /var/lib/warden/faces/user1.jpg)
        #[arg(long)]
        image: PathBuf,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices { json } => devices(json),
        Commands::Test {
            device,
            model_dir,
            save,
        } => test(&device, &model_path(model_dir.as_deref(), "det_10g.onnx"), save.as_deref()),
        Commands::CheckEnrollment { image, model_dir } => check_enrollment(&image, model_dir.as_deref()),
    }
}

fn model_path(dir: Option<&Path>, file: &str) -> String {
    dir.map(Path::to_path_buf)
        .unwrap_or_else(warden_core::default_model_dir)
        .join(file)
        .to_string_lossy()
        .into_owned()
}

fn devices(json: bool) -> Result<()> {
    let devices = Camera::list_devices();
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No capture devices found");
    }
    for dev in devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }
    Ok(())
}

fn test(device: &str, detector_path: &str, save: Option<&Path>) -> Result<()> {
    println!("Running camera diagnostics on {device}...");
    let pool = FramePool::new(1);
    let camera = Camera::open(device, &CaptureSettings::default(), pool)?;
    println!(
        "Opened {}x{} ({:?})",
        camera.width, camera.height, camera.fourcc
    );
    camera.warm_up(4);

    let frame = camera.capture_frame()?;
    println!(
        "Frame {}: brightness {:.1}, dark: {}",
        frame.sequence,
        frame.avg_brightness(),
        frame.is_dark
    );

    if let Some(path) = save {
        image::GrayImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .context("frame size does not match its dimensions")?
            .save(path)
            .with_context(|| format!("failed to save {}", path.display()))?;
        println!("Saved frame to {}", path.display());
    }

    let mut detector = FaceDetector::load(detector_path)?;
    let faces = detector.detect(frame.pixels(), frame.width, frame.height)?;
    println!("Faces detected: {}", faces.len());
    for (i, face) in faces.iter().enumerate() {
        println!(
            "  [{i}] {:.0}x{:.0} at ({:.0}, {:.0}), confidence {:.3}",
            face.width, face.height, face.x, face.y, face.confidence
        );
    }
    Ok(())
}

fn check_enrollment(image: &Path, model_dir: Option<&Path>) -> Result<()> {
    let (Some(dir), Some(name)) = (image.parent(), image.file_name().and_then(|n| n.to_str())) else {
        bail!("not an image file path: {}", image.display());
    };
    let store = DirImageStore::new(dir);
    let pool = FramePool::new(1);
    let mut detector = FaceDetector::load(&model_path(model_dir, "det_10g.onnx"))?;
    let mut recognizer = FaceRecognizer::load(&model_path(model_dir, "w600k_r50.onnx"))?;

    match load_enrolled_template(&store, name, &pool, &mut detector, &mut recognizer) {
        Ok(template) => {
            println!("Enrollment OK: {}", template.source);
            println!("  face confidence: {:.3}", template.confidence);
            println!("  descriptor: {} dims", template.descriptor.dims());
            Ok(())
        }
        Err(e) => bail!("enrollment failed: {e}"),
    }
}
