//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FramePool, PixelFormat};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("all {0} frame buffers are in use")]
    BufferExhausted(usize),
    #[error("frame conversion failed: {0}")]
    Frame(#[from] frame::FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Capture parameters requested at open time.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    /// Apply CLAHE to every non-dark frame.
    pub clahe: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            clahe: true,
        }
    }
}

/// V4L2 camera device handle. Frames are written into buffers from `pool`.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    clahe: bool,
    pool: FramePool,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(
        device_path: &str,
        settings: &CaptureSettings,
        pool: FramePool,
    ) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; IR cameras commonly answer with GREY or Y16 instead.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = settings.width;
        fmt.height = settings.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = pixel_format_for(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
            clahe: settings.clahe,
            pool,
        })
    }

    /// Capture a single frame into a pooled buffer, converted to luma.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut data = self
            .pool
            .acquire()
            .ok_or(CameraError::BufferExhausted(self.pool.capacity()))?;

        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        self.pixel_format.decode_into(buf, self.width, self.height, &mut data)?;

        let is_dark = frame::is_dark_frame(&data, frame::DARK_FRAME_THRESHOLD);
        if self.clahe && !is_dark {
            frame::clahe_enhance(&mut data, self.width, self.height, 8, 0.02);
        }

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            source_format: Some(self.pixel_format),
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
            is_dark,
        })
    }

    /// Discard `count` frames while auto-exposure settles.
    pub fn warm_up(&self, count: usize) {
        if count == 0 {
            return;
        }
        tracing::info!(count, "discarding warmup frames");
        for _ in 0..count {
            if let Err(e) = self.capture_frame() {
                tracing::debug!(error = %e, "warmup capture failed");
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card.clone(),
                        driver: caps.driver.clone(),
                        bus: caps.bus.clone(),
                    })
            })
            .collect()
    }
}

fn pixel_format_for(fourcc: FourCC) -> Option<PixelFormat> {
    if fourcc == FourCC::new(b"GREY") {
        Some(PixelFormat::Grey)
    } else if fourcc == FourCC::new(b"YUYV") {
        Some(PixelFormat::Yuyv)
    } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
        Some(PixelFormat::Y16)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_for_fourcc() {
        assert_eq!(pixel_format_for(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(pixel_format_for(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(pixel_format_for(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(pixel_format_for(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/does-not-exist", &CaptureSettings::default(), FramePool::new(1))
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
