//! warden-hw — Hardware edge of the access controller.
//!
//! V4L2 camera capture into a bounded frame pool, luma preprocessing,
//! sysfs buzzer/status indicator and an NMEA GPS reader.

pub mod camera;
pub mod frame;
pub mod gps;
pub mod indicator;

pub use camera::{Camera, CameraError, CaptureSettings};
pub use frame::{Frame, FramePool, PixelFormat, PooledBuffer};
pub use gps::{GeoFix, GpsReceiver};
pub use indicator::SysfsIndicator;
