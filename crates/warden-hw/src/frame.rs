//! Frame type, bounded buffer pool and luma preprocessing (pixel format
//! conversion, dark detection, CLAHE).

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format:?} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Raw pixel format delivered by a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel, native IR camera output).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

impl PixelFormat {
    fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grey => 1,
            PixelFormat::Yuyv | PixelFormat::Y16 => 2,
        }
    }

    /// Convert a raw buffer to 8-bit luma, replacing the contents of `out`.
    ///
    /// YUYV packs two pixels per 4 bytes [Y0, U, Y1, V]; luma is every even
    /// byte. Y16 keeps the high byte of each little-endian sample.
    pub fn decode_into(
        self,
        raw: &[u8],
        width: u32,
        height: u32,
        out: &mut Vec<u8>,
    ) -> Result<(), FrameError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * self.bytes_per_pixel();
        if raw.len() < expected {
            return Err(FrameError::InvalidLength {
                format: self,
                expected,
                actual: raw.len(),
            });
        }

        out.clear();
        match self {
            PixelFormat::Grey => out.extend_from_slice(&raw[..pixels]),
            PixelFormat::Yuyv => out.extend(raw[..expected].iter().step_by(2)),
            PixelFormat::Y16 => out.extend(raw[..expected].chunks_exact(2).map(|s| s[1])),
        }
        Ok(())
    }
}

/// Bytes a returned buffer may keep: one 1080p luma frame.
pub const DEFAULT_RETAINED_BYTES: usize = 1920 * 1080;

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    outstanding: AtomicUsize,
    retained_bytes: AtomicUsize,
}

/// Fixed-size set of reusable pixel buffers.
///
/// At most `capacity` buffers are handed out at once. A buffer returns to the
/// pool when its [`PooledBuffer`] guard drops, on every exit path.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new((0..capacity).map(|_| Vec::new()).collect()),
                capacity,
                outstanding: AtomicUsize::new(0),
                retained_bytes: AtomicUsize::new(DEFAULT_RETAINED_BYTES),
            }),
        }
    }

    /// Take a buffer, or `None` if every buffer is in use.
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let mut free = self.inner.free.lock().unwrap_or_else(|e| e.into_inner());
        let data = free.pop()?;
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        Some(PooledBuffer {
            data,
            home: Some(Arc::clone(&self.inner)),
        })
    }

    /// Buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Cap the allocation a buffer keeps once returned. Larger buffers, such
    /// as a decoded enrollment photo, are shrunk on drop.
    pub fn set_retained_bytes(&self, bytes: usize) {
        self.inner.retained_bytes.store(bytes, Ordering::Relaxed);
    }
}

/// Pixel buffer that returns to its pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    home: Option<Arc<PoolInner>>,
}

impl PooledBuffer {
    /// A buffer that belongs to no pool.
    pub fn detached(data: Vec<u8>) -> Self {
        Self { data, home: None }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            let mut data = std::mem::take(&mut self.data);
            data.clear();
            data.shrink_to(home.retained_bytes.load(Ordering::Relaxed));
            home.free.lock().unwrap_or_else(|e| e.into_inner()).push(data);
            home.outstanding.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// One captured 8-bit luma image.
pub struct Frame {
    /// Luma pixel data (width * height bytes).
    pub data: PooledBuffer,
    pub width: u32,
    pub height: u32,
    /// Format the device delivered before conversion; `None` for decoded stills.
    pub source_format: Option<PixelFormat>,
    pub timestamp: Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap an already-converted luma buffer.
    pub fn from_luma(data: PooledBuffer, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                format: PixelFormat::Grey,
                expected,
                actual: data.len(),
            });
        }
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Ok(Self {
            data,
            width,
            height,
            source_format: None,
            timestamp: Instant::now(),
            sequence: 0,
            is_dark,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Share of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// True if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Contrast-Limited Adaptive Histogram Equalization, in place.
///
/// Square grid of `tiles` × `tiles`, per-tile clipped histograms turned into
/// CDFs, bilinear interpolation between neighbouring tile CDFs.
pub fn clahe_enhance(gray: &mut [u8], width: u32, height: u32, tiles: u32, clip_limit: f32) {
    let (w, h, t) = (width as usize, height as usize, tiles as usize);
    if w == 0 || h == 0 || t == 0 || gray.len() < w * h {
        return;
    }
    let (tile_w, tile_h) = (w / t, h / t);
    if tile_w == 0 || tile_h == 0 {
        return;
    }
    let tile_pixels = tile_w * tile_h;
    let clip = (clip_limit * tile_pixels as f32) as u32;

    let mut cdfs: Vec<[f32; 256]> = Vec::with_capacity(t * t);
    for row in 0..t {
        for col in 0..t {
            let mut hist = [0u32; 256];
            for y in row * tile_h..(row + 1) * tile_h {
                for &p in &gray[y * w + col * tile_w..y * w + (col + 1) * tile_w] {
                    hist[p as usize] += 1;
                }
            }
            cdfs.push(clipped_cdf(&mut hist, clip, tile_pixels));
        }
    }

    for y in 0..h {
        let fy = (y as f32 / tile_h as f32 - 0.5).clamp(0.0, (t - 1) as f32);
        let (r0, dy) = (fy as usize, fy - fy.floor());
        let r1 = (r0 + 1).min(t - 1);

        for x in 0..w {
            let fx = (x as f32 / tile_w as f32 - 0.5).clamp(0.0, (t - 1) as f32);
            let (c0, dx) = (fx as usize, fx - fx.floor());
            let c1 = (c0 + 1).min(t - 1);

            let p = gray[y * w + x] as usize;
            let top = cdfs[r0 * t + c0][p] * (1.0 - dx) + cdfs[r0 * t + c1][p] * dx;
            let bot = cdfs[r1 * t + c0][p] * (1.0 - dx) + cdfs[r1 * t + c1][p] * dx;
            gray[y * w + x] = (top * (1.0 - dy) + bot * dy).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Clip a tile histogram, redistribute the excess, return the 0–255 CDF.
fn clipped_cdf(hist: &mut [u32; 256], clip: u32, tile_pixels: usize) -> [f32; 256] {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let (redist, leftover) = (excess / 256, (excess % 256) as usize);
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += redist + u32::from(i < leftover);
    }

    let mut cdf = [0f32; 256];
    let mut running = 0f32;
    for (slot, &count) in cdf.iter_mut().zip(hist.iter()) {
        running += count as f32;
        *slot = running;
    }
    let cdf_min = cdf.iter().copied().find(|&v| v > 0.0).unwrap_or(0.0);
    let denom = tile_pixels as f32 - cdf_min;
    if denom > 0.0 {
        for v in cdf.iter_mut() {
            *v = ((*v - cdf_min) / denom * 255.0).clamp(0.0, 255.0);
        }
    }
    cdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_yuyv() {
        let mut out = Vec::new();
        PixelFormat::Yuyv.decode_into(&[100, 128, 200, 128], 2, 1, &mut out).unwrap();
        assert_eq!(out, vec![100, 200]);
    }

    #[test]
    fn test_decode_y16_keeps_high_byte() {
        let mut out = vec![9, 9, 9];
        PixelFormat::Y16.decode_into(&[0xff, 0x12, 0x00, 0xab], 2, 1, &mut out).unwrap();
        assert_eq!(out, vec![0x12, 0xab]);
    }

    #[test]
    fn test_decode_short_buffer() {
        let mut out = Vec::new();
        let err = PixelFormat::Yuyv.decode_into(&[100, 128], 2, 1, &mut out).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 4, actual: 2, .. }));
    }

    #[test]
    fn test_pool_returns_buffer_on_drop() {
        let pool = FramePool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.outstanding(), 2);
        assert!(pool.acquire().is_none());
        drop(a);
        assert_eq!(pool.outstanding(), 1);
        let c = pool.acquire();
        assert!(c.is_some());
        drop(b);
        drop(c);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_pool_buffers_come_back_cleared() {
        let pool = FramePool::new(1);
        {
            let mut buf = pool.acquire().unwrap();
            buf.extend_from_slice(&[1, 2, 3]);
        }
        let buf = pool.acquire().unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 3);
    }

    #[test]
    fn test_oversized_buffer_shrinks_on_return() {
        let pool = FramePool::new(1);
        pool.set_retained_bytes(64);
        {
            let mut buf = pool.acquire().unwrap();
            buf.resize(4000 * 3000, 0);
        }
        let buf = pool.acquire().unwrap();
        assert!(buf.capacity() <= 64);
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_detached_buffer_leaves_pool_alone() {
        let pool = FramePool::new(1);
        drop(PooledBuffer::detached(vec![1, 2, 3]));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_frame_from_luma_checks_size() {
        assert!(Frame::from_luma(PooledBuffer::detached(vec![0; 5]), 2, 2).is_err());
        let frame = Frame::from_luma(PooledBuffer::detached(vec![200; 4]), 2, 2).unwrap();
        assert!(!frame.is_dark);
        assert!((frame.avg_brightness() - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_dark_frame() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
        assert!(is_dark_frame(&[], 0.95));

        let mut borderline = vec![10u8; 940];
        borderline.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&borderline, 0.95));
    }

    #[test]
    fn test_clahe_increases_contrast() {
        let (w, h) = (16u32, 16u32);
        let mut gray: Vec<u8> = (0..(w * h) as usize).map(|i| 100 + (i % 11) as u8).collect();

        let before = stddev(&gray);
        clahe_enhance(&mut gray, w, h, 2, 0.02);
        let after = stddev(&gray);
        assert!(after > before, "orig={before:.2}, new={after:.2}");
    }

    fn stddev(data: &[u8]) -> f32 {
        let n = data.len() as f32;
        let mean = data.iter().map(|&b| b as f32).sum::<f32>() / n;
        (data.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n).sqrt()
    }
}
