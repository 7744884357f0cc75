use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// RGB24 frame buffer, owned by the session and overwritten every cycle.
pub struct Frame {
    /// Packed RGB24 pixels, `width * height * 3` bytes once filled.
    pub pixels: Vec<u8>,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Format the device delivered before conversion to RGB24.
    pub source_format: Option<PixelFormat>,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Yuyv4,
    Mjpeg,
}

impl Frame {
    pub fn empty() -> Self {
        Self {
            pixels: Vec::new(),
            meta: FrameMetadata::default(),
            timestamp: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meta.width == 0 || self.meta.height == 0 || self.pixels.is_empty()
    }

    /// Resize the pixel buffer for `width x height` and stamp new metadata.
    /// The allocation is kept across cycles.
    pub fn prepare(&mut self, width: u32, height: u32, format: PixelFormat) -> &mut [u8] {
        let len = width as usize * height as usize * 3;
        self.pixels.resize(len, 0);
        self.meta.sequence += 1;
        self.meta.width = width;
        self.meta.height = height;
        self.meta.source_format = Some(format);
        self.meta.device_timestamp = None;
        self.timestamp = Instant::now();
        &mut self.pixels[..len]
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}
