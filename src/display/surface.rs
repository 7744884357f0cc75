//! Off-screen RGB24 buffer holding what the user currently sees.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use parking_lot::Mutex;
use tracing::trace;

use crate::capture::Frame;
use crate::selection::GarmentId;

/// What the surface was last drawn with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceContent {
    Blank,
    /// Raw camera frame with this sequence number.
    Raw { sequence: u64 },
    /// Remote result rendered for this garment.
    Result { garment: GarmentId },
}

pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub content: SurfaceContent,
    /// Bumped on every successful draw.
    pub version: u64,
}

/// Both draws overwrite in place and are no-ops while the surface is
/// inactive, which guards against results landing after `stop()`.
pub struct RenderSurface {
    active: AtomicBool,
    canvas: Mutex<Canvas>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            canvas: Mutex::new(Canvas {
                width: 0,
                height: 0,
                pixels: Vec::new(),
                content: SurfaceContent::Blank,
                version: 0,
            }),
        }
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Copy a raw frame onto the surface, adopting its dimensions.
    pub fn draw_raw(&self, frame: &Frame) -> bool {
        if !self.is_active() || frame.is_empty() {
            return false;
        }
        let mut canvas = self.canvas.lock();
        canvas.width = frame.meta.width;
        canvas.height = frame.meta.height;
        canvas.pixels.clear();
        canvas.pixels.extend_from_slice(&frame.pixels);
        canvas.content = SurfaceContent::Raw {
            sequence: frame.meta.sequence,
        };
        canvas.version += 1;
        true
    }

    /// Draw a remote result scaled to the current surface size.
    pub fn draw_result(&self, garment: &GarmentId, image: &RgbImage) -> bool {
        if !self.is_active() {
            trace!("Surface inactive, result for {} dropped", garment);
            return false;
        }
        let started = Instant::now();
        let mut canvas = self.canvas.lock();
        if canvas.width == 0 || canvas.height == 0 {
            canvas.width = image.width();
            canvas.height = image.height();
        }

        if image.dimensions() == (canvas.width, canvas.height) {
            canvas.pixels.clear();
            canvas.pixels.extend_from_slice(image.as_raw());
        } else {
            let scaled = imageops::resize(image, canvas.width, canvas.height, FilterType::Triangle);
            canvas.pixels = scaled.into_raw();
        }
        canvas.content = SurfaceContent::Result {
            garment: garment.clone(),
        };
        canvas.version += 1;

        metrics::histogram!("render_time_us").record(started.elapsed().as_micros() as f64);
        true
    }

    pub fn content(&self) -> SurfaceContent {
        self.canvas.lock().content.clone()
    }

    pub fn version(&self) -> u64 {
        self.canvas.lock().version
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let canvas = self.canvas.lock();
        (canvas.width, canvas.height)
    }

    /// Run `f` against the canvas if it changed since `seen_version`.
    pub fn read_if_newer<R>(&self, seen_version: u64, f: impl FnOnce(&Canvas) -> R) -> Option<R> {
        let canvas = self.canvas.lock();
        (canvas.version > seen_version).then(|| f(&canvas))
    }
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}
