//! Camera device abstraction and the scoped session handle.
//!
//! A [`CameraDevice`] hands out one [`CameraStream`] per acquisition. The
//! stream *is* the hardware lease: dropping it stops streaming and closes the
//! device, so every exit path releases the camera without bookkeeping.

use tracing::{debug, info, instrument};

use super::frame::Frame;
use crate::error::{CaptureError, SessionError};
use crate::CaptureConfig;

/// A source of camera streams (V4L2 node, synthetic pattern, ...).
///
/// Video only; audio is never requested.
pub trait CameraDevice: Send + Sync + 'static {
    type Stream: CameraStream;

    /// Acquire the device. `config.width`/`config.height` are a hint only.
    fn open(&self, config: &CaptureConfig) -> Result<Self::Stream, SessionError>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

/// An acquired, exclusively owned camera stream.
pub trait CameraStream: Send + 'static {
    /// Begin delivering frames.
    fn play(&mut self) -> Result<(), SessionError>;

    /// Negotiated dimensions, `None` until the device reports metadata.
    fn dimensions(&mut self) -> Option<(u32, u32)>;

    /// Overwrite `frame` with the next camera frame.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), CaptureError>;
}

/// Exactly one live device lease.
pub struct CameraSession<S: CameraStream> {
    stream: S,
    name: String,
    playing: bool,
    dimensions: Option<(u32, u32)>,
}

impl<S: CameraStream> CameraSession<S> {
    #[instrument(skip_all, fields(device = %device.describe()))]
    pub fn acquire<D>(device: &D, config: &CaptureConfig) -> Result<Self, SessionError>
    where
        D: CameraDevice<Stream = S>,
    {
        let stream = device.open(config)?;
        info!(
            "Camera acquired (preferred {}x{})",
            config.width, config.height
        );
        Ok(Self {
            stream,
            name: device.describe(),
            playing: false,
            dimensions: None,
        })
    }

    /// Start playback. Safe to call again after a `PlaybackBlocked` failure.
    pub fn play(&mut self) -> Result<(), SessionError> {
        if self.playing {
            return Ok(());
        }
        self.stream.play()?;
        self.playing = true;
        info!("Camera playback started: {}", self.name);
        Ok(())
    }

    /// Readiness gate: dimensions once the device has reported them.
    pub fn poll_ready(&mut self) -> Option<(u32, u32)> {
        if self.dimensions.is_none() {
            self.dimensions = self
                .stream
                .dimensions()
                .filter(|&(width, height)| width > 0 && height > 0);
            if let Some((width, height)) = self.dimensions {
                info!("Camera ready at {}x{}", width, height);
            }
        }
        self.dimensions
    }

    pub fn read_frame(&mut self, frame: &mut Frame) -> Result<(), CaptureError> {
        self.stream.read_frame(frame)
    }
}

impl<S: CameraStream> Drop for CameraSession<S> {
    fn drop(&mut self) {
        debug!("Releasing camera: {}", self.name);
    }
}
