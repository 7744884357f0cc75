//! Hardware-free camera that renders a moving test pattern.
//!
//! Selected with `capture.source = "synthetic"` or `--synthetic`. It also
//! reports how many leases are outstanding, which the lifecycle tests rely on.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::device::{CameraDevice, CameraStream};
use super::frame::{Frame, PixelFormat};
use crate::error::{CaptureError, SessionError};
use crate::CaptureConfig;

#[derive(Clone, Default)]
pub struct SyntheticCamera {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    leases: AtomicUsize,
    acquisitions: AtomicUsize,
    /// Polls that report no dimensions before metadata becomes available.
    ready_after: u32,
    /// Open fails with `DeviceUnavailable` while set.
    deny_access: Option<String>,
    /// Number of `play` calls that fail with `PlaybackBlocked`.
    blocked_plays: AtomicU32,
    /// Reads fail with an I/O error after this many frames.
    disconnect_after: Option<u64>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ready_after(polls: u32) -> Self {
        Self::build(|inner| inner.ready_after = polls)
    }

    pub fn denying_access(reason: &str) -> Self {
        Self::build(|inner| inner.deny_access = Some(reason.to_string()))
    }

    pub fn with_blocked_playback(attempts: u32) -> Self {
        Self::build(|inner| inner.blocked_plays = AtomicU32::new(attempts))
    }

    pub fn disconnecting_after(frames: u64) -> Self {
        Self::build(|inner| inner.disconnect_after = Some(frames))
    }

    fn build(configure: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Inner::default();
        configure(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Streams currently alive.
    pub fn leases(&self) -> usize {
        self.inner.leases.load(Ordering::SeqCst)
    }

    /// Successful opens over the camera's lifetime.
    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }
}

impl CameraDevice for SyntheticCamera {
    type Stream = SyntheticStream;

    fn open(&self, config: &CaptureConfig) -> Result<SyntheticStream, SessionError> {
        if let Some(reason) = &self.inner.deny_access {
            return Err(SessionError::DeviceUnavailable(reason.clone()));
        }
        self.inner.leases.fetch_add(1, Ordering::SeqCst);
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(SyntheticStream {
            camera: Arc::clone(&self.inner),
            width: config.width,
            height: config.height,
            polls: 0,
            frames: 0,
        })
    }

    fn describe(&self) -> String {
        "synthetic test pattern".into()
    }
}

pub struct SyntheticStream {
    camera: Arc<Inner>,
    width: u32,
    height: u32,
    polls: u32,
    frames: u64,
}

impl CameraStream for SyntheticStream {
    fn play(&mut self) -> Result<(), SessionError> {
        let blocked = self
            .camera
            .blocked_plays
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match blocked {
            Ok(_) => Err(SessionError::PlaybackBlocked(
                "autoplay was prevented".into(),
            )),
            Err(_) => Ok(()),
        }
    }

    fn dimensions(&mut self) -> Option<(u32, u32)> {
        if self.polls < self.camera.ready_after {
            self.polls += 1;
            return None;
        }
        Some((self.width, self.height))
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), CaptureError> {
        if self.camera.disconnect_after.is_some_and(|n| self.frames >= n) {
            return Err(CaptureError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "synthetic camera unplugged",
            )));
        }
        self.frames += 1;

        let width = self.width as usize;
        let phase = self.frames as usize;
        let out = frame.prepare(self.width, self.height, PixelFormat::Rgb24);
        for (i, px) in out.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % width, i / width);
            px[0] = (x + phase) as u8;
            px[1] = (y + phase) as u8;
            px[2] = ((x + y) / 2) as u8;
        }
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.camera.leases.fetch_sub(1, Ordering::SeqCst);
    }
}
