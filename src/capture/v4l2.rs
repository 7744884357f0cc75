//! V4L2 camera source with memory-mapped streaming

use std::time::Duration;

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::decoder;
use super::device::{CameraDevice, CameraStream};
use super::frame::{Frame, PixelFormat};
use crate::error::{CaptureError, SessionError};
use crate::utils::{self, FoundDevice};
use crate::CaptureConfig;

/// Frame intervals a dequeue may wait before the cycle is skipped.
const READ_TIMEOUT_FRAMES: u32 = 4;

/// A V4L2 video node. An empty path is resolved by auto-detection at open.
pub struct V4l2Camera {
    device: FoundDevice,
}

impl V4l2Camera {
    pub fn new(device: FoundDevice) -> Self {
        Self { device }
    }

    fn resolve(&self) -> Result<FoundDevice, SessionError> {
        if self.device.path.is_empty() {
            utils::auto_detect_device()
        } else {
            Ok(self.device.clone())
        }
    }
}

impl CameraDevice for V4l2Camera {
    type Stream = V4l2Stream;

    #[instrument(skip(self, config))]
    fn open(&self, config: &CaptureConfig) -> Result<V4l2Stream, SessionError> {
        let found = self.resolve()?;
        let unavailable =
            |e: std::io::Error| SessionError::DeviceUnavailable(format!("{}: {e}", found.path));

        let device = Device::with_path(&found.path).map_err(unavailable)?;

        // Query capabilities
        let caps = device.query_caps().map_err(unavailable)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SessionError::DeviceUnavailable(format!(
                "{} does not support video capture",
                found.path
            )));
        }

        // Preferred size and format; the driver answers with what it can do
        let mut fmt = device.format().map_err(unavailable)?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc_for(found.format);
        let actual = device.set_format(&fmt).map_err(unavailable)?;

        let format = format_for(actual.fourcc).ok_or_else(|| {
            SessionError::DeviceUnavailable(format!(
                "{} offers no supported pixel format (got {})",
                found.path, actual.fourcc
            ))
        })?;

        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            warn!("Could not set {} fps: {}", config.fps, e);
        }

        info!(
            "Negotiated {}x{} {:?} (requested {}x{})",
            actual.width, actual.height, format, config.width, config.height
        );

        Ok(V4l2Stream {
            stream: None,
            read_timeout: config.frame_interval() * READ_TIMEOUT_FRAMES,
            device,
            path: found.path,
            format,
            width: actual.width,
            height: actual.height,
            buffer_count: config.buffer_count,
        })
    }

    fn describe(&self) -> String {
        if self.device.path.is_empty() {
            "auto-detected V4L2 device".into()
        } else {
            self.device.path.clone()
        }
    }
}

fn fourcc_for(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
    }
}

fn format_for(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv4),
        b"RGB3" => Some(PixelFormat::Rgb24),
        _ => None,
    }
}

/// Open V4L2 node plus its mmap stream once playing.
pub struct V4l2Stream {
    // Dropped before the device
    stream: Option<MmapStream<'static>>,
    /// Longest a single dequeue may block.
    read_timeout: Duration,
    device: Device,
    path: String,
    format: PixelFormat,
    width: u32,
    height: u32,
    buffer_count: u32,
}

impl CameraStream for V4l2Stream {
    fn play(&mut self) -> Result<(), SessionError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let blocked =
            |e: std::io::Error| SessionError::PlaybackBlocked(format!("{}: {e}", self.path));

        let mut stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
                .map_err(blocked)?;
        stream.set_timeout(self.read_timeout);
        stream.start().map_err(blocked)?;

        info!("Capture stream started with {} buffers", self.buffer_count);
        self.stream = Some(stream);
        Ok(())
    }

    fn dimensions(&mut self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|_| (self.width, self.height))
    }

    /// Blocks until the driver dequeues the next buffer or `read_timeout`
    /// passes, which is reported as a skipped frame.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), CaptureError> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            CaptureError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "stream not started",
            ))
        })?;

        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Err(CaptureError::Timeout(self.read_timeout));
            }
            Err(e) => return Err(e.into()),
        };
        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };

        decoder::decode_frame(&buf[..used], self.format, self.width, self.height, frame)?;
        frame.meta.device_timestamp = Some(
            Duration::from_secs(meta.timestamp.sec as u64)
                + Duration::from_micros(meta.timestamp.usec as u64),
        );
        Ok(())
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        // MmapStream turns streaming off when dropped
        drop(self.stream.take());
        info!("Camera released: {}", self.path);
    }
}
