use thiserror::Error;

/// Camera lifecycle errors. Both halt the pipeline and are shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Access denied, no such device, or the device cannot capture video.
    #[error("could not access camera: {0}")]
    DeviceUnavailable(String),

    /// The device was acquired but its stream did not start.
    #[error("camera playback failed: {0}")]
    PlaybackBlocked(String),
}

/// Per-frame capture errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("unsupported pixel format: {0}")]
    Format(String),

    #[error("no frame within {0:?}")]
    Timeout(std::time::Duration),
}

impl CaptureError {
    /// Fatal errors end the session; the rest only skip the current cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Io(_))
    }
}

/// Errors from a single try-on round trip. Never stop the pipeline.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service rejected frame ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("result image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("frame could not be encoded: {0}")]
    Encode(String),

    #[error("request task failed: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
