pub mod capture;
pub mod catalog;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod selection;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use arc_swap::ArcSwap;
use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::FoundDevice;

pub use capture::Frame;
pub use pipeline::{LiveTryOn, PipelineState};
pub use selection::{GarmentId, SelectedGarment, SelectionContext};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Environment variables override file values, e.g. `TRYON__REMOTE__BASE_URL`.
const ENV_PREFIX: &str = "TRYON";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub remote: RemoteConfig,
    pub pipeline: PipelineConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    /// Empty path means auto-detect.
    pub device: FoundDevice,
    /// Preferred resolution; advisory, the device's answer wins.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub tryon_path: String,
    pub catalog_path: String,
    /// Zero disables the client timeout.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub jpeg_quality: u8,
    pub autostart: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                source: CaptureSource::V4l2,
                device: FoundDevice::new("/dev/video0".into(), PixelFormat::Mjpeg),
                width: 640,
                height: 480,
                fps: 30,
                buffer_count: 4,
            },
            remote: RemoteConfig {
                base_url: "http://127.0.0.1:5000".into(),
                tryon_path: "/api/live-tryon".into(),
                catalog_path: "/api/catalog".into(),
                timeout_ms: 0,
            },
            pipeline: PipelineConfig {
                jpeg_quality: 80,
                autostart: false,
            },
            display: DisplayConfig {
                width: 640,
                height: 480,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `TRYON__*` environment
    /// variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.fps == 0 {
            return Err(ConfigError::Invalid("capture.fps must be at least 1".into()));
        }
        if self.capture.buffer_count == 0 {
            return Err(ConfigError::Invalid(
                "capture.buffer_count must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.pipeline.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "pipeline.jpeg_quality must be within 1..=100".into(),
            ));
        }
        reqwest::Url::parse(&self.remote.base_url).map_err(|e| {
            ConfigError::Invalid(format!("remote.base_url {:?}: {e}", self.remote.base_url))
        })?;
        Ok(())
    }
}

impl CaptureConfig {
    /// Interval of the scheduler's frame tick.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}
