pub mod decoder;
pub mod device;
pub mod frame;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use device::{CameraDevice, CameraSession, CameraStream};
pub use frame::Frame;
pub use frame::PixelFormat;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Camera;
