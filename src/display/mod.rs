pub mod surface;

#[cfg(feature = "window")]
pub mod window;

pub use surface::{Canvas, RenderSurface, SurfaceContent};

#[cfg(feature = "window")]
pub use window::{action_for_key, PreviewWindow, UserAction};
