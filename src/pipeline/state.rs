use std::fmt;

use crate::error::SessionError;
use crate::selection::SelectedGarment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Before the first start and after stop.
    #[default]
    Idle,
    Capturing,
    /// A try-on request is outstanding.
    AwaitingRemote,
    /// Drawing a completed result.
    Rendering,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Capturing => "capturing",
            PipelineState::AwaitingRemote => "awaiting remote",
            PipelineState::Rendering => "rendering",
        };
        f.write_str(name)
    }
}

/// Status line shown next to the live view.
pub fn status_text(
    state: PipelineState,
    selection: Option<&SelectedGarment>,
    last_error: Option<&SessionError>,
) -> String {
    if let Some(err) = last_error {
        return match err {
            SessionError::DeviceUnavailable(_) => err.to_string(),
            SessionError::PlaybackBlocked(_) => format!("{err}. Press P to retry playback."),
        };
    }
    match (state, selection) {
        (PipelineState::Idle, _) => "Camera stopped".into(),
        (PipelineState::AwaitingRemote | PipelineState::Rendering, _) => "Processing...".into(),
        (PipelineState::Capturing, Some(garment)) => {
            format!("Trying on: {}", garment.display_name)
        }
        (PipelineState::Capturing, None) => "Select a clothing item to try on".into(),
    }
}
