pub mod live;
mod scheduler;
pub mod state;
pub mod stats;

pub use live::LiveTryOn;
pub use state::{status_text, PipelineState};
pub use stats::{PipelineStats, StatsSnapshot};
