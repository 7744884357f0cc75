//! Lifecycle controller for the live try-on view.
//!
//! [`LiveTryOn`] owns the camera device and the running scheduler task. It is
//! what the UI calls into: start, stop, retry playback, and read state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::scheduler::{Exit, Scheduler, Shared};
use super::state::{status_text, PipelineState};
use super::stats::{PipelineStats, StatsSnapshot};
use crate::capture::{CameraDevice, CameraSession};
use crate::display::RenderSurface;
use crate::error::SessionError;
use crate::remote::TryOnService;
use crate::selection::SelectionContext;
use crate::{CaptureConfig, Config};

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct LiveTryOn<D: CameraDevice, T: TryOnService> {
    device: D,
    service: Arc<T>,
    capture: CaptureConfig,
    jpeg_quality: u8,
    selection: Arc<SelectionContext>,
    surface: Arc<RenderSurface>,
    stats: Arc<PipelineStats>,
    state: Arc<watch::Sender<PipelineState>>,
    last_error: Arc<Mutex<Option<SessionError>>>,
    running: Option<Running>,
    /// Acquired but playback was blocked; reused by `retry_playback`.
    parked: Option<CameraSession<D::Stream>>,
}

impl<D: CameraDevice, T: TryOnService> LiveTryOn<D, T> {
    pub fn new(device: D, service: T, config: &Config) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            device,
            service: Arc::new(service),
            capture: config.capture.clone(),
            jpeg_quality: config.pipeline.jpeg_quality,
            selection: Arc::new(SelectionContext::new()),
            surface: Arc::new(RenderSurface::new()),
            stats: Arc::new(PipelineStats::new()),
            state: Arc::new(state),
            last_error: Arc::new(Mutex::new(None)),
            running: None,
            parked: None,
        }
    }

    /// Share a selection context owned by the catalog UI.
    pub fn with_selection(mut self, selection: Arc<SelectionContext>) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> &Arc<SelectionContext> {
        &self.selection
    }

    pub fn surface(&self) -> &Arc<RenderSurface> {
        &self.surface
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Whether a scheduler task is alive.
    pub fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error.lock().clone()
    }

    pub fn status(&self) -> String {
        let selection = self.selection.snapshot();
        status_text(
            self.state(),
            selection.as_deref(),
            self.last_error.lock().as_ref(),
        )
    }

    /// Acquire the camera and begin scheduling cycles. A no-op while active.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.reap();
        if self.running.is_some() {
            debug!("Live try-on already active");
            return Ok(());
        }

        let mut session = match self.parked.take() {
            Some(session) => session,
            None => match CameraSession::acquire(&self.device, &self.capture) {
                Ok(session) => session,
                Err(err) => return Err(self.fail(err)),
            },
        };
        if let Err(err) = session.play() {
            self.parked = Some(session);
            return Err(self.fail(err));
        }

        *self.last_error.lock() = None;
        self.surface.activate();

        let (stop, stop_rx) = watch::channel(false);
        let shared = Shared {
            service: Arc::clone(&self.service),
            selection: Arc::clone(&self.selection),
            surface: Arc::clone(&self.surface),
            stats: Arc::clone(&self.stats),
            state: Arc::clone(&self.state),
        };
        let scheduler = Scheduler::new(
            session,
            shared,
            self.capture.frame_interval(),
            self.jpeg_quality,
        );

        let surface = Arc::clone(&self.surface);
        let last_error = Arc::clone(&self.last_error);
        let task = tokio::spawn(async move {
            match scheduler.run(stop_rx).await {
                Exit::Stopped => debug!("Scheduler stopped"),
                Exit::Fatal(err) => {
                    surface.deactivate();
                    *last_error.lock() = Some(SessionError::DeviceUnavailable(format!(
                        "camera stopped responding: {err}"
                    )));
                }
            }
        });

        self.running = Some(Running { stop, task });
        info!("Live try-on started");
        Ok(())
    }

    /// Explicit retry after `PlaybackBlocked`, reusing the acquired device.
    pub async fn retry_playback(&mut self) -> Result<(), SessionError> {
        if self.parked.is_none() && self.is_active() {
            return Ok(());
        }
        info!("Retrying camera playback");
        self.start().await
    }

    /// Stop scheduling and release the camera. Idempotent.
    ///
    /// A request already sent is left to finish; its result is dropped.
    pub async fn stop(&mut self) {
        self.surface.deactivate();

        if self.parked.take().is_some() {
            info!("Released camera with blocked playback");
        }

        if let Some(Running { stop, task }) = self.running.take() {
            let _ = stop.send(true);
            if let Err(e) = task.await {
                error!("Scheduler task failed: {}", e);
            }
            info!("Live try-on stopped");
        }

        *self.last_error.lock() = None;
        self.state.send_replace(PipelineState::Idle);
    }

    /// Forget a scheduler that exited on its own (fatal capture error).
    fn reap(&mut self) {
        if self
            .running
            .as_ref()
            .is_some_and(|running| running.task.is_finished())
        {
            self.running = None;
        }
    }

    fn fail(&self, err: SessionError) -> SessionError {
        match &err {
            SessionError::DeviceUnavailable(_) => error!("{}", err),
            SessionError::PlaybackBlocked(_) => warn!("{}", err),
        }
        *self.last_error.lock() = Some(err.clone());
        self.state.send_replace(PipelineState::Idle);
        err
    }
}

impl<D: CameraDevice, T: TryOnService> Drop for LiveTryOn<D, T> {
    fn drop(&mut self) {
        self.surface.deactivate();
        if let Some(running) = self.running.take() {
            // The task releases the camera once it sees the signal
            let _ = running.stop.send(true);
        }
    }
}
