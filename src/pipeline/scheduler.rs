//! The cooperative capture / submit / render loop.
//!
//! One task drives one camera session. Every frame tick captures a raw frame
//! and draws it; when a garment is selected and nothing is outstanding the
//! frame is also submitted. Submissions run detached and report back through a
//! single-slot channel, so the loop never waits on the network and never has
//! more than one request in flight. Device reads run on the blocking pool so a
//! stalled driver cannot hold up the stop signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use super::state::PipelineState;
use super::stats::PipelineStats;
use crate::capture::{CameraSession, CameraStream, Frame};
use crate::display::RenderSurface;
use crate::error::{CaptureError, RemoteError};
use crate::remote::{TryOnRequest, TryOnResult, TryOnService};
use crate::selection::{GarmentId, SelectedGarment, SelectionContext};

/// A finished round trip, tagged with the garment it was submitted for.
struct Completed {
    garment: GarmentId,
    outcome: Result<TryOnResult, RemoteError>,
}

/// How long `stop` waits for a device read already in progress. A read that
/// takes longer releases the camera on the blocking thread when it returns.
const READ_GRACE: Duration = Duration::from_millis(200);

/// The session travels to the blocking pool and back with its frame buffer.
struct Camera<S: CameraStream> {
    session: CameraSession<S>,
    frame: Frame,
}

enum Capture {
    /// Metadata not reported yet.
    NotReady,
    Read(Result<(), CaptureError>),
}

type Reading<S> = JoinHandle<(Camera<S>, Capture)>;

/// Why the loop ended.
#[derive(Debug)]
pub(crate) enum Exit {
    Stopped,
    Fatal(CaptureError),
}

pub(crate) struct Shared<T> {
    pub service: Arc<T>,
    pub selection: Arc<SelectionContext>,
    pub surface: Arc<RenderSurface>,
    pub stats: Arc<PipelineStats>,
    pub state: Arc<watch::Sender<PipelineState>>,
}

pub(crate) struct Scheduler<S: CameraStream, T: TryOnService> {
    /// `None` while a read is in flight.
    camera: Option<Camera<S>>,
    reading: Option<Reading<S>>,
    /// Selection snapshot taken when the current cycle began.
    cycle_selection: Option<Arc<SelectedGarment>>,
    shared: Shared<T>,
    frame_interval: Duration,
    jpeg_quality: u8,
    /// Guard flag: garment of the request in flight, if any.
    outstanding: Option<GarmentId>,
    results_tx: flume::Sender<Completed>,
    results_rx: flume::Receiver<Completed>,
}

impl<S: CameraStream, T: TryOnService> Scheduler<S, T> {
    pub(crate) fn new(
        session: CameraSession<S>,
        shared: Shared<T>,
        frame_interval: Duration,
        jpeg_quality: u8,
    ) -> Self {
        let (results_tx, results_rx) = flume::bounded(1);
        Self {
            camera: Some(Camera {
                session,
                frame: Frame::empty(),
            }),
            reading: None,
            cycle_selection: None,
            shared,
            frame_interval,
            jpeg_quality,
            outstanding: None,
            results_tx,
            results_rx,
        }
    }

    /// Run cycles until `stop` flips or the camera fails. Consumes the
    /// scheduler, so the session is released on every way out.
    pub(crate) async fn run(mut self, mut stop: watch::Receiver<bool>) -> Exit {
        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.set_state(PipelineState::Capturing);

        let exit = loop {
            if *stop.borrow() {
                break Exit::Stopped;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    // Err: the controller went away
                    if changed.is_err() || *stop.borrow() {
                        break Exit::Stopped;
                    }
                }
                Ok(completed) = self.results_rx.recv_async() => self.complete(completed),
                joined = join_read(&mut self.reading) => {
                    self.reading = None;
                    if let Err(err) = self.finish_cycle(joined) {
                        break Exit::Fatal(err);
                    }
                }
                _ = ticker.tick(), if self.camera.is_some() => self.begin_cycle(),
            }
        };

        if let Some(reading) = self.reading.take() {
            match time::timeout(READ_GRACE, reading).await {
                Ok(_) => trace!("Read in progress finished before release"),
                Err(_) => warn!("Camera read still blocked, device is released when it returns"),
            }
        }
        if let Some(garment) = self.outstanding.take() {
            self.shared.stats.settled();
            debug!(%garment, "Session ending with a request in flight, its result will be dropped");
        }
        self.set_state(PipelineState::Idle);
        exit
    }

    /// Start a cycle: snapshot the selection and hand the read to the
    /// blocking pool. Ticks are not taken while a read is in flight.
    fn begin_cycle(&mut self) {
        let Some(mut camera) = self.camera.take() else {
            return;
        };
        self.shared.stats.cycle();
        self.finish_rendering();
        // One snapshot per cycle keeps the submit/skip decision stable
        self.cycle_selection = self.shared.selection.snapshot();

        self.reading = Some(tokio::task::spawn_blocking(move || {
            let capture = match camera.session.poll_ready() {
                None => Capture::NotReady,
                Some(_) => Capture::Read(camera.session.read_frame(&mut camera.frame)),
            };
            (camera, capture)
        }));
    }

    fn finish_cycle(
        &mut self,
        joined: Result<(Camera<S>, Capture), JoinError>,
    ) -> Result<(), CaptureError> {
        let (camera, capture) = match joined {
            Ok(read) => read,
            Err(e) => {
                error!("Camera read task failed: {}", e);
                return Err(CaptureError::Io(std::io::Error::other(e.to_string())));
            }
        };
        self.camera = Some(camera);
        let selection = self.cycle_selection.take();

        match capture {
            Capture::NotReady => {
                self.shared.stats.metadata_wait();
                trace!("Camera metadata not available yet");
                return Ok(());
            }
            Capture::Read(Ok(())) => {}
            Capture::Read(Err(err)) if !err.is_fatal() => {
                warn!("Skipping frame: {}", err);
                return Ok(());
            }
            Capture::Read(Err(err)) => {
                error!("Camera read failed: {}", err);
                return Err(err);
            }
        }

        let Some(camera) = &self.camera else {
            return Ok(());
        };
        if self.shared.surface.draw_raw(&camera.frame) {
            self.shared.stats.raw_frame();
        }

        let Some(garment) = selection else {
            return Ok(());
        };
        if let Some(outstanding) = &self.outstanding {
            self.shared.stats.busy_skip();
            trace!(
                %outstanding,
                "Request in flight, not submitting frame {}",
                camera.frame.meta.sequence
            );
            return Ok(());
        }
        self.submit(&garment);
        Ok(())
    }

    fn submit(&mut self, garment: &SelectedGarment) {
        let Some(camera) = &self.camera else {
            return;
        };
        let sequence = camera.frame.meta.sequence;
        let request =
            TryOnRequest::from_frame(&camera.frame, garment.id.clone(), self.jpeg_quality);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                self.shared.stats.failure();
                warn!(garment = %garment.id, "Could not prepare try-on request: {}", err);
                return;
            }
        };

        debug!(
            garment = %garment.id,
            sequence,
            bytes = request.frame.len(),
            "Submitting frame for try-on"
        );

        let request_future = self.shared.service.try_on(request);
        let results = self.results_tx.clone();
        let garment_id = garment.id.clone();
        tokio::spawn(async move {
            // Inner task so a panicking service still reports back
            let outcome = match tokio::spawn(request_future).await {
                Ok(outcome) => outcome,
                Err(e) => Err(RemoteError::Aborted(e.to_string())),
            };
            let completed = Completed {
                garment: garment_id,
                outcome,
            };
            if let Err(flume::SendError(completed)) = results.send_async(completed).await {
                debug!(garment = %completed.garment, "Dropping try-on result for a stopped session");
            }
        });

        self.outstanding = Some(garment.id.clone());
        self.shared.stats.submitted();
        self.set_state(PipelineState::AwaitingRemote);
    }

    fn complete(&mut self, completed: Completed) {
        let Completed { garment, outcome } = completed;
        if self.outstanding.take().is_some() {
            self.shared.stats.settled();
        }

        match outcome {
            Ok(TryOnResult::Image(image)) => {
                if !self.shared.selection.is_selected(&garment) {
                    self.shared.stats.stale_discarded();
                    debug!(%garment, "Selection changed while in flight, discarding result");
                } else {
                    if self.shared.surface.draw_result(&garment, &image) {
                        self.shared.stats.result_drawn();
                    }
                    // Held until the next cycle begins
                    self.set_state(PipelineState::Rendering);
                    return;
                }
            }
            Ok(TryOnResult::Empty) => {
                self.shared.stats.empty_result();
                debug!(%garment, "Service returned no result image");
            }
            Err(err) => {
                self.shared.stats.failure();
                warn!(%garment, "Try-on request failed, staying on live video: {}", err);
            }
        }

        self.set_state(PipelineState::Capturing);
    }

    fn finish_rendering(&self) {
        self.shared.state.send_if_modified(|state| {
            if *state != PipelineState::Rendering {
                return false;
            }
            *state = PipelineState::Capturing;
            true
        });
    }

    fn set_state(&self, next: PipelineState) {
        self.shared.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            trace!("Pipeline {} -> {}", state, next);
            *state = next;
            true
        });
    }
}

/// Resolves with the in-flight read, or never when there is none.
async fn join_read<S: CameraStream>(
    reading: &mut Option<Reading<S>>,
) -> Result<(Camera<S>, Capture), JoinError> {
    match reading {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
