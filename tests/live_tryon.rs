//! Pipeline scenarios against the synthetic camera and a scripted service.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use parking_lot::{Condvar, Mutex};
use tokio::sync::{mpsc, oneshot};
use tryon::capture::{CameraDevice, CameraStream, PixelFormat, SyntheticCamera};
use tryon::display::SurfaceContent;
use tryon::error::{CaptureError, RemoteError, SessionError};
use tryon::remote::{TryOnFuture, TryOnRequest, TryOnResult, TryOnService};
use tryon::{
    CaptureConfig, Config, Frame, GarmentId, LiveTryOn, PipelineState, SelectedGarment,
};

type Reply = oneshot::Sender<Result<TryOnResult, RemoteError>>;

/// Hands every request to the test, which decides when and how it resolves.
struct ScriptedService {
    requests: mpsc::UnboundedSender<(TryOnRequest, Reply)>,
}

impl ScriptedService {
    fn new() -> (Self, mpsc::UnboundedReceiver<(TryOnRequest, Reply)>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (Self { requests }, rx)
    }
}

impl TryOnService for ScriptedService {
    fn try_on(&self, request: TryOnRequest) -> TryOnFuture {
        let (reply, outcome) = oneshot::channel();
        let _ = self.requests.send((request, reply));
        Box::pin(async move {
            outcome
                .await
                .unwrap_or_else(|_| Err(RemoteError::Malformed("reply dropped".into())))
        })
    }
}

/// Camera whose reads block from the third frame until `release` is called,
/// like a driver that stops delivering buffers.
#[derive(Clone, Default)]
struct StallingCamera {
    inner: Arc<Stall>,
}

#[derive(Default)]
struct Stall {
    leases: AtomicUsize,
    reads: AtomicU64,
    released: Mutex<bool>,
    gate: Condvar,
}

impl StallingCamera {
    fn leases(&self) -> usize {
        self.inner.leases.load(Ordering::SeqCst)
    }

    fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    fn release(&self) {
        *self.inner.released.lock() = true;
        self.inner.gate.notify_all();
    }
}

impl CameraDevice for StallingCamera {
    type Stream = StallingStream;

    fn open(&self, _config: &CaptureConfig) -> Result<StallingStream, SessionError> {
        self.inner.leases.fetch_add(1, Ordering::SeqCst);
        Ok(StallingStream {
            stall: Arc::clone(&self.inner),
        })
    }

    fn describe(&self) -> String {
        "stalling camera".into()
    }
}

struct StallingStream {
    stall: Arc<Stall>,
}

impl CameraStream for StallingStream {
    fn play(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn dimensions(&mut self) -> Option<(u32, u32)> {
        Some((16, 12))
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<(), CaptureError> {
        let read = self.stall.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if read >= 3 {
            let mut released = self.stall.released.lock();
            while !*released {
                self.stall.gate.wait(&mut released);
            }
        }
        frame.prepare(16, 12, PixelFormat::Rgb24).fill(read as u8);
        Ok(())
    }
}

impl Drop for StallingStream {
    fn drop(&mut self) {
        self.stall.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

fn config(width: u32, height: u32) -> Config {
    let mut config = Config::default();
    config.capture.width = width;
    config.capture.height = height;
    config
}

fn result_image() -> TryOnResult {
    TryOnResult::Image(RgbImage::from_pixel(32, 24, Rgb([200, 30, 30])))
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Let the scheduler run for a while of virtual time.
async fn run_for(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn pipeline(
    camera: &SyntheticCamera,
    width: u32,
    height: u32,
) -> (
    LiveTryOn<SyntheticCamera, ScriptedService>,
    mpsc::UnboundedReceiver<(TryOnRequest, Reply)>,
) {
    let (service, requests) = ScriptedService::new();
    let live = LiveTryOn::new(camera.clone(), service, &config(width, height));
    (live, requests)
}

#[tokio::test(start_paused = true)]
async fn no_selection_shows_raw_frames_only() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 640, 480);

    live.start().await.unwrap();
    wait_until("raw frames", || live.stats().raw_frames >= 5).await;

    assert_eq!(live.surface().dimensions(), (640, 480));
    assert!(matches!(live.surface().content(), SurfaceContent::Raw { .. }));
    assert_eq!(live.stats().submitted, 0);
    assert!(requests.try_recv().is_err());
    assert_eq!(live.status(), "Select a clothing item to try on");

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn result_is_drawn_and_capture_resumes() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 64, 48);
    live.selection()
        .select(SelectedGarment::new("G1", "Denim Jacket"));

    live.start().await.unwrap();
    let (request, reply) = requests.recv().await.unwrap();
    assert_eq!(request.garment_id, GarmentId::new("G1"));
    assert_eq!(&request.frame[..2], &[0xFF, 0xD8]);
    assert_eq!(live.state(), PipelineState::AwaitingRemote);
    assert_eq!(live.status(), "Processing...");

    reply.send(Ok(result_image())).unwrap();
    wait_until("result drawn", || live.stats().results_drawn == 1).await;
    assert_eq!(live.surface().dimensions(), (64, 48));

    // Capture continues and the next frame goes out for the same garment
    let raw_before = live.stats().raw_frames;
    let (next, _reply) = requests.recv().await.unwrap();
    assert_eq!(next.garment_id, GarmentId::new("G1"));
    assert!(live.stats().raw_frames > raw_before);
    assert!(live.is_active());

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn at_most_one_request_in_flight() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("G1", "Tee"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();

    run_for(500).await;
    let stats = live.stats();
    assert!(stats.busy_skips >= 10, "busy skips: {}", stats.busy_skips);
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.submitted, 1);
    assert!(requests.try_recv().is_err());

    reply.send(Ok(TryOnResult::Empty)).unwrap();
    let (_, _reply) = requests.recv().await.unwrap();

    let stats = live.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.peak_in_flight, 1);

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_camera_running() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("G1", "Tee"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();
    reply
        .send(Err(RemoteError::Rejected {
            status: 500,
            message: "Server error: 500".into(),
        }))
        .unwrap();

    let (next, _reply) = requests.recv().await.unwrap();
    assert_eq!(next.garment_id, GarmentId::new("G1"));
    assert_eq!(live.stats().failures, 1);
    assert!(live.is_active());
    assert_eq!(camera.leases(), 1);
    assert!(matches!(live.surface().content(), SurfaceContent::Raw { .. }));
    assert_eq!(live.last_error(), None);

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn empty_reference_continues_capture() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("G1", "Tee"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();
    reply.send(Ok(TryOnResult::Empty)).unwrap();

    let (_, _reply) = requests.recv().await.unwrap();
    let stats = live.stats();
    assert_eq!(stats.empty_results, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.results_drawn, 0);

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn late_result_after_stop_is_dropped() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("G1", "Tee"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();

    live.stop().await;
    assert_eq!(camera.leases(), 0);
    assert_eq!(live.state(), PipelineState::Idle);
    assert!(!live.surface().is_active());
    let version = live.surface().version();

    // The request was not cancelled, its answer just has nowhere to go
    reply.send(Ok(result_image())).unwrap();
    run_for(100).await;

    assert_eq!(live.surface().version(), version);
    assert!(matches!(live.surface().content(), SurfaceContent::Raw { .. }));
    assert_eq!(live.stats().results_drawn, 0);
    assert_eq!(live.stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let camera = SyntheticCamera::new();
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    live.stop().await;
    live.start().await.unwrap();
    wait_until("first frame", || live.stats().raw_frames >= 1).await;

    live.stop().await;
    live.stop().await;

    assert_eq!(live.state(), PipelineState::Idle);
    assert!(!live.is_active());
    assert_eq!(camera.leases(), 0);
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(live.status(), "Camera stopped");
}

#[tokio::test(start_paused = true)]
async fn start_while_active_is_a_no_op() {
    let camera = SyntheticCamera::new();
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    live.start().await.unwrap();
    live.start().await.unwrap();
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(camera.leases(), 1);

    // And the camera can be restarted after a stop
    live.stop().await;
    live.start().await.unwrap();
    assert_eq!(camera.acquisitions(), 2);
    assert_eq!(camera.leases(), 1);
    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn selection_change_discards_stale_result() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("A", "Jacket"));

    live.start().await.unwrap();
    let (first, reply) = requests.recv().await.unwrap();
    assert_eq!(first.garment_id, GarmentId::new("A"));

    live.selection().select(SelectedGarment::new("B", "Shirt"));
    reply.send(Ok(result_image())).unwrap();

    let (second, _reply) = requests.recv().await.unwrap();
    assert_eq!(second.garment_id, GarmentId::new("B"));
    assert_eq!(live.stats().stale_discarded, 1);
    assert_eq!(live.stats().results_drawn, 0);
    assert!(matches!(live.surface().content(), SurfaceContent::Raw { .. }));

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn clearing_selection_stops_submissions() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    live.selection().select(SelectedGarment::new("A", "Jacket"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();
    live.selection().clear();
    reply.send(Ok(result_image())).unwrap();

    wait_until("stale result", || live.stats().stale_discarded == 1).await;
    run_for(200).await;
    assert!(requests.try_recv().is_err());
    assert_eq!(live.stats().submitted, 1);
    assert!(matches!(live.surface().content(), SurfaceContent::Raw { .. }));

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unavailable_device_leaves_pipeline_idle() {
    let camera = SyntheticCamera::denying_access("permission denied");
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    let err = live.start().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::DeviceUnavailable("permission denied".into())
    );
    assert!(!live.is_active());
    assert_eq!(live.state(), PipelineState::Idle);
    assert_eq!(camera.leases(), 0);
    assert_eq!(live.last_error(), Some(err));
    assert_eq!(
        live.status(),
        "could not access camera: permission denied"
    );

    live.stop().await;
    assert_eq!(live.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn blocked_playback_recovers_on_retry() {
    let camera = SyntheticCamera::with_blocked_playback(1);
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    let err = live.start().await.unwrap_err();
    assert!(matches!(err, SessionError::PlaybackBlocked(_)));
    assert!(!live.is_active());
    assert!(live.status().ends_with("Press P to retry playback."));
    // The device stays acquired while waiting for the retry
    assert_eq!(camera.leases(), 1);

    live.retry_playback().await.unwrap();
    assert!(live.is_active());
    assert_eq!(camera.acquisitions(), 1);
    assert_eq!(live.last_error(), None);
    wait_until("first frame", || live.stats().raw_frames >= 1).await;

    live.stop().await;
    assert_eq!(camera.leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_releases_parked_camera() {
    let camera = SyntheticCamera::with_blocked_playback(1);
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    assert!(live.start().await.is_err());
    assert_eq!(camera.leases(), 1);
    live.stop().await;
    assert_eq!(camera.leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn frames_wait_for_camera_metadata() {
    let camera = SyntheticCamera::with_ready_after(3);
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    live.start().await.unwrap();
    wait_until("first frame", || live.stats().raw_frames >= 1).await;

    let stats = live.stats();
    assert_eq!(stats.metadata_waits, 3);
    assert!(stats.cycles >= 4);

    live.stop().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_ends_session_and_releases_camera() {
    let camera = SyntheticCamera::disconnecting_after(3);
    let (mut live, _requests) = pipeline(&camera, 32, 24);

    live.start().await.unwrap();
    wait_until("scheduler exit", || !live.is_active()).await;

    assert_eq!(camera.leases(), 0);
    assert_eq!(live.state(), PipelineState::Idle);
    assert!(!live.surface().is_active());
    assert!(matches!(
        live.last_error(),
        Some(SessionError::DeviceUnavailable(_))
    ));
    assert_eq!(live.stats().raw_frames, 3);
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_observable() {
    let camera = SyntheticCamera::new();
    let (mut live, mut requests) = pipeline(&camera, 32, 24);
    let mut states = live.subscribe();
    live.selection().select(SelectedGarment::new("G1", "Tee"));

    live.start().await.unwrap();
    let (_, reply) = requests.recv().await.unwrap();
    states
        .wait_for(|state| *state == PipelineState::AwaitingRemote)
        .await
        .unwrap();

    // Rendering lasts until the next cycle, long enough to be seen
    reply.send(Ok(result_image())).unwrap();
    states
        .wait_for(|state| *state == PipelineState::Rendering)
        .await
        .unwrap();
    assert_eq!(live.stats().results_drawn, 1);

    let (_, _reply) = requests.recv().await.unwrap();
    assert_eq!(live.state(), PipelineState::AwaitingRemote);

    live.stop().await;
    assert_eq!(*states.borrow_and_update(), PipelineState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_not_held_by_a_stalled_read() {
    let camera = StallingCamera::default();
    let (service, _requests) = ScriptedService::new();
    let mut live = LiveTryOn::new(camera.clone(), service, &config(16, 12));

    live.start().await.unwrap();
    wait_until("stalled read", || camera.reads() >= 3).await;
    assert_eq!(live.stats().raw_frames, 2);

    let started = Instant::now();
    let stopped = tokio::time::timeout(Duration::from_secs(1), live.stop()).await;
    assert!(stopped.is_ok(), "stop waited {:?}", started.elapsed());
    assert!(!live.is_active());
    assert_eq!(live.state(), PipelineState::Idle);
    assert!(!live.surface().is_active());

    // The blocked read still owns the device and lets go once it returns
    assert_eq!(camera.leases(), 1);
    camera.release();
    wait_until("device release", || camera.leases() == 0).await;
    assert_eq!(live.stats().raw_frames, 2);
}
