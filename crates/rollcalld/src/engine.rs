use crate::config::Config;
use crate::recency::RecencyCache;
use chrono::Local;
use rollcall_core::{
    enroll_image, EnrollError, EuclideanMatcher, ExtractError, FaceExtractor, Matcher,
    OnnxExtractor,
};
use rollcall_hw::{Camera, CameraError, CameraStream, Frame};
use rollcall_store::{AttendanceLedger, Database, FaceStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),
    #[error("{0}")]
    Enroll(#[from] EnrollError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of a single recognition pass over one frame.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CheckInOutcome {
    pub face_detected: bool,
    pub match_found: bool,
    pub attendance_marked: bool,
    pub identity: Option<String>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Register {
        identity: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    CheckIn {
        reply: oneshot::Sender<Result<CheckInOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request face registration for `identity` from an uploaded image.
    /// Returns the number of embeddings stored.
    pub async fn register(&self, identity: String, image: Vec<u8>) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Register {
                identity,
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Request a single-shot check-in: capture one frame, match, record.
    pub async fn check_in(&self) -> Result<CheckInOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::CheckIn { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Recognition state owned by the engine thread: models, store handles,
/// tolerances, and the process-lifetime recency cache.
struct Engine {
    extractor: OnnxExtractor,
    matcher: EuclideanMatcher,
    faces: FaceStore,
    ledger: AttendanceLedger,
    recency: RecencyCache,
    match_tolerance: f32,
    duplicate_tolerance: f32,
}

/// Counters for one kiosk session, reported at shutdown.
#[derive(Default)]
struct SessionStats {
    frames: u64,
    detected: u64,
    matched: u64,
    marked: u64,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera and loads both ONNX models synchronously (fail-fast at
/// startup), then either enters the continuous kiosk loop or blocks on the
/// request channel. The thread owns the camera exclusively until it exits.
pub fn spawn_engine(
    config: &Config,
    database: &Database,
    stop: Arc<AtomicBool>,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let extractor = OnnxExtractor::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )?;

    let mut engine = Engine {
        extractor,
        matcher: EuclideanMatcher,
        faces: database.face_store(),
        ledger: database.ledger(),
        recency: RecencyCache::new(),
        match_tolerance: config.match_tolerance,
        duplicate_tolerance: config.duplicate_tolerance,
    };

    let kiosk = config.kiosk;
    let frame_stride = config.frame_stride;
    let downscale = config.downscale;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(kiosk, "engine thread started");
            if kiosk {
                run_kiosk(&camera, &mut engine, &mut rx, &stop, frame_stride, downscale);
            } else {
                run_requests(&camera, &mut engine, &mut rx);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Single-shot mode: serve requests until the channel closes.
fn run_requests(camera: &Camera, engine: &mut Engine, rx: &mut mpsc::Receiver<EngineRequest>) {
    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::Register {
                identity,
                image,
                reply,
            } => {
                let _ = reply.send(engine.run_register(&identity, &image));
            }
            EngineRequest::CheckIn { reply } => {
                // A capture failure aborts the call — no retry in
                // single-shot mode.
                let result = camera
                    .capture_frame()
                    .map_err(EngineError::from)
                    .and_then(|frame| engine.process_frame(&frame));
                let _ = reply.send(result);
            }
        }
    }
}

/// Continuous kiosk loop: capture frames until the stop flag is raised,
/// running recognition on every Nth frame and serving pending requests
/// between iterations.
fn run_kiosk(
    camera: &Camera,
    engine: &mut Engine,
    rx: &mut mpsc::Receiver<EngineRequest>,
    stop: &AtomicBool,
    frame_stride: u32,
    downscale: u32,
) {
    let mut stream = match camera.stream() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "cannot open capture stream");
            return;
        }
    };

    let mut stats = SessionStats::default();

    while !stop.load(Ordering::Relaxed) {
        if !serve_pending(engine, &mut stream, rx) {
            break;
        }

        let frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                // Acquisition failures are retried in continuous mode.
                tracing::warn!(error = %e, "frame acquisition failed; retrying");
                continue;
            }
        };

        stats.frames += 1;
        if stats.frames % frame_stride as u64 != 0 {
            continue;
        }

        match engine.process_frame(&frame.downscale(downscale)) {
            Ok(outcome) => {
                stats.detected += outcome.face_detected as u64;
                stats.matched += outcome.match_found as u64;
                stats.marked += outcome.attendance_marked as u64;
            }
            Err(e) => tracing::error!(error = %e, "frame processing failed"),
        }
    }

    tracing::info!(
        frames = stats.frames,
        detected = stats.detected,
        matched = stats.matched,
        marked = stats.marked,
        "capture loop stopped"
    );
}

/// Drain queued requests. In kiosk mode a check-in is answered from the
/// already-open stream (the loop owns the device; a second stream would
/// fail with EBUSY). Returns `false` when the channel has closed.
fn serve_pending(
    engine: &mut Engine,
    stream: &mut CameraStream<'_>,
    rx: &mut mpsc::Receiver<EngineRequest>,
) -> bool {
    loop {
        match rx.try_recv() {
            Ok(EngineRequest::Register {
                identity,
                image,
                reply,
            }) => {
                let _ = reply.send(engine.run_register(&identity, &image));
            }
            Ok(EngineRequest::CheckIn { reply }) => {
                let result = stream
                    .next_frame()
                    .map_err(EngineError::from)
                    .and_then(|frame| engine.process_frame(&frame));
                let _ = reply.send(result);
            }
            Err(mpsc::error::TryRecvError::Empty) => return true,
            Err(mpsc::error::TryRecvError::Disconnected) => return false,
        }
    }
}

impl Engine {
    /// Enrollment path: guard checks against the current gallery, then
    /// persist. The store rejects an identity that already has embeddings.
    fn run_register(&mut self, identity: &str, image: &[u8]) -> Result<usize, EngineError> {
        let gallery = self.faces.all()?;
        let embeddings = enroll_image(
            &mut self.extractor,
            &self.matcher,
            &gallery,
            identity,
            image,
            self.duplicate_tolerance,
        )?;
        self.faces.put(identity, &embeddings)?;
        tracing::info!(identity, count = embeddings.len(), "face registered");
        Ok(embeddings.len())
    }

    /// Run one frame through extraction → matching → recording.
    fn process_frame(&mut self, frame: &Frame) -> Result<CheckInOutcome, EngineError> {
        let image = frame.to_image().ok_or_else(|| {
            EngineError::Camera(CameraError::CaptureFailed(
                "frame buffer does not match its dimensions".into(),
            ))
        })?;

        let faces = self.extractor.detect_and_embed(&image)?;
        let mut outcome = CheckInOutcome {
            face_detected: !faces.is_empty(),
            ..CheckInOutcome::default()
        };
        if faces.is_empty() {
            return Ok(outcome);
        }

        let gallery = self.faces.all()?;
        for face in &faces {
            let Some(best) = self.matcher.best_match(&face.embedding, &gallery) else {
                continue;
            };
            if !best.is_within(self.match_tolerance) {
                tracing::debug!(distance = best.distance, "face did not match any identity");
                continue;
            }

            outcome.match_found = true;
            outcome.identity = Some(best.identity.clone());
            if self.record_presence(&best.identity)? {
                outcome.attendance_marked = true;
            }
        }
        Ok(outcome)
    }

    /// Record presence for a matched identity, gated by the recency cache.
    ///
    /// The cache is only updated after the ledger call succeeds — a storage
    /// failure must not leave the loop believing attendance was recorded.
    fn record_presence(&mut self, identity: &str) -> Result<bool, EngineError> {
        let today = Local::now().date_naive();
        if self.recency.already_marked(identity, today) {
            return Ok(false);
        }

        let inserted = self.ledger.mark(identity)?;
        self.recency.record(identity, today);
        if inserted {
            tracing::info!(identity, "attendance marked");
        }
        Ok(inserted)
    }
}
