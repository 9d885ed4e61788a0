//! Detection session lifecycle.
//!
//! A `DetectionSession` owns at most one worker thread. The worker runs the
//! capture → extract → classify → observe → react loop until the controlling
//! thread clears the `running` flag or the camera is lost. The components it
//! needs travel into the thread as `WorkerParts` and come back through the
//! join handle, so a stopped session can be started again.
//!
//! The reaction controller stays outside the worker (behind a mutex) so that
//! `stop()` can restore brightness even when the worker died.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::detect::FaceLandmarkExtractor;
use crate::display::{annotate, Preview, PreviewSlot};
use crate::event_log::{EventKind, EventLog};
use crate::gaze::GazeClassifier;
use crate::ingest::{CaptureError, FrameSource};
use crate::observation::{FrameObservation, PrimaryFacePolicy};
use crate::reaction::ReactionController;
use crate::threat::ThreatStateMachine;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera device lost: {0}")]
    DeviceLost(String),
    #[error("failed to open camera: {0}")]
    Camera(String),
    #[error("detection worker panicked")]
    WorkerPanicked,
    #[error("detection components were lost with a panicked worker; create a new session")]
    PartsLost,
    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Running,
}

/// Everything the detection loop owns while it runs.
pub struct WorkerParts {
    pub source: Box<dyn FrameSource>,
    pub extractor: Box<dyn FaceLandmarkExtractor>,
    pub classifier: Box<dyn GazeClassifier>,
    pub machine: ThreatStateMachine,
    pub policy: PrimaryFacePolicy,
}

#[derive(Debug, Default)]
struct SessionCounters {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub running: bool,
    pub threat_active: bool,
    pub frames_processed: u64,
    /// Capture misses plus extraction failures.
    pub frames_skipped: u64,
    pub log_write_failures: u64,
}

struct WorkerExit {
    parts: WorkerParts,
    device_lost: Option<String>,
}

/// The worker takes its parts out of a shared slot, so a spawn that never
/// ran the closure leaves them behind for the next `start()`.
type Handoff = Arc<Mutex<Option<WorkerParts>>>;
type WorkerBody = Box<dyn FnOnce() -> Option<WorkerExit> + Send>;
type WorkerHandle = JoinHandle<Option<WorkerExit>>;

fn spawn_detection_worker(body: WorkerBody) -> io::Result<WorkerHandle> {
    std::thread::Builder::new()
        .name("detection-worker".into())
        .spawn(body)
}

/// State shared between the session handle and its worker.
#[derive(Clone)]
struct Shared {
    running: Arc<AtomicBool>,
    threat_active: Arc<AtomicBool>,
    counters: Arc<SessionCounters>,
    reactions: Arc<Mutex<ReactionController>>,
    preview: PreviewSlot,
}

pub struct DetectionSession {
    parts: Option<WorkerParts>,
    worker: Option<WorkerHandle>,
    log: Arc<EventLog>,
    shared: Shared,
}

impl DetectionSession {
    pub fn new(parts: WorkerParts, reactions: ReactionController, log: Arc<EventLog>) -> Self {
        Self {
            parts: Some(parts),
            worker: None,
            log,
            shared: Shared {
                running: Arc::new(AtomicBool::new(false)),
                threat_active: Arc::new(AtomicBool::new(false)),
                counters: Arc::new(SessionCounters::default()),
                reactions: Arc::new(Mutex::new(reactions)),
                preview: PreviewSlot::new(),
            },
        }
    }

    pub fn state(&self) -> SessionState {
        if self.worker.is_some() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Latest annotated frame published by the worker.
    pub fn preview(&self) -> &PreviewSlot {
        &self.shared.preview
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn status(&self) -> SessionStatus {
        let counters = &self.shared.counters;
        SessionStatus {
            running: self.is_running() && self.shared.running.load(Ordering::Acquire),
            threat_active: self.shared.threat_active.load(Ordering::Acquire),
            frames_processed: counters.frames_processed.load(Ordering::Relaxed),
            frames_skipped: counters.frames_skipped.load(Ordering::Relaxed),
            log_write_failures: self.log.write_failures(),
        }
    }

    /// Open the camera and spawn the detection worker. No-op when running.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.start_with(spawn_detection_worker)
    }

    fn start_with(
        &mut self,
        spawn: impl FnOnce(WorkerBody) -> io::Result<WorkerHandle>,
    ) -> Result<(), SessionError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut parts = self.parts.take().ok_or(SessionError::PartsLost)?;

        if let Err(e) = parts.source.connect() {
            self.parts = Some(parts);
            return Err(SessionError::Camera(format!("{:#}", e)));
        }
        if let Err(e) = parts.extractor.warm_up() {
            log::warn!("extractor {} warm-up failed: {:#}", parts.extractor.name(), e);
        }
        parts.machine.reset();

        let counters = &self.shared.counters;
        counters.frames_processed.store(0, Ordering::Relaxed);
        counters.frames_skipped.store(0, Ordering::Relaxed);
        self.shared.threat_active.store(false, Ordering::Release);
        self.shared.preview.clear();
        self.shared.running.store(true, Ordering::Release);

        log::info!(
            "detection started (extractor={}, classifier={}, safe_frames={})",
            parts.extractor.name(),
            parts.classifier.name(),
            parts.machine.safe_frames()
        );
        self.log.record(EventKind::DetectionStarted);

        let handoff: Handoff = Arc::new(Mutex::new(Some(parts)));
        let body: WorkerBody = {
            let handoff = handoff.clone();
            let shared = self.shared.clone();
            Box::new(move || {
                let parts = lock(&handoff).take();
                parts.map(|parts| run_worker(parts, shared))
            })
        };
        match spawn(body) {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                log::error!("failed to spawn detection worker: {}", e);
                self.parts = lock(&handoff).take();
                self.shared.running.store(false, Ordering::Release);
                self.log.record(EventKind::DetectionStopped);
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Stop the worker, restore brightness once, and log the stop.
    ///
    /// Returns the reason the worker ended on its own, if it did.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);

        let outcome = match handle.join() {
            Ok(Some(exit)) => {
                self.parts = Some(exit.parts);
                match exit.device_lost {
                    Some(reason) => Err(SessionError::DeviceLost(reason)),
                    None => Ok(()),
                }
            }
            Ok(None) => Err(SessionError::PartsLost),
            Err(_) => {
                log::error!("detection worker panicked");
                Err(SessionError::WorkerPanicked)
            }
        };

        if !lock(&self.shared.reactions).restore() {
            log::warn!("brightness could not be restored on stop");
        }
        self.shared.threat_active.store(false, Ordering::Release);
        self.log.record(EventKind::DetectionStopped);
        log::info!("detection stopped");
        outcome
    }

    /// Notice a worker that ended without being asked to (camera lost) and
    /// finish stopping it.
    pub fn poll(&mut self) -> Result<SessionState, SessionError> {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if finished {
            self.stop()?;
        }
        Ok(self.state())
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("detection session ended with error: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_worker(mut parts: WorkerParts, shared: Shared) -> WorkerExit {
    let counters = &shared.counters;
    while shared.running.load(Ordering::Acquire) {
        let mut frame = match parts.source.next_frame() {
            Ok(frame) => frame,
            Err(CaptureError::NoData(reason)) if parts.source.is_healthy() => {
                log::debug!("skipping cycle: {}", reason);
                counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            // A source that keeps missing reads past its grace period is gone.
            Err(CaptureError::NoData(reason)) | Err(CaptureError::DeviceLost(reason)) => {
                log::error!("camera lost, detection ending: {}", reason);
                shared.running.store(false, Ordering::Release);
                return worker_exit(parts, Some(reason));
            }
        };

        let faces = match parts.extractor.extract(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!(
                    "face extraction failed on frame #{}: {:#}",
                    frame.sequence,
                    e
                );
                counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let observation =
            FrameObservation::from_faces(&faces, parts.classifier.as_ref(), parts.policy);
        if let Some(transition) = parts.machine.observe(observation) {
            let report = lock(&shared.reactions).react(transition);
            if !report.is_clean() {
                log::debug!("reaction to {:?} incomplete: {:?}", transition, report);
            }
        }
        let threat_active = parts.machine.is_active();
        shared.threat_active.store(threat_active, Ordering::Release);
        counters.frames_processed.fetch_add(1, Ordering::Relaxed);

        annotate(&mut frame, &faces);
        shared.preview.publish(Preview {
            frame,
            face_count: faces.len(),
            threat_active,
        });
    }
    worker_exit(parts, None)
}

fn worker_exit(parts: WorkerParts, device_lost: Option<String>) -> WorkerExit {
    let stats = parts.source.stats();
    log::info!(
        "{}: {} frames captured, {} empty reads",
        stats.device,
        stats.frames_captured,
        stats.empty_reads
    );
    WorkerExit { parts, device_lost }
}
