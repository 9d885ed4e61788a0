use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::TempDir;

use gaze_guard::detect::{Face, FaceLandmarkExtractor, ScriptedExtractor};
use gaze_guard::event_log::{EventKind, EventLog, LogMode};
use gaze_guard::frame::Frame;
use gaze_guard::gaze::{AlwaysGazing, EyeAspectClassifier};
use gaze_guard::ingest::{CaptureError, FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
use gaze_guard::observation::PrimaryFacePolicy;
use gaze_guard::reaction::{AlertSound, BrightnessControl, ReactionController};
use gaze_guard::session::{DetectionSession, SessionError, SessionState, WorkerParts};
use gaze_guard::settings::{Settings, SettingsHandle};
use gaze_guard::threat::ThreatStateMachine;

#[derive(Clone, Default)]
struct BrightnessCalls(Arc<Mutex<Vec<u8>>>);

impl BrightnessCalls {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl BrightnessControl for BrightnessCalls {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        self.0.lock().unwrap().push(percent);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct AlertCount(Arc<AtomicUsize>);

impl AlertSound for AlertCount {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn play(&self) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Rig {
    _dir: TempDir,
    log: Arc<EventLog>,
    brightness: BrightnessCalls,
    alerts: AlertCount,
    session: DetectionSession,
}

fn rig(script: &str, safe_frames: u32, source: SyntheticConfig) -> Rig {
    rig_with(WorkerParts {
        source: Box::new(SyntheticSource::new(source)),
        extractor: Box::new(ScriptedExtractor::parse(script).unwrap()),
        classifier: Box::new(AlwaysGazing),
        machine: ThreatStateMachine::new(safe_frames),
        policy: PrimaryFacePolicy::IncludeAll,
    })
}

fn rig_with(parts: WorkerParts) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::open(dir.path().join("events.csv"), LogMode::Truncate).unwrap());
    let brightness = BrightnessCalls::default();
    let alerts = AlertCount::default();
    let reactions = ReactionController::new(
        Box::new(brightness.clone()),
        Box::new(alerts.clone()),
        SettingsHandle::new(Settings::default()),
        log.clone(),
    );
    Rig {
        _dir: dir,
        session: DetectionSession::new(parts, reactions, log.clone()),
        log,
        brightness,
        alerts,
    }
}

fn fast_source() -> SyntheticConfig {
    SyntheticConfig {
        target_fps: 0,
        width: 32,
        height: 24,
        ..SyntheticConfig::default()
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn poll_until_stopped(session: &mut DetectionSession) -> Result<SessionState, SessionError> {
    let mut result = Ok(SessionState::Running);
    wait_until("worker exit", || {
        result = session.poll();
        !matches!(result, Ok(SessionState::Running))
    });
    result
}

/// Connects, then only ever misses reads; unhealthy after `grace` misses.
struct StalledSource {
    reads: u32,
    grace: u32,
}

impl FrameSource for StalledSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.reads += 1;
        std::thread::sleep(Duration::from_millis(1));
        Err(CaptureError::NoData("read timed out".into()))
    }

    fn is_healthy(&self) -> bool {
        self.reads < self.grace
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            empty_reads: u64::from(self.reads),
            device: "stalled".into(),
        }
    }
}

struct PanickingExtractor;

impl FaceLandmarkExtractor for PanickingExtractor {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn extract(&mut self, _frame: &Frame) -> Result<Vec<Face>> {
        panic!("landmark model crashed");
    }
}

fn logged(log: &EventLog) -> Vec<EventKind> {
    log.read_entries()
        .unwrap()
        .into_iter()
        .map(|entry| entry.kind)
        .collect()
}

#[test]
fn stopping_while_active_restores_exactly_once() {
    let mut rig = rig("2", 10, fast_source());
    rig.session.start().unwrap();
    assert_eq!(rig.session.state(), SessionState::Running);
    wait_until("threat", || rig.session.status().threat_active);
    wait_until("more frames", || rig.session.status().frames_processed >= 5);

    rig.session.stop().unwrap();
    assert_eq!(rig.session.state(), SessionState::Stopped);
    assert_eq!(rig.brightness.take(), vec![10, 100]);
    assert_eq!(rig.alerts.0.load(Ordering::SeqCst), 1);
    assert!(!rig.session.status().threat_active);
    assert_eq!(
        logged(&rig.log),
        vec![
            EventKind::DetectionStarted,
            EventKind::ThreatDetected,
            EventKind::DetectionStopped,
        ]
    );

    // A second stop is a no-op.
    rig.session.stop().unwrap();
    assert!(rig.brightness.take().is_empty());
}

#[test]
fn threat_clears_after_safe_frames() {
    let mut rig = rig("2,1x3,0x100000", 3, fast_source());
    rig.session.start().unwrap();
    wait_until("clear event", || {
        logged(&rig.log).contains(&EventKind::ThreatCleared)
    });
    rig.session.stop().unwrap();

    assert_eq!(rig.brightness.take(), vec![10, 100, 100]);
    assert_eq!(
        logged(&rig.log),
        vec![
            EventKind::DetectionStarted,
            EventKind::ThreatDetected,
            EventKind::ThreatCleared,
            EventKind::DetectionStopped,
        ]
    );
}

#[test]
fn failed_extractions_do_not_count_as_safe_frames() {
    // Counted as safe, the three failures would clear the threat.
    let mut rig = rig("2,e,e,e,1,1", 3, fast_source());
    rig.session.start().unwrap();
    wait_until("several cycles", || rig.session.status().frames_skipped >= 30);
    let status = rig.session.status();
    assert!(status.threat_active);
    assert!(status.frames_processed >= 20);
    rig.session.stop().unwrap();

    assert!(!logged(&rig.log).contains(&EventKind::ThreatCleared));
}

#[test]
fn empty_reads_are_skipped() {
    let source = SyntheticConfig {
        drop_every: Some(2),
        ..fast_source()
    };
    let mut rig = rig("2,1,1", 3, source);
    rig.session.start().unwrap();
    wait_until("skipped reads", || rig.session.status().frames_skipped >= 20);
    assert!(rig.session.status().threat_active);
    rig.session.stop().unwrap();

    assert!(!logged(&rig.log).contains(&EventKind::ThreatCleared));
}

#[test]
fn device_loss_ends_the_session() {
    let source = SyntheticConfig {
        fail_after: Some(5),
        ..fast_source()
    };
    let mut rig = rig("1", 10, source);
    rig.session.start().unwrap();

    let mut result = Ok(SessionState::Running);
    wait_until("device loss", || {
        result = rig.session.poll();
        !matches!(result, Ok(SessionState::Running))
    });
    assert!(matches!(result, Err(SessionError::DeviceLost(_))));
    assert_eq!(rig.session.state(), SessionState::Stopped);
    assert_eq!(rig.session.status().frames_processed, 5);
    assert_eq!(rig.brightness.take(), vec![100]);
    assert_eq!(
        logged(&rig.log),
        vec![EventKind::DetectionStarted, EventKind::DetectionStopped]
    );
}

#[test]
fn session_can_be_restarted() {
    let mut rig = rig("2", 10, fast_source());
    for _ in 0..2 {
        rig.session.start().unwrap();
        // Starting twice keeps the one worker.
        rig.session.start().unwrap();
        wait_until("processed frame", || {
            rig.session.status().frames_processed >= 1
        });
        rig.session.stop().unwrap();
    }
    assert_eq!(rig.brightness.take(), vec![10, 100, 10, 100]);
    assert_eq!(
        logged(&rig.log),
        vec![
            EventKind::DetectionStarted,
            EventKind::ThreatDetected,
            EventKind::DetectionStopped,
            EventKind::DetectionStarted,
            EventKind::ThreatDetected,
            EventKind::DetectionStopped,
        ]
    );
}

#[test]
fn dropping_a_running_session_stops_it() {
    let rig = rig("2", 10, fast_source());
    let Rig {
        _dir,
        log,
        brightness,
        mut session,
        ..
    } = rig;
    session.start().unwrap();
    wait_until("threat", || session.status().threat_active);
    drop(session);

    assert_eq!(brightness.take(), vec![10, 100]);
    assert_eq!(logged(&log).last(), Some(&EventKind::DetectionStopped));
}

#[test]
fn preview_holds_the_latest_annotated_frame() {
    let mut rig = rig("2", 10, fast_source());
    rig.session.start().unwrap();
    wait_until("preview", || rig.session.status().frames_processed >= 3);
    rig.session.stop().unwrap();

    let preview = rig.session.preview().take().expect("preview published");
    assert_eq!(preview.face_count, 2);
    assert!(preview.threat_active);
    assert_eq!(
        preview.frame.sequence,
        rig.session.status().frames_processed
    );
}

#[test]
fn source_that_stays_unhealthy_is_treated_as_lost() {
    let mut rig = rig_with(WorkerParts {
        source: Box::new(StalledSource { reads: 0, grace: 3 }),
        extractor: Box::new(ScriptedExtractor::parse("2").unwrap()),
        classifier: Box::new(AlwaysGazing),
        machine: ThreatStateMachine::new(10),
        policy: PrimaryFacePolicy::IncludeAll,
    });
    rig.session.start().unwrap();

    let result = poll_until_stopped(&mut rig.session);
    assert!(matches!(result, Err(SessionError::DeviceLost(_))));
    let status = rig.session.status();
    assert_eq!(status.frames_skipped, 2);
    assert_eq!(status.frames_processed, 0);
    assert_eq!(rig.brightness.take(), vec![100]);
}

#[test]
fn closed_eyed_onlookers_do_not_raise() {
    let mut rig = rig_with(WorkerParts {
        source: Box::new(SyntheticSource::new(fast_source())),
        extractor: Box::new(
            ScriptedExtractor::parse("3")
                .unwrap()
                .with_eye_aspect(0.02),
        ),
        classifier: Box::new(EyeAspectClassifier::new(0.4)),
        machine: ThreatStateMachine::new(3),
        policy: PrimaryFacePolicy::IncludeAll,
    });
    rig.session.start().unwrap();
    wait_until("frames", || rig.session.status().frames_processed >= 20);
    assert!(!rig.session.status().threat_active);
    rig.session.stop().unwrap();

    assert_eq!(rig.brightness.take(), vec![100]);
    assert_eq!(rig.alerts.0.load(Ordering::SeqCst), 0);
    assert!(!logged(&rig.log).contains(&EventKind::ThreatDetected));
}

#[test]
fn restart_after_a_worker_panic_reports_lost_parts() {
    let mut rig = rig_with(WorkerParts {
        source: Box::new(SyntheticSource::new(fast_source())),
        extractor: Box::new(PanickingExtractor),
        classifier: Box::new(AlwaysGazing),
        machine: ThreatStateMachine::new(3),
        policy: PrimaryFacePolicy::IncludeAll,
    });
    rig.session.start().unwrap();

    let result = poll_until_stopped(&mut rig.session);
    assert!(matches!(result, Err(SessionError::WorkerPanicked)));
    assert_eq!(rig.brightness.take(), vec![100]);

    assert!(matches!(rig.session.start(), Err(SessionError::PartsLost)));
    assert_eq!(rig.session.state(), SessionState::Stopped);
}
