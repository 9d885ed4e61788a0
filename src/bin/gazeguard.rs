//! gazeguard - shoulder-surfing guard daemon
//!
//! Opens the configured camera, runs detection on a worker thread, and prints
//! a status block with the most recent events every refresh interval (and at
//! once when the threat state changes). Ctrl-C stops detection and restores
//! brightness. Exits non-zero when the camera is lost.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gaze_guard::display::{RefreshGate, DEFAULT_REFRESH, RECENT_EVENTS};
use gaze_guard::reaction::{brightness_for, BrightnessMode, CommandSound};
use gaze_guard::{
    classifier_for, source_for, ConsoleDisplay, DetectionSession, DisplaySurface, EventLog,
    GuardConfig, ReactionController, ScriptedExtractor, SessionError, SettingsHandle,
    ThreatStateMachine, WorkerParts,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "gazeguard", about = "Dim the screen when someone looks over your shoulder")]
struct Args {
    /// Config file (TOML if it ends in .toml, JSON otherwise); overrides GAZEGUARD_CONFIG
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    seconds: Option<u64>,

    /// Log brightness changes instead of applying them
    #[arg(long)]
    dry_run: bool,

    /// Seconds between status refreshes
    #[arg(long, default_value_t = DEFAULT_REFRESH.as_secs(), value_name = "SECS")]
    refresh_secs: u64,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let cfg = {
        let _stage = ui.stage("Load configuration");
        GuardConfig::load_from(args.config.as_deref())?
    };

    let event_log = {
        let _stage = ui.stage("Open event log");
        Arc::new(EventLog::open(&cfg.log.path, cfg.log.mode)?)
    };

    let settings = SettingsHandle::new(cfg.settings);
    let reactions = {
        let _stage = ui.stage("Set up reactions");
        let mode = if args.dry_run {
            BrightnessMode::DryRun
        } else {
            cfg.brightness.mode
        };
        let brightness = brightness_for(mode, &cfg.brightness.backlight, &cfg.brightness.command)?;
        if !cfg.sound.file.is_file() {
            log::warn!(
                "alert sound {} not found; alerts will be silent",
                cfg.sound.file.display()
            );
        }
        let sound = CommandSound::new(cfg.sound.player.clone(), cfg.sound.file.clone());
        ReactionController::new(
            brightness,
            Box::new(sound),
            settings.clone(),
            event_log.clone(),
        )
    };

    let parts = {
        let _stage = ui.stage("Prepare detector");
        let extractor = ScriptedExtractor::parse(&cfg.detection.script)
            .context("detection.script")?
            .with_jitter(cfg.detection.jitter_px)
            .with_eye_aspect(cfg.detection.eye_aspect);
        WorkerParts {
            source: source_for(&cfg.camera)?,
            extractor: Box::new(extractor),
            classifier: classifier_for(cfg.detection.classifier, &settings),
            machine: ThreatStateMachine::new(cfg.detection.safe_frames),
            policy: cfg.detection.policy(),
        }
    };

    // Installed before the screen can be dimmed, so Ctrl-C always reaches
    // the restore path in `stop()`.
    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let stop_requested = stop_requested.clone();
        ctrlc::set_handler(move || stop_requested.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let mut session = DetectionSession::new(parts, reactions, event_log.clone());
    {
        let mut stage = ui.stage(&format!("Start detection on {}", cfg.camera.device));
        if let Err(e) = session.start() {
            stage.fail(e.to_string());
            return Err(e.into());
        }
    }

    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut display = ConsoleDisplay::stderr();
    let mut gate = RefreshGate::new(Duration::from_secs(args.refresh_secs.max(1)));
    let mut outcome: Result<(), SessionError> = Ok(());

    loop {
        std::thread::sleep(Duration::from_millis(100));

        if let Err(e) = session.poll() {
            outcome = Err(e);
            break;
        }
        if stop_requested.load(Ordering::SeqCst) {
            log::info!("stop requested");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        let status = session.status();
        if gate.due(status.threat_active) {
            if status.threat_active {
                ui.notice("onlooker detected, screen dimmed");
            }
            let preview = session.preview().take();
            let recent = event_log.tail(RECENT_EVENTS).unwrap_or_else(|e| {
                log::warn!("cannot read event log: {:#}", e);
                Vec::new()
            });
            if let Err(e) = display.present(preview.as_ref(), &recent) {
                log::warn!("status display failed: {:#}", e);
            }
            if status.log_write_failures > 0 {
                log::warn!(
                    "{} event(s) could not be written to {}",
                    status.log_write_failures,
                    event_log.path().display()
                );
            }
        }
    }

    let status = session.status();
    if outcome.is_ok() {
        let _stage = ui.stage("Stop detection");
        outcome = session.stop();
    }
    eprintln!(
        "gazeguard: {} frames processed, {} skipped",
        status.frames_processed, status.frames_skipped
    );
    outcome.map_err(|e| anyhow!("detection ended: {}", e))
}
