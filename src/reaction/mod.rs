//! Side effects of threat transitions.
//!
//! Each reaction runs its side effects in a fixed order and catches the
//! failure of each one separately: a broken backlight does not suppress the
//! alert sound, and neither suppresses the log row. Nothing here returns an
//! error to the detection loop.

mod brightness;
mod sound;

use std::sync::Arc;

pub use brightness::{
    brightness_for, BrightnessControl, BrightnessMode, CommandBrightness, DryRunBrightness,
    FallbackBrightness, SysfsBacklight, DEFAULT_BACKLIGHT_ROOT, DEFAULT_BRIGHTNESS_COMMAND,
    FULL_BRIGHTNESS,
};
pub use sound::{default_player, AlertSound, CommandSound, SilentSound, DEFAULT_ALERT_SOUND};

use crate::event_log::{EventKind, EventLog};
use crate::settings::SettingsHandle;
use crate::threat::ThreatTransition;

/// Which side effects of one reaction failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReactionReport {
    pub brightness_failed: bool,
    pub sound_played: bool,
    pub sound_failed: bool,
    pub log_failed: bool,
}

impl ReactionReport {
    pub fn is_clean(&self) -> bool {
        !(self.brightness_failed || self.sound_failed || self.log_failed)
    }
}

pub struct ReactionController {
    brightness: Box<dyn BrightnessControl>,
    sound: Box<dyn AlertSound>,
    settings: SettingsHandle,
    log: Arc<EventLog>,
}

impl ReactionController {
    pub fn new(
        brightness: Box<dyn BrightnessControl>,
        sound: Box<dyn AlertSound>,
        settings: SettingsHandle,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            brightness,
            sound,
            settings,
            log,
        }
    }

    pub fn react(&mut self, transition: ThreatTransition) -> ReactionReport {
        match transition {
            ThreatTransition::Detected => self.on_threat_detected(),
            ThreatTransition::Cleared => self.on_threat_cleared(),
        }
    }

    /// Dim to the configured level, sound the alert if enabled, log.
    pub fn on_threat_detected(&mut self) -> ReactionReport {
        let settings = self.settings.snapshot();
        log::warn!(
            "potential shoulder surfer detected; dimming screen to {}%",
            settings.dim_level
        );

        let mut report = ReactionReport {
            brightness_failed: !self.set_brightness(settings.dim_level),
            ..ReactionReport::default()
        };

        if settings.sound_enabled {
            match self.sound.play() {
                Ok(()) => report.sound_played = true,
                Err(e) => {
                    report.sound_failed = true;
                    log::warn!("alert sound ({}) failed: {:#}", self.sound.name(), e);
                }
            }
        }

        report.log_failed = self.log.record(EventKind::ThreatDetected).is_none();
        report
    }

    /// Back to full brightness, log.
    pub fn on_threat_cleared(&mut self) -> ReactionReport {
        log::info!("no threat detected; restoring brightness");
        ReactionReport {
            brightness_failed: !self.restore(),
            log_failed: self.log.record(EventKind::ThreatCleared).is_none(),
            ..ReactionReport::default()
        }
    }

    /// Full brightness without logging a threat event. Returns false on failure.
    pub fn restore(&mut self) -> bool {
        self.set_brightness(FULL_BRIGHTNESS)
    }

    fn set_brightness(&mut self, percent: u8) -> bool {
        match self.brightness.set_brightness(percent) {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "brightness ({}) -> {}% failed: {:#}",
                    self.brightness.name(),
                    percent,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::LogMode;
    use crate::settings::Settings;
    use anyhow::{anyhow, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Recording {
        calls: Arc<Mutex<Vec<u8>>>,
        fail: bool,
    }

    impl BrightnessControl for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn set_brightness(&mut self, percent: u8) -> Result<()> {
            self.calls.lock().unwrap().push(percent);
            if self.fail {
                Err(anyhow!("no backlight"))
            } else {
                Ok(())
            }
        }
    }

    struct CountingSound {
        plays: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AlertSound for CountingSound {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn play(&self) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("no audio device"))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        _dir: TempDir,
        log: Arc<EventLog>,
        calls: Arc<Mutex<Vec<u8>>>,
        plays: Arc<AtomicUsize>,
        settings: SettingsHandle,
        controller: ReactionController,
    }

    fn harness(brightness_fails: bool, sound_fails: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(
            EventLog::open(dir.path().join("events.csv"), LogMode::Truncate).unwrap(),
        );
        let calls = Arc::new(Mutex::new(Vec::new()));
        let plays = Arc::new(AtomicUsize::new(0));
        let settings = SettingsHandle::new(Settings::default());
        let controller = ReactionController::new(
            Box::new(Recording {
                calls: calls.clone(),
                fail: brightness_fails,
            }),
            Box::new(CountingSound {
                plays: plays.clone(),
                fail: sound_fails,
            }),
            settings.clone(),
            log.clone(),
        );
        Harness {
            _dir: dir,
            log,
            calls,
            plays,
            settings,
            controller,
        }
    }

    fn logged(h: &Harness) -> Vec<EventKind> {
        h.log.read_entries().unwrap().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn detected_dims_alerts_and_logs() {
        let mut h = harness(false, false);
        let report = h.controller.on_threat_detected();
        assert!(report.is_clean());
        assert!(report.sound_played);
        assert_eq!(*h.calls.lock().unwrap(), vec![10]);
        assert_eq!(h.plays.load(Ordering::SeqCst), 1);
        assert_eq!(logged(&h), vec![EventKind::ThreatDetected]);
    }

    #[test]
    fn cleared_restores_and_logs() {
        let mut h = harness(false, false);
        let report = h.controller.react(ThreatTransition::Cleared);
        assert!(report.is_clean());
        assert_eq!(*h.calls.lock().unwrap(), vec![100]);
        assert_eq!(h.plays.load(Ordering::SeqCst), 0);
        assert_eq!(logged(&h), vec![EventKind::ThreatCleared]);
    }

    #[test]
    fn settings_are_read_at_reaction_time() {
        let mut h = harness(false, false);
        h.settings
            .apply(Settings {
                dim_level: 35,
                detection_threshold: 0.4,
                sound_enabled: false,
            })
            .unwrap();
        let report = h.controller.on_threat_detected();
        assert!(!report.sound_played);
        assert_eq!(*h.calls.lock().unwrap(), vec![35]);
        assert_eq!(h.plays.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn brightness_failure_does_not_block_sound_or_log() {
        let mut h = harness(true, false);
        let report = h.controller.on_threat_detected();
        assert!(report.brightness_failed);
        assert!(report.sound_played);
        assert_eq!(logged(&h), vec![EventKind::ThreatDetected]);
    }

    #[test]
    fn sound_failure_does_not_block_log() {
        let mut h = harness(false, true);
        let report = h.controller.on_threat_detected();
        assert!(report.sound_failed);
        assert!(!report.brightness_failed);
        assert_eq!(logged(&h), vec![EventKind::ThreatDetected]);
    }

    #[test]
    fn restore_does_not_log() {
        let mut h = harness(false, false);
        assert!(h.controller.restore());
        assert_eq!(*h.calls.lock().unwrap(), vec![100]);
        assert!(logged(&h).is_empty());
    }
}
