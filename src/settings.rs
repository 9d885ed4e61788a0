//! Operator-tunable reaction settings.
//!
//! The UI (or config loader) writes settings through a `SettingsHandle`; the
//! detection worker takes a copy at the top of each reaction. A change that
//! lands mid-reaction applies from the next reaction on.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::{Arc, RwLock};

pub const DEFAULT_DIM_LEVEL: u8 = 10;
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.4;
pub const MIN_DETECTION_THRESHOLD: f32 = 0.1;
pub const MAX_DETECTION_THRESHOLD: f32 = 1.0;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Brightness percent applied while a threat is active.
    pub dim_level: u8,
    /// Confidence cutoff for gaze classifiers that report one.
    pub detection_threshold: f32,
    pub sound_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dim_level: DEFAULT_DIM_LEVEL,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            sound_enabled: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.dim_level > 100 {
            return Err(anyhow!(
                "dim level must be between 0 and 100 (got {})",
                self.dim_level
            ));
        }
        if !(MIN_DETECTION_THRESHOLD..=MAX_DETECTION_THRESHOLD)
            .contains(&self.detection_threshold)
        {
            return Err(anyhow!(
                "detection threshold must be between {} and {} (got {})",
                MIN_DETECTION_THRESHOLD,
                MAX_DETECTION_THRESHOLD,
                self.detection_threshold
            ));
        }
        Ok(())
    }
}

/// Shared settings cell: one writer, many snapshot readers.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        // Settings is plain data; a poisoned lock still holds a valid value.
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Validate and publish new settings.
    pub fn apply(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
        log::info!(
            "settings updated: dim={}% threshold={:.2} sound={}",
            settings.dim_level,
            settings.detection_threshold,
            settings.sound_enabled
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.dim_level, 10);
        assert_eq!(settings.detection_threshold, 0.4);
        assert!(settings.sound_enabled);
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut settings = Settings {
            dim_level: 101,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        settings.dim_level = 0;
        settings.detection_threshold = 0.05;
        assert!(settings.validate().is_err());
        settings.detection_threshold = 1.0;
        settings.validate().unwrap();
    }

    #[test]
    fn apply_publishes_to_every_clone() {
        let handle = SettingsHandle::default();
        let reader = handle.clone();
        handle
            .apply(Settings {
                dim_level: 25,
                detection_threshold: 0.7,
                sound_enabled: false,
            })
            .unwrap();
        assert_eq!(reader.snapshot().dim_level, 25);
        assert!(!reader.snapshot().sound_enabled);
    }

    #[test]
    fn invalid_apply_keeps_previous_settings() {
        let handle = SettingsHandle::default();
        let bad = Settings {
            detection_threshold: 2.0,
            ..Settings::default()
        };
        assert!(handle.apply(bad).is_err());
        assert_eq!(handle.snapshot(), Settings::default());
    }
}
