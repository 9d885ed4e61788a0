use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::event_log::{LogMode, DEFAULT_LOG_PATH};
use crate::gaze::{ClassifierKind, OPEN_EYE_ASPECT};
use crate::ingest::CameraConfig;
use crate::observation::PrimaryFacePolicy;
use crate::reaction::{
    default_player, BrightnessMode, DEFAULT_ALERT_SOUND, DEFAULT_BACKLIGHT_ROOT,
    DEFAULT_BRIGHTNESS_COMMAND,
};
use crate::settings::Settings;
use crate::threat::DEFAULT_SAFE_FRAMES;

const DEFAULT_SCRIPT: &str = "1x40,2x30,1x40";
const DEFAULT_JITTER_PX: f32 = 1.5;

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    camera: Option<CameraConfigFile>,
    reaction: Option<ReactionConfigFile>,
    brightness: Option<BrightnessConfigFile>,
    sound: Option<SoundConfigFile>,
    log: Option<LogConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ReactionConfigFile {
    dim_level: Option<u8>,
    detection_threshold: Option<f32>,
    sound_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct BrightnessConfigFile {
    mode: Option<BrightnessMode>,
    backlight: Option<PathBuf>,
    command: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SoundConfigFile {
    file: Option<PathBuf>,
    player: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LogConfigFile {
    path: Option<PathBuf>,
    mode: Option<LogMode>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    safe_frames: Option<u32>,
    classifier: Option<ClassifierKind>,
    exclude_primary: Option<bool>,
    script: Option<String>,
    jitter_px: Option<f32>,
    eye_aspect: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub camera: CameraConfig,
    pub settings: Settings,
    pub brightness: BrightnessSettings,
    pub sound: SoundSettings,
    pub log: LogSettings,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone)]
pub struct BrightnessSettings {
    pub mode: BrightnessMode,
    /// Backlight device directory, or a root to discover one under.
    pub backlight: PathBuf,
    pub command: String,
}

#[derive(Debug, Clone)]
pub struct SoundSettings {
    pub file: PathBuf,
    pub player: String,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub path: PathBuf,
    pub mode: LogMode,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub safe_frames: u32,
    pub classifier: ClassifierKind,
    pub exclude_primary: bool,
    /// Face-count script for the scripted extractor.
    pub script: String,
    pub jitter_px: f32,
    /// Eye aspect ratio of the scripted faces; below ~0.1 reads as closed.
    pub eye_aspect: f32,
}

impl DetectionSettings {
    pub fn policy(&self) -> PrimaryFacePolicy {
        PrimaryFacePolicy::from_exclude_flag(self.exclude_primary)
    }
}

impl GuardConfig {
    /// Defaults, then `GAZEGUARD_CONFIG`, then `GAZEGUARD_*` overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`GuardConfig::load`], with `path` taking precedence over
    /// `GAZEGUARD_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os("GAZEGUARD_CONFIG").map(PathBuf::from),
        };
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardConfigFile) -> Self {
        let camera_defaults = CameraConfig::default();
        let camera = file.camera.unwrap_or_default();
        let reaction = file.reaction.unwrap_or_default();
        let brightness = file.brightness.unwrap_or_default();
        let sound = file.sound.unwrap_or_default();
        let log = file.log.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let settings_defaults = Settings::default();

        Self {
            camera: CameraConfig {
                device: camera.device.unwrap_or(camera_defaults.device),
                target_fps: camera.target_fps.unwrap_or(camera_defaults.target_fps),
                width: camera.width.unwrap_or(camera_defaults.width),
                height: camera.height.unwrap_or(camera_defaults.height),
            },
            settings: Settings {
                dim_level: reaction.dim_level.unwrap_or(settings_defaults.dim_level),
                detection_threshold: reaction
                    .detection_threshold
                    .unwrap_or(settings_defaults.detection_threshold),
                sound_enabled: reaction
                    .sound_enabled
                    .unwrap_or(settings_defaults.sound_enabled),
            },
            brightness: BrightnessSettings {
                mode: brightness.mode.unwrap_or_default(),
                backlight: brightness
                    .backlight
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKLIGHT_ROOT)),
                command: brightness
                    .command
                    .unwrap_or_else(|| DEFAULT_BRIGHTNESS_COMMAND.to_string()),
            },
            sound: SoundSettings {
                file: sound
                    .file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ALERT_SOUND)),
                player: sound
                    .player
                    .unwrap_or_else(|| default_player().to_string()),
            },
            log: LogSettings {
                path: log.path.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
                mode: log.mode.unwrap_or_default(),
            },
            detection: DetectionSettings {
                safe_frames: detection.safe_frames.unwrap_or(DEFAULT_SAFE_FRAMES),
                classifier: detection.classifier.unwrap_or_default(),
                exclude_primary: detection.exclude_primary.unwrap_or(true),
                script: detection
                    .script
                    .unwrap_or_else(|| DEFAULT_SCRIPT.to_string()),
                jitter_px: detection.jitter_px.unwrap_or(DEFAULT_JITTER_PX),
                eye_aspect: detection.eye_aspect.unwrap_or(OPEN_EYE_ASPECT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = env_nonempty("GAZEGUARD_CAMERA") {
            self.camera.device = device;
        }
        if let Some(level) = env_nonempty("GAZEGUARD_DIM_LEVEL") {
            self.settings.dim_level = level
                .parse()
                .map_err(|_| anyhow!("GAZEGUARD_DIM_LEVEL must be an integer from 0 to 100"))?;
        }
        if let Some(threshold) = env_nonempty("GAZEGUARD_THRESHOLD") {
            self.settings.detection_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("GAZEGUARD_THRESHOLD must be a number"))?;
        }
        if let Some(sound) = env_nonempty("GAZEGUARD_SOUND") {
            self.settings.sound_enabled = parse_bool("GAZEGUARD_SOUND", &sound)?;
        }
        if let Some(path) = env_nonempty("GAZEGUARD_LOG_PATH") {
            self.log.path = PathBuf::from(path);
        }
        if let Some(mode) = env_nonempty("GAZEGUARD_LOG_MODE") {
            self.log.mode = mode.parse()?;
        }
        if let Some(frames) = env_nonempty("GAZEGUARD_SAFE_FRAMES") {
            self.detection.safe_frames = frames
                .parse()
                .map_err(|_| anyhow!("GAZEGUARD_SAFE_FRAMES must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        if self.detection.safe_frames == 0 {
            return Err(anyhow!("detection.safe_frames must be at least 1"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be at least 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera size must be non-zero (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        if !self.detection.jitter_px.is_finite() || self.detection.jitter_px < 0.0 {
            return Err(anyhow!("detection.jitter_px must be a non-negative number"));
        }
        if !self.detection.eye_aspect.is_finite() || self.detection.eye_aspect < 0.0 {
            return Err(anyhow!("detection.eye_aspect must be a non-negative number"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean (got '{}')", key, other)),
    }
}
