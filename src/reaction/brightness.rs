//! Display brightness control.
//!
//! Two portable mechanisms plus a combinator:
//! - `SysfsBacklight`: Linux backlight class device (`/sys/class/backlight/*`).
//! - `CommandBrightness`: an external tool taking a 0.00-1.00 fraction.
//! - `FallbackBrightness`: primary first, fallback when the primary errors.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const FULL_BRIGHTNESS: u8 = 100;
pub const DEFAULT_BACKLIGHT_ROOT: &str = "/sys/class/backlight";
pub const DEFAULT_BRIGHTNESS_COMMAND: &str = "brightness";

pub trait BrightnessControl: Send {
    fn name(&self) -> &'static str;

    /// Set brightness in percent. Values above 100 are treated as 100.
    fn set_brightness(&mut self, percent: u8) -> Result<()>;
}

/// Linux backlight class device.
#[derive(Debug)]
pub struct SysfsBacklight {
    dir: PathBuf,
    max_brightness: u64,
}

impl SysfsBacklight {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let max_path = dir.join("max_brightness");
        let raw = std::fs::read_to_string(&max_path)
            .with_context(|| format!("read {}", max_path.display()))?;
        let max_brightness: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("parse {}", max_path.display()))?;
        if max_brightness == 0 {
            return Err(anyhow!("{} reports zero max brightness", dir.display()));
        }
        Ok(Self {
            dir,
            max_brightness,
        })
    }

    /// First backlight device under `root`, in name order.
    pub fn discover(root: &Path) -> Result<Self> {
        let mut devices: Vec<PathBuf> = std::fs::read_dir(root)
            .with_context(|| format!("list {}", root.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        devices.sort();
        let dir = devices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no backlight device under {}", root.display()))?;
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn raw_level(&self, percent: u8) -> u64 {
        let percent = u64::from(percent.min(FULL_BRIGHTNESS));
        (percent * self.max_brightness + 50) / 100
    }
}

impl BrightnessControl for SysfsBacklight {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        let path = self.dir.join("brightness");
        std::fs::write(&path, self.raw_level(percent).to_string())
            .with_context(|| format!("write {}", path.display()))
    }
}

/// External brightness tool, invoked as `<program> <fraction>` (e.g. `brightness 0.10`).
#[derive(Debug, Clone)]
pub struct CommandBrightness {
    program: String,
}

impl CommandBrightness {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl BrightnessControl for CommandBrightness {
    fn name(&self) -> &'static str {
        "command"
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        let fraction = format!("{:.2}", f32::from(percent.min(FULL_BRIGHTNESS)) / 100.0);
        let status = Command::new(&self.program)
            .arg(&fraction)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("run {} {}", self.program, fraction))?;
        if !status.success() {
            return Err(anyhow!("{} {} exited with {}", self.program, fraction, status));
        }
        Ok(())
    }
}

/// Tries `primary`, then `fallback` if the primary fails.
pub struct FallbackBrightness {
    primary: Box<dyn BrightnessControl>,
    fallback: Box<dyn BrightnessControl>,
}

impl FallbackBrightness {
    pub fn new(primary: Box<dyn BrightnessControl>, fallback: Box<dyn BrightnessControl>) -> Self {
        Self { primary, fallback }
    }
}

impl BrightnessControl for FallbackBrightness {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        match self.primary.set_brightness(percent) {
            Ok(()) => Ok(()),
            Err(primary_err) => {
                log::warn!(
                    "{} brightness failed ({:#}); trying {}",
                    self.primary.name(),
                    primary_err,
                    self.fallback.name()
                );
                let primary = self.primary.name();
                self.fallback.set_brightness(percent).map_err(|e| {
                    e.context(format!("{} brightness failed first: {:#}", primary, primary_err))
                })
            }
        }
    }
}

/// Logs the requested level and touches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBrightness;

impl BrightnessControl for DryRunBrightness {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        log::info!("brightness -> {}% (dry run)", percent.min(FULL_BRIGHTNESS));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BrightnessMode {
    /// Backlight device when one exists, external command otherwise or on error.
    #[default]
    Auto,
    Sysfs,
    Command,
    DryRun,
}

impl std::str::FromStr for BrightnessMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "sysfs" => Ok(Self::Sysfs),
            "command" => Ok(Self::Command),
            "dry-run" => Ok(Self::DryRun),
            other => Err(anyhow!("unknown brightness mode '{}'", other)),
        }
    }
}

/// Build the brightness control for `mode`.
///
/// `backlight` is a device directory or, when it has no `max_brightness`, a
/// root to discover devices under.
pub fn brightness_for(
    mode: BrightnessMode,
    backlight: &Path,
    command: &str,
) -> Result<Box<dyn BrightnessControl>> {
    let sysfs = || {
        if backlight.join("max_brightness").exists() {
            SysfsBacklight::new(backlight)
        } else {
            SysfsBacklight::discover(backlight)
        }
    };
    let control: Box<dyn BrightnessControl> = match mode {
        BrightnessMode::Sysfs => Box::new(sysfs()?),
        BrightnessMode::Command => Box::new(CommandBrightness::new(command)),
        BrightnessMode::DryRun => Box::new(DryRunBrightness),
        BrightnessMode::Auto => match sysfs() {
            Ok(device) => {
                log::info!("brightness via backlight {}", device.dir().display());
                Box::new(FallbackBrightness::new(
                    Box::new(device),
                    Box::new(CommandBrightness::new(command)),
                ))
            }
            Err(e) => {
                log::info!("no usable backlight ({:#}); brightness via '{}'", e, command);
                Box::new(CommandBrightness::new(command))
            }
        },
    };
    Ok(control)
}
