//! Audible alert.
//!
//! `play` starts the alert and returns immediately. A reaper thread waits for
//! the player process so a slow or broken audio stack never stalls detection.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub const DEFAULT_ALERT_SOUND: &str = "warning.mp3";

pub trait AlertSound: Send {
    fn name(&self) -> &'static str;

    /// Start playback without waiting for it to finish.
    fn play(&self) -> Result<()>;
}

/// Default audio player for the host platform.
pub fn default_player() -> &'static str {
    if cfg!(target_os = "macos") {
        "afplay"
    } else {
        "paplay"
    }
}

/// Plays a sound file through an external player process.
#[derive(Debug, Clone)]
pub struct CommandSound {
    player: String,
    path: PathBuf,
}

impl CommandSound {
    pub fn new(player: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            path: path.into(),
        }
    }
}

impl AlertSound for CommandSound {
    fn name(&self) -> &'static str {
        "command"
    }

    fn play(&self) -> Result<()> {
        if !self.path.is_file() {
            return Err(anyhow!("alert sound {} not found", self.path.display()));
        }
        let mut child = Command::new(&self.player)
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {} {}", self.player, self.path.display()))?;

        let player = self.player.clone();
        std::thread::Builder::new()
            .name("alert-sound".into())
            .spawn(move || match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => log::warn!("{} exited with {}", player, status),
                Err(e) => log::warn!("waiting for {} failed: {}", player, e),
            })
            .context("spawn alert reaper thread")?;
        Ok(())
    }
}

/// No audio output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSound;

impl AlertSound for SilentSound {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn play(&self) -> Result<()> {
        Ok(())
    }
}
