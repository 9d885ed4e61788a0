//! Generated frames for `stub://` camera devices.
//!
//! Frames are a moving gradient with no faces in them; pair the source with a
//! `ScriptedExtractor` to drive detection. `drop_every` and `fail_after`
//! inject the two capture failure kinds.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{CameraConfig, CaptureError, FrameSource, SourceStats};
use crate::frame::{Frame, BYTES_PER_PIXEL};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub device: String,
    /// Pacing rate; 0 returns frames as fast as they are asked for.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Every n-th read returns `NoData` instead of a frame.
    pub drop_every: Option<u64>,
    /// Reads after this many frames return `DeviceLost`.
    pub fail_after: Option<u64>,
}

impl SyntheticConfig {
    pub fn from_camera(camera: &CameraConfig) -> Self {
        Self {
            device: camera.device.clone(),
            target_fps: camera.target_fps,
            width: camera.width,
            height: camera.height,
            drop_every: None,
            fail_after: None,
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self::from_camera(&CameraConfig {
            device: "stub://synthetic".to_string(),
            ..CameraConfig::default()
        })
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    connected: bool,
    reads: u64,
    frame_count: u64,
    empty_reads: u64,
    lost: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            connected: false,
            reads: 0,
            frame_count: 0,
            empty_reads: 0,
            lost: false,
            last_frame_at: None,
        }
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / u64::from(self.config.target_fps));
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let len = width * self.config.height as usize * BYTES_PER_PIXEL;
        let shift = self.frame_count as usize;
        (0..len)
            .map(|i| {
                let column = (i / BYTES_PER_PIXEL) % width.max(1);
                ((column + shift) % 256) as u8
            })
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {} fps)",
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.connected {
            return Err(CaptureError::DeviceLost(format!(
                "{} not connected",
                self.config.device
            )));
        }
        if self
            .config
            .fail_after
            .is_some_and(|limit| self.frame_count >= limit)
        {
            self.lost = true;
            return Err(CaptureError::DeviceLost(format!(
                "{} disconnected after {} frames",
                self.config.device, self.frame_count
            )));
        }

        self.pace();
        self.reads += 1;
        if self
            .config
            .drop_every
            .is_some_and(|n| n > 0 && self.reads % n == 0)
        {
            self.empty_reads += 1;
            return Err(CaptureError::NoData(format!(
                "{} returned an empty read",
                self.config.device
            )));
        }

        self.frame_count += 1;
        Frame::new(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )
        .map_err(|e| CaptureError::NoData(format!("{:#}", e)))
    }

    fn is_healthy(&self) -> bool {
        self.connected && !self.lost
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            empty_reads: self.empty_reads,
            device: self.config.device.clone(),
        }
    }
}
