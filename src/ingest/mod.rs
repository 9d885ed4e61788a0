//! Frame sources.
//!
//! - `SyntheticSource`: generated frames for `stub://` devices (demos, tests).
//! - `V4l2Source`: local camera via V4L2 (feature: ingest-v4l2).
//!
//! Every source yields RGB24 [`Frame`]s and classifies read failures:
//! a transient miss ([`CaptureError::NoData`]) skips one detection cycle,
//! device loss ([`CaptureError::DeviceLost`]) ends the session.

mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use thiserror::Error;

use crate::frame::Frame;

pub use normalize::{normalize_to_rgb, PixelFormat};
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The read returned nothing usable this time; try again next cycle.
    #[error("no frame data: {0}")]
    NoData(String),
    /// The camera is gone; capture cannot continue.
    #[error("camera device lost: {0}")]
    DeviceLost(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub empty_reads: u64,
    pub device: String,
}

pub trait FrameSource: Send {
    /// Open the device. Called once before the first `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Camera parameters shared by every source type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (`/dev/video0`) or `stub://<name>` for synthetic frames.
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Pick the source implementation for `config.device`.
pub fn source_for(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if config.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig::from_camera(
            config,
        ))));
    }
    device_source(config)
}

#[cfg(feature = "ingest-v4l2")]
fn device_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config {
        device: config.device.clone(),
        target_fps: config.target_fps,
        width: config.width,
        height: config.height,
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn device_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Err(anyhow::anyhow!(
        "camera {} requires the ingest-v4l2 feature (or use a stub:// device)",
        config.device
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_devices_are_synthetic() -> Result<()> {
        let mut source = source_for(&CameraConfig {
            device: "stub://desk".to_string(),
            target_fps: 0,
            width: 8,
            height: 6,
        })?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width, frame.height), (8, 6));
        assert_eq!(source.stats().device, "stub://desk");
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_paths_need_the_v4l2_feature() {
        assert!(source_for(&CameraConfig::default()).is_err());
    }
}
