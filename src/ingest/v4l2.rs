//! V4L2 camera source (feature: ingest-v4l2).
//!
//! Requests RGB24 at the configured size and rate, and accepts whatever the
//! driver settles on as long as `normalize` can convert it. Read errors are
//! classified: timeouts and torn buffers are `NoData`, anything else means
//! the device is gone.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io;
use std::time::{Duration, Instant};

use super::{normalize_to_rgb, CaptureError, FrameSource, PixelFormat, SourceStats};
use crate::frame::Frame;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<V4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
    empty_reads: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            empty_reads: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(u64::from(base_ms.max(2_000)))
    }

    fn classify(&mut self, err: io::Error) -> CaptureError {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut => {
                self.empty_reads += 1;
                CaptureError::NoData(format!("{}: {}", self.config.device, err))
            }
            _ => {
                self.last_error = Some(err.to_string());
                CaptureError::DeviceLost(format!("{}: {}", self.config.device, err))
            }
        }
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set RGB3 on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "{} delivers unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let Some(state) = self.state.as_mut() else {
            return Err(CaptureError::DeviceLost(format!(
                "{} not connected",
                self.config.device
            )));
        };
        let converted = match state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, _meta)| normalize_to_rgb(buf, width, height, format))
        }) {
            Ok(converted) => converted,
            Err(err) => return Err(self.classify(err)),
        };
        let pixels = match converted {
            Ok(pixels) => pixels,
            Err(err) => {
                self.empty_reads += 1;
                return Err(CaptureError::NoData(format!("{:#}", err)));
            }
        };

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height, self.frame_count)
            .map_err(|err| CaptureError::NoData(format!("{:#}", err)))
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            empty_reads: self.empty_reads,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_connect() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/gaze-guard-no-such-camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        });
        assert!(source.connect().is_err());
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::DeviceLost(_))
        ));
    }

    #[test]
    fn timeouts_are_transient() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/video9".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        });
        let err = source.classify(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(err, CaptureError::NoData(_)));
        assert!(source.is_healthy());
        let err = source.classify(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, CaptureError::DeviceLost(_)));
        assert!(!source.is_healthy());
    }
}
