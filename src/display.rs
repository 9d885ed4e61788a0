//! Preview and status presentation.
//!
//! The detection worker annotates each processed frame and publishes it to a
//! [`PreviewSlot`]. The slot keeps only the newest frame, so a slow display
//! misses frames instead of holding up detection. A [`DisplaySurface`] draws
//! the latest preview next to the most recent log entries.

use anyhow::Result;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::detect::Face;
use crate::event_log::LogEntry;
use crate::frame::{Frame, Rgb};

/// Log entries shown by the console display.
pub const RECENT_EVENTS: usize = 5;
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(5);

/// One annotated frame plus what the detector concluded about it.
#[derive(Debug)]
pub struct Preview {
    pub frame: Frame,
    pub face_count: usize,
    pub threat_active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PreviewSlot {
    latest: Arc<Mutex<Option<Preview>>>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held preview. The previous frame is dropped (and zeroized).
    pub fn publish(&self, preview: Preview) {
        let mut latest = self
            .latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *latest = Some(preview);
    }

    /// Take the newest preview, leaving the slot empty.
    pub fn take(&self) -> Option<Preview> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn clear(&self) {
        drop(self.take());
    }
}

/// Draw both eye lines of every face, plus a box around each face.
///
/// The primary (largest) face box is green, onlookers are red.
pub fn annotate(frame: &mut Frame, faces: &[Face]) {
    let primary = crate::observation::primary_face_index(faces);
    for (index, face) in faces.iter().enumerate() {
        let colour = if Some(index) == primary {
            Rgb::GREEN
        } else {
            Rgb::RED
        };
        draw_box(frame, face, colour);
        for eye in [face.landmarks.left_eye(), face.landmarks.right_eye()] {
            frame.draw_segment(eye.horizontal, Rgb::GREEN);
            frame.draw_segment(eye.vertical, Rgb::GREEN);
        }
    }
}

fn draw_box(frame: &mut Frame, face: &Face, colour: Rgb) {
    use crate::detect::Point;

    let b = face.bbox;
    let corners = [
        Point::new(b.x, b.y),
        Point::new(b.x + b.w, b.y),
        Point::new(b.x + b.w, b.y + b.h),
        Point::new(b.x, b.y + b.h),
    ];
    for i in 0..corners.len() {
        frame.draw_line(corners[i], corners[(i + 1) % corners.len()], colour);
    }
}

pub trait DisplaySurface {
    /// Render the latest preview (if any) and the most recent events, oldest first.
    fn present(&mut self, preview: Option<&Preview>, recent_events: &[LogEntry]) -> Result<()>;
}

/// Text status for terminals.
pub struct ConsoleDisplay<W: Write> {
    out: W,
}

impl ConsoleDisplay<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySurface for ConsoleDisplay<W> {
    fn present(&mut self, preview: Option<&Preview>, recent_events: &[LogEntry]) -> Result<()> {
        match preview {
            Some(preview) => writeln!(
                self.out,
                "frame #{} ({}x{}) faces={} threat={}",
                preview.frame.sequence,
                preview.frame.width,
                preview.frame.height,
                preview.face_count,
                if preview.threat_active {
                    "ACTIVE"
                } else {
                    "clear"
                }
            )?,
            None => writeln!(self.out, "no new frame")?,
        }
        writeln!(self.out, "recent events:")?;
        if recent_events.is_empty() {
            writeln!(self.out, "  (none)")?;
        }
        for entry in recent_events {
            let marker = if entry.kind.is_threat() { '!' } else { ' ' };
            writeln!(self.out, "{} {}", marker, entry)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Decides when the display should redraw: on every change of the watched
/// state, and otherwise once per `interval`.
#[derive(Debug)]
pub struct RefreshGate<K: PartialEq> {
    interval: Duration,
    last_at: Option<Instant>,
    last_key: Option<K>,
}

impl<K: PartialEq> RefreshGate<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_at: None,
            last_key: None,
        }
    }

    pub fn due(&mut self, key: K) -> bool {
        let changed = self.last_key.as_ref() != Some(&key);
        let elapsed = self
            .last_at
            .map_or(true, |at| at.elapsed() >= self.interval);
        if changed || elapsed {
            self.last_at = Some(Instant::now());
            self.last_key = Some(key);
            true
        } else {
            false
        }
    }
}
