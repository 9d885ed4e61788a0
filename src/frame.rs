//! Captured video frames.
//!
//! - `Frame`: RGB24 raster with capture metadata. Pixel bytes are private and
//!   zeroized on drop; frames show bystanders and must not linger in freed memory.
//! - `Rgb`: annotation colour.
//!
//! A frame is produced once per capture cycle, moved through the detection
//! pipeline for that cycle, and handed to the preview slot afterwards.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use zeroize::Zeroize;

use crate::detect::{Point, Segment};

/// Bytes per pixel for the RGB24 layout every source produces.
pub const BYTES_PER_PIXEL: usize = 3;

// Outcodes for line clipping.
const LEFT: u8 = 1;
const RIGHT: u8 = 2;
const BELOW: u8 = 4;
const ABOVE: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
}

/// One captured image. No `Clone`: a frame has exactly one owner per cycle.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source counter, starting at 1.
    pub sequence: u64,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap RGB24 bytes captured now.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        Self::with_timestamp(data, width, height, sequence, Local::now())
    }

    pub fn with_timestamp(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        captured_at: DateTime<Local>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at,
        })
    }

    /// Read-only pixel access for extractors and displays.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        let offset = self.offset(x as i64, y as i64)?;
        Some(Rgb(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ))
    }

    /// Set one pixel. Coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, colour: Rgb) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset] = colour.0;
            self.data[offset + 1] = colour.1;
            self.data[offset + 2] = colour.2;
        }
    }

    /// Draw a one-pixel line (Bresenham), clipped to the frame.
    ///
    /// The segment is clipped before rasterizing, so the cost is bounded by
    /// the frame size whatever the endpoints. Non-finite endpoints draw nothing.
    pub fn draw_line(&mut self, from: Point, to: Point, colour: Rgb) {
        let Some((start, end)) = self.clip(from, to) else {
            return;
        };
        let (mut x0, mut y0) = start;
        let (x1, y1) = end;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put_pixel(x0, y0, colour);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Cohen-Sutherland clip of `from..to` against the pixel grid, in f64 so
    /// that any pair of finite f32 endpoints is representable. Returns pixel
    /// coordinates inside the frame, or `None` when nothing is visible.
    fn clip(&self, from: Point, to: Point) -> Option<((i64, i64), (i64, i64))> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if ![from.x, from.y, to.x, to.y].iter().all(|v| v.is_finite()) {
            return None;
        }
        let x_max = f64::from(self.width - 1);
        let y_max = f64::from(self.height - 1);
        let outcode = |x: f64, y: f64| -> u8 {
            let mut code = 0;
            if x < 0.0 {
                code |= LEFT;
            } else if x > x_max {
                code |= RIGHT;
            }
            if y < 0.0 {
                code |= BELOW;
            } else if y > y_max {
                code |= ABOVE;
            }
            code
        };

        let (mut x0, mut y0) = (f64::from(from.x), f64::from(from.y));
        let (mut x1, mut y1) = (f64::from(to.x), f64::from(to.y));
        // Each pass pins one endpoint to one edge; rounding can cost a few more.
        for _ in 0..8 {
            let (code0, code1) = (outcode(x0, y0), outcode(x1, y1));
            if code0 | code1 == 0 {
                let snap = |v: f64, max: f64| v.round().clamp(0.0, max) as i64;
                return Some((
                    (snap(x0, x_max), snap(y0, y_max)),
                    (snap(x1, x_max), snap(y1, y_max)),
                ));
            }
            if code0 & code1 != 0 {
                return None;
            }
            let code = if code0 != 0 { code0 } else { code1 };
            let (x, y) = if code & ABOVE != 0 {
                (x0 + (x1 - x0) * (y_max - y0) / (y1 - y0), y_max)
            } else if code & BELOW != 0 {
                (x0 + (x1 - x0) * (0.0 - y0) / (y1 - y0), 0.0)
            } else if code & RIGHT != 0 {
                (x_max, y0 + (y1 - y0) * (x_max - x0) / (x1 - x0))
            } else {
                (0.0, y0 + (y1 - y0) * (0.0 - x0) / (x1 - x0))
            };
            if code0 != 0 {
                (x0, y0) = (x, y);
            } else {
                (x1, y1) = (x, y);
            }
        }
        None
    }

    pub fn draw_segment(&mut self, segment: Segment, colour: Rgb) {
        self.draw_line(segment.from, segment.to, colour);
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print pixel content.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL],
            width,
            height,
            1,
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4, 1).is_err());
    }

    #[test]
    fn draw_line_paints_endpoints_and_clips() {
        let mut frame = blank(8, 8);
        frame.draw_line(Point::new(1.0, 1.0), Point::new(6.0, 1.0), Rgb::GREEN);
        assert_eq!(frame.pixel(1, 1), Some(Rgb::GREEN));
        assert_eq!(frame.pixel(6, 1), Some(Rgb::GREEN));
        assert_eq!(frame.pixel(1, 2), Some(Rgb(0, 0, 0)));

        // Partially off-frame lines must not panic.
        frame.draw_line(Point::new(-5.0, -5.0), Point::new(20.0, 20.0), Rgb::RED);
        assert_eq!(frame.pixel(3, 3), Some(Rgb::RED));
    }

    #[test]
    fn far_off_frame_segments_are_cheap_and_safe() {
        let mut frame = blank(8, 8);
        let started = std::time::Instant::now();

        // Entirely outside: nothing drawn.
        frame.draw_line(Point::new(2e8, 0.0), Point::new(2e8, 4.0), Rgb::RED);
        frame.draw_line(Point::new(-1e19, -3.0), Point::new(1e19, -3.0), Rgb::RED);
        frame.draw_line(Point::new(f32::MIN, 9.0), Point::new(f32::MAX, 9.0), Rgb::RED);
        assert!(frame.pixels().iter().all(|&b| b == 0));

        // Crossing with extreme endpoints: exactly the visible part is painted.
        frame.draw_line(Point::new(-1e19, 2.0), Point::new(1e19, 2.0), Rgb::GREEN);
        frame.draw_line(Point::new(0.0, 5.0), Point::new(2e8, 5.0), Rgb::GREEN);
        for x in 0..8 {
            assert_eq!(frame.pixel(x, 2), Some(Rgb::GREEN));
            assert_eq!(frame.pixel(x, 5), Some(Rgb::GREEN));
        }
        assert_eq!(frame.pixel(3, 3), Some(Rgb(0, 0, 0)));

        frame.draw_line(Point::new(-1e6, -1e6), Point::new(1e6, 1e6), Rgb::RED);
        assert_eq!(frame.pixel(0, 0), Some(Rgb::RED));
        assert_eq!(frame.pixel(3, 3), Some(Rgb::RED));
        assert_eq!(frame.pixel(7, 7), Some(Rgb::RED));

        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn non_finite_endpoints_draw_nothing() {
        let mut frame = blank(4, 4);
        frame.draw_line(Point::new(f32::NAN, 1.0), Point::new(3.0, 1.0), Rgb::RED);
        frame.draw_line(Point::new(0.0, 0.0), Point::new(f32::INFINITY, 0.0), Rgb::RED);
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn debug_output_hides_pixels() {
        let frame = blank(2, 2);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("width: 2"));
        assert!(!rendered.contains("data"));
    }
}
