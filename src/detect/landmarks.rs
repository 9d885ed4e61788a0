use thiserror::Error;

use super::face::FaceBox;

/// Landmarks per face (iBUG 300-W / dlib 68-point convention).
pub const LANDMARK_COUNT: usize = 68;

/// Index layout of one eye in the 68-point convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EyeIndices {
    /// Outer and inner corners.
    pub corners: (usize, usize),
    /// Upper eyelid points, outer first.
    pub upper: (usize, usize),
    /// Lower eyelid points, paired with `upper` (same column order).
    pub lower: (usize, usize),
}

/// Subject's right eye, image left (points 36..=41).
pub const LEFT_EYE: EyeIndices = EyeIndices {
    corners: (36, 39),
    upper: (37, 38),
    lower: (41, 40),
};

/// Subject's left eye, image right (points 42..=47).
pub const RIGHT_EYE: EyeIndices = EyeIndices {
    corners: (42, 45),
    upper: (43, 44),
    lower: (47, 46),
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("landmark set has {0} points, expected {LANDMARK_COUNT}")]
    Cardinality(usize),
    #[error("landmark {0} is not a finite coordinate")]
    NonFinite(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

impl Segment {
    pub fn length(&self) -> f32 {
        self.from.distance(self.to)
    }
}

/// The two construction lines drawn across an eye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeLines {
    /// Corner to corner.
    pub horizontal: Segment,
    /// Upper eyelid midpoint to lower eyelid midpoint.
    pub vertical: Segment,
}

impl EyeLines {
    /// Eye aspect ratio (opening height over width). `None` for a zero-width eye.
    pub fn aspect_ratio(&self) -> Option<f32> {
        let width = self.horizontal.length();
        if width <= f32::EPSILON {
            return None;
        }
        Some(self.vertical.length() / width)
    }
}

/// Ordered, fixed-cardinality landmark points for one face.
///
/// Point `i` denotes the same anatomical feature on every face, so geometry
/// is addressed by index (see [`LEFT_EYE`] and [`RIGHT_EYE`]).
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::Cardinality(points.len()));
        }
        if let Some(index) = points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(LandmarkError::NonFinite(index));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Point by index. Panics for indices outside `0..LANDMARK_COUNT`.
    pub fn point(&self, index: usize) -> Point {
        self.points[index]
    }

    pub fn eye(&self, eye: EyeIndices) -> EyeLines {
        EyeLines {
            horizontal: Segment {
                from: self.point(eye.corners.0),
                to: self.point(eye.corners.1),
            },
            vertical: Segment {
                from: self.point(eye.upper.0).midpoint(self.point(eye.upper.1)),
                to: self.point(eye.lower.0).midpoint(self.point(eye.lower.1)),
            },
        }
    }

    pub fn left_eye(&self) -> EyeLines {
        self.eye(LEFT_EYE)
    }

    pub fn right_eye(&self) -> EyeLines {
        self.eye(RIGHT_EYE)
    }

    /// Canonical frontal face fitted to `bbox`, with both eyes opened to
    /// `eye_aspect` (height over width; ~0.3 is a relaxed open eye).
    pub fn template(bbox: &FaceBox, eye_aspect: f32) -> Self {
        let mut unit = Vec::with_capacity(LANDMARK_COUNT);

        // Jaw 0..=16, ear to ear around the chin.
        for i in 0..17 {
            let t = std::f32::consts::PI * i as f32 / 16.0;
            unit.push(Point::new(0.5 - 0.48 * t.cos(), 0.35 + 0.6 * t.sin()));
        }
        // Brows 17..=26.
        for i in 0..5 {
            unit.push(Point::new(0.15 + 0.0675 * i as f32, 0.30));
        }
        for i in 0..5 {
            unit.push(Point::new(0.58 + 0.0675 * i as f32, 0.30));
        }
        // Nose bridge 27..=30, nostrils 31..=35.
        for i in 0..4 {
            unit.push(Point::new(0.5, 0.38 + 0.0667 * i as f32));
        }
        for i in 0..5 {
            unit.push(Point::new(0.42 + 0.04 * i as f32, 0.63));
        }
        // Eyes 36..=47: corners 0.2 apart, lids symmetric about y = 0.42.
        let half = eye_aspect.max(0.0) * 0.2 / 2.0;
        for x0 in [0.2f32, 0.6] {
            unit.push(Point::new(x0, 0.42));
            unit.push(Point::new(x0 + 0.07, 0.42 - half));
            unit.push(Point::new(x0 + 0.13, 0.42 - half));
            unit.push(Point::new(x0 + 0.2, 0.42));
            unit.push(Point::new(x0 + 0.13, 0.42 + half));
            unit.push(Point::new(x0 + 0.07, 0.42 + half));
        }
        // Outer lip 48..=59, inner lip 60..=67.
        for (count, rx, ry) in [(12usize, 0.15f32, 0.05f32), (8, 0.10, 0.025)] {
            for i in 0..count {
                let t = std::f32::consts::TAU * i as f32 / count as f32;
                unit.push(Point::new(0.5 - rx * t.cos(), 0.8 - ry * t.sin()));
            }
        }
        debug_assert_eq!(unit.len(), LANDMARK_COUNT);

        Self {
            points: unit
                .into_iter()
                .map(|p| Point::new(bbox.x + p.x * bbox.w, bbox.y + p.y * bbox.h))
                .collect(),
        }
    }

    /// Apply `f` to every point (used to jitter or warp synthetic faces).
    pub fn map_points(mut self, mut f: impl FnMut(usize, Point) -> Point) -> Self {
        for (index, point) in self.points.iter_mut().enumerate() {
            *point = f(index, *point);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> FaceBox {
        FaceBox::new(100.0, 50.0, 200.0, 200.0)
    }

    #[test]
    fn rejects_wrong_cardinality() {
        let err = LandmarkSet::new(vec![Point::default(); 5]).unwrap_err();
        assert_eq!(err, LandmarkError::Cardinality(5));
    }

    #[test]
    fn rejects_non_finite_points() {
        let mut points = vec![Point::default(); LANDMARK_COUNT];
        points[40] = Point::new(f32::NAN, 1.0);
        assert_eq!(
            LandmarkSet::new(points).unwrap_err(),
            LandmarkError::NonFinite(40)
        );
    }

    #[test]
    fn template_eye_lines_follow_index_layout() {
        let set = LandmarkSet::template(&unit_box(), 0.3);
        assert_eq!(set.points().len(), LANDMARK_COUNT);

        let left = set.left_eye();
        assert_eq!(left.horizontal.from, set.point(36));
        assert_eq!(left.horizontal.to, set.point(39));
        assert_eq!(left.vertical.from, set.point(37).midpoint(set.point(38)));

        let right = set.right_eye();
        assert_eq!(right.horizontal.to, set.point(45));
        assert!(right.horizontal.from.x > left.horizontal.to.x);
    }

    #[test]
    fn template_aspect_ratio_round_trips() {
        let set = LandmarkSet::template(&unit_box(), 0.3);
        let ear = set.left_eye().aspect_ratio().unwrap();
        assert!((ear - 0.3).abs() < 1e-3, "ear={ear}");

        let closed = LandmarkSet::template(&unit_box(), 0.0);
        assert_eq!(closed.right_eye().aspect_ratio(), Some(0.0));
    }

    #[test]
    fn zero_width_eye_has_no_aspect_ratio() {
        let set = LandmarkSet::template(&unit_box(), 0.3).map_points(|i, p| {
            if LEFT_EYE.corners.1 == i {
                Point::new(p.x - 40.0, p.y)
            } else {
                p
            }
        });
        assert_eq!(set.left_eye().aspect_ratio(), None);
    }
}
