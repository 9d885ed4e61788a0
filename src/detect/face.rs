use super::landmarks::LandmarkSet;

/// Face bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl FaceBox {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }
}

/// A detected face. Valid only for the frame that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Face {
    pub bbox: FaceBox,
    pub landmarks: LandmarkSet,
}

impl Face {
    pub fn new(bbox: FaceBox, landmarks: LandmarkSet) -> Self {
        Self { bbox, landmarks }
    }
}
