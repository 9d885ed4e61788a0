mod extractor;
mod face;
mod landmarks;
mod scripted;

pub use extractor::FaceLandmarkExtractor;
pub use face::{Face, FaceBox};
pub use landmarks::{
    EyeIndices, EyeLines, LandmarkError, LandmarkSet, Point, Segment, LANDMARK_COUNT, LEFT_EYE,
    RIGHT_EYE,
};
pub use scripted::{ScriptStep, ScriptedExtractor};
