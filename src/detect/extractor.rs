use anyhow::Result;

use crate::detect::Face;
use crate::frame::Frame;

/// Face detector plus landmark predictor.
///
/// Implementations wrap a vision library. They receive a borrowed frame for
/// the duration of one call and must not keep pixel data past it.
pub trait FaceLandmarkExtractor: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect every face in `frame` and return its 68-point landmark set.
    ///
    /// An error skips the frame; it never counts as an empty observation.
    fn extract(&mut self, frame: &Frame) -> Result<Vec<Face>>;

    /// Optional warm-up hook (model load, first inference).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
