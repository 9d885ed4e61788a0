//! Per-frame summary fed to the threat state machine.

use crate::detect::Face;
use crate::gaze::GazeClassifier;

/// Everything the state machine learns about one processed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameObservation {
    pub person_count: usize,
    /// True iff at least one counted face is classified as gazing.
    pub any_gazing: bool,
}

/// Whether the device user's own face may count as an onlooker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimaryFacePolicy {
    /// The largest face is the user; only the others can be gazing intruders.
    #[default]
    ExcludeLargest,
    /// Every face is classified, including the user's.
    IncludeAll,
}

impl PrimaryFacePolicy {
    pub fn from_exclude_flag(exclude_primary: bool) -> Self {
        if exclude_primary {
            Self::ExcludeLargest
        } else {
            Self::IncludeAll
        }
    }
}

impl FrameObservation {
    pub fn new(person_count: usize, any_gazing: bool) -> Self {
        Self {
            person_count,
            any_gazing,
        }
    }

    /// More than one person and someone looking.
    pub fn threat_signal(&self) -> bool {
        self.person_count > 1 && self.any_gazing
    }

    /// Count every face; classify all faces except the primary one when the
    /// policy excludes it.
    pub fn from_faces(
        faces: &[Face],
        classifier: &dyn GazeClassifier,
        policy: PrimaryFacePolicy,
    ) -> Self {
        let skip = match policy {
            PrimaryFacePolicy::ExcludeLargest => primary_face_index(faces),
            PrimaryFacePolicy::IncludeAll => None,
        };
        let any_gazing = faces
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != skip)
            .any(|(_, face)| classifier.classify(&face.landmarks));
        Self::new(faces.len(), any_gazing)
    }
}

/// Index of the largest face by box area; ties resolve to the first.
pub fn primary_face_index(faces: &[Face]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, face) in faces.iter().enumerate() {
        let area = face.bbox.area();
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((index, area)),
        }
    }
    best.map(|(index, _)| index)
}
