//! Gaze classification.
//!
//! A `GazeClassifier` decides, from one face's landmarks, whether that face is
//! looking at the screen. The state machine only sees the aggregated
//! observation, so classifiers can be swapped freely.

use serde::Deserialize;

use crate::detect::LandmarkSet;
use crate::settings::SettingsHandle;

/// Eye aspect ratio of a relaxed, fully open eye.
pub const OPEN_EYE_ASPECT: f32 = 0.30;

/// Pure predicate over one face's landmarks.
pub trait GazeClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, landmarks: &LandmarkSet) -> bool;
}

/// Treats every detected face as gazing.
///
/// With this classifier the threat signal reduces to "more than one face".
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysGazing;

impl GazeClassifier for AlwaysGazing {
    fn name(&self) -> &'static str {
        "always"
    }

    fn classify(&self, _landmarks: &LandmarkSet) -> bool {
        true
    }
}

/// Geometric classifier built on the eye construction lines.
///
/// confidence = openness x frontality, where
/// - openness = mean eye aspect ratio / [`OPEN_EYE_ASPECT`], capped at 1;
/// - frontality = narrower eye width / wider eye width (a turned head
///   foreshortens the far eye).
///
/// A face is gazing when confidence reaches the detection threshold.
#[derive(Clone, Debug)]
pub struct EyeAspectClassifier {
    threshold: Threshold,
}

#[derive(Clone, Debug)]
enum Threshold {
    Fixed(f32),
    /// Read from the operator settings on every classification.
    Live(SettingsHandle),
}

impl EyeAspectClassifier {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: Threshold::Fixed(threshold),
        }
    }

    /// Follow `settings.detection_threshold`, so an applied change takes
    /// effect from the next frame.
    pub fn live(settings: SettingsHandle) -> Self {
        Self {
            threshold: Threshold::Live(settings),
        }
    }

    pub fn threshold(&self) -> f32 {
        match &self.threshold {
            Threshold::Fixed(threshold) => *threshold,
            Threshold::Live(settings) => settings.snapshot().detection_threshold,
        }
    }

    /// `None` when either eye has degenerate geometry.
    pub fn confidence(&self, landmarks: &LandmarkSet) -> Option<f32> {
        let left = landmarks.left_eye();
        let right = landmarks.right_eye();
        let ear = (left.aspect_ratio()? + right.aspect_ratio()?) / 2.0;
        let openness = (ear / OPEN_EYE_ASPECT).min(1.0);

        let (lw, rw) = (left.horizontal.length(), right.horizontal.length());
        let frontality = lw.min(rw) / lw.max(rw);

        Some(openness * frontality)
    }
}

impl GazeClassifier for EyeAspectClassifier {
    fn name(&self) -> &'static str {
        "eye-aspect"
    }

    fn classify(&self, landmarks: &LandmarkSet) -> bool {
        self.confidence(landmarks)
            .is_some_and(|confidence| confidence >= self.threshold())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    #[default]
    Always,
    EyeAspect,
}

impl std::str::FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim() {
            "always" => Ok(Self::Always),
            "eye-aspect" => Ok(Self::EyeAspect),
            other => Err(anyhow::anyhow!(
                "unknown gaze classifier '{}' (expected always or eye-aspect)",
                other
            )),
        }
    }
}

/// Build the configured classifier. `EyeAspect` tracks the detection
/// threshold in `settings` for as long as it lives.
pub fn classifier_for(kind: ClassifierKind, settings: &SettingsHandle) -> Box<dyn GazeClassifier> {
    match kind {
        ClassifierKind::Always => Box::new(AlwaysGazing),
        ClassifierKind::EyeAspect => Box::new(EyeAspectClassifier::live(settings.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{FaceBox, Point, RIGHT_EYE};
    use crate::settings::Settings;

    fn face(eye_aspect: f32) -> LandmarkSet {
        LandmarkSet::template(&FaceBox::new(0.0, 0.0, 200.0, 200.0), eye_aspect)
    }

    /// Squash the right eye horizontally towards its outer corner.
    fn turned(set: LandmarkSet, factor: f32) -> LandmarkSet {
        let anchor = set.point(RIGHT_EYE.corners.0);
        set.map_points(|i, p| {
            if (42..=47).contains(&i) {
                Point::new(anchor.x + (p.x - anchor.x) * factor, p.y)
            } else {
                p
            }
        })
    }

    #[test]
    fn always_gazing_accepts_any_face() {
        assert!(AlwaysGazing.classify(&face(0.0)));
        assert!(AlwaysGazing.classify(&face(0.3)));
    }

    #[test]
    fn open_frontal_eyes_are_gazing() {
        let classifier = EyeAspectClassifier::new(0.4);
        let confidence = classifier.confidence(&face(0.3)).unwrap();
        assert!((confidence - 1.0).abs() < 1e-3);
        assert!(classifier.classify(&face(0.3)));
    }

    #[test]
    fn closed_eyes_are_not_gazing() {
        let classifier = EyeAspectClassifier::new(0.4);
        assert!(!classifier.classify(&face(0.05)));
        assert!(classifier.classify(&face(0.15)));
    }

    #[test]
    fn turned_head_lowers_confidence() {
        let classifier = EyeAspectClassifier::new(0.6);
        let frontal = face(0.3);
        let away = turned(face(0.3), 0.4);
        assert!(classifier.classify(&frontal));
        assert!(!classifier.classify(&away));
    }

    #[test]
    fn degenerate_eye_is_not_gazing() {
        let classifier = EyeAspectClassifier::new(0.1);
        let collapsed = turned(face(0.3), 0.0);
        assert_eq!(classifier.confidence(&collapsed), None);
        assert!(!classifier.classify(&collapsed));
    }

    #[test]
    fn classifier_kind_parses_config_names() {
        assert_eq!("always".parse::<ClassifierKind>().unwrap(), ClassifierKind::Always);
        assert_eq!(
            "eye-aspect".parse::<ClassifierKind>().unwrap(),
            ClassifierKind::EyeAspect
        );
        assert!("gaze-vector".parse::<ClassifierKind>().is_err());
        let settings = SettingsHandle::default();
        assert_eq!(classifier_for(ClassifierKind::EyeAspect, &settings).name(), "eye-aspect");
        assert_eq!(classifier_for(ClassifierKind::Always, &settings).name(), "always");
    }

    #[test]
    fn applied_threshold_changes_classification() {
        let settings = SettingsHandle::new(Settings {
            detection_threshold: 0.4,
            ..Settings::default()
        });
        let classifier = classifier_for(ClassifierKind::EyeAspect, &settings);
        // Half-open eyes: confidence 0.5.
        let squint = face(0.15);
        assert!(classifier.classify(&squint));

        settings
            .apply(Settings {
                detection_threshold: 0.8,
                ..settings.snapshot()
            })
            .unwrap();
        assert!(!classifier.classify(&squint));

        settings
            .apply(Settings {
                detection_threshold: 0.45,
                ..settings.snapshot()
            })
            .unwrap();
        assert!(classifier.classify(&squint));
    }
}
