//! Gaze Guard
//!
//! Watches the camera for a second face looking at the screen ("shoulder
//! surfing") and reacts: dims the display, plays an alert, and records the
//! event in a CSV log. Brightness is restored once the onlooker has been
//! gone for a run of consecutive safe frames.
//!
//! # Pipeline
//!
//! ```text
//! FrameSource -> FaceLandmarkExtractor -> GazeClassifier (per face)
//!   -> FrameObservation -> ThreatStateMachine -> ReactionController
//!                                                 -> brightness, sound, EventLog
//! ```
//!
//! Each processed frame is also annotated (eye lines, face boxes) and handed
//! to the preview slot for display. The display never gates detection.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic `stub://`, V4L2)
//! - `frame`: RGB24 frames, zeroized on drop
//! - `detect`: faces and 68-point landmark sets
//! - `gaze`: per-face gaze classifiers
//! - `observation`, `threat`: per-frame summary and the debounced state machine
//! - `reaction`, `event_log`: side effects of threat transitions
//! - `session`: start/stop lifecycle of the detection worker
//! - `display`: preview slot and console status
//! - `config`, `settings`: file/env configuration and live reaction settings

pub mod config;
pub mod detect;
pub mod display;
pub mod event_log;
pub mod frame;
pub mod gaze;
pub mod ingest;
pub mod observation;
pub mod reaction;
pub mod session;
pub mod settings;
pub mod threat;

pub use config::GuardConfig;
pub use detect::{Face, FaceBox, FaceLandmarkExtractor, LandmarkSet, ScriptedExtractor};
pub use display::{ConsoleDisplay, DisplaySurface, Preview, PreviewSlot};
pub use event_log::{EventKind, EventLog, LogEntry, LogMode};
pub use frame::Frame;
pub use gaze::{classifier_for, AlwaysGazing, ClassifierKind, EyeAspectClassifier, GazeClassifier};
pub use ingest::{source_for, CameraConfig, CaptureError, FrameSource, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use observation::{FrameObservation, PrimaryFacePolicy};
pub use reaction::{AlertSound, BrightnessControl, ReactionController, ReactionReport};
pub use session::{DetectionSession, SessionError, SessionState, SessionStatus, WorkerParts};
pub use settings::{Settings, SettingsHandle};
pub use threat::{ThreatState, ThreatStateMachine, ThreatTransition};
