//! Debounced threat signal.
//!
//! Raising is immediate: the first frame with more than one person and a
//! gazing onlooker activates the threat. Clearing is hysteretic: the threat
//! stays active until `safe_frames` consecutive clean observations arrive.
//!
//! Only processed frames reach [`ThreatStateMachine::observe`]. Frames whose
//! capture or landmark extraction failed are skipped by the caller and never
//! advance the safe-frame counter.

use crate::observation::FrameObservation;

/// Consecutive clean frames required before the threat clears.
pub const DEFAULT_SAFE_FRAMES: u32 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreatState {
    #[default]
    Clear,
    Active,
}

/// Edge emitted by the state machine; drives the reaction controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreatTransition {
    /// `Clear -> Active`.
    Detected,
    /// `Active -> Clear` after the safe-frame run.
    Cleared,
}

#[derive(Clone, Debug)]
pub struct ThreatStateMachine {
    state: ThreatState,
    safe_frame_counter: u32,
    safe_frames: u32,
}

impl ThreatStateMachine {
    /// `safe_frames` below 1 is raised to 1.
    pub fn new(safe_frames: u32) -> Self {
        Self {
            state: ThreatState::Clear,
            safe_frame_counter: 0,
            safe_frames: safe_frames.max(1),
        }
    }

    pub fn state(&self) -> ThreatState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ThreatState::Active
    }

    pub fn safe_frame_counter(&self) -> u32 {
        self.safe_frame_counter
    }

    pub fn safe_frames(&self) -> u32 {
        self.safe_frames
    }

    /// Back to `Clear` with a zero counter.
    pub fn reset(&mut self) {
        self.state = ThreatState::Clear;
        self.safe_frame_counter = 0;
    }

    /// Advance on one processed frame.
    pub fn observe(&mut self, observation: FrameObservation) -> Option<ThreatTransition> {
        if observation.threat_signal() {
            self.safe_frame_counter = 0;
            return match self.state {
                ThreatState::Clear => {
                    self.state = ThreatState::Active;
                    Some(ThreatTransition::Detected)
                }
                ThreatState::Active => None,
            };
        }

        match self.state {
            ThreatState::Clear => None,
            ThreatState::Active => {
                self.safe_frame_counter += 1;
                if self.safe_frame_counter >= self.safe_frames {
                    self.state = ThreatState::Clear;
                    self.safe_frame_counter = 0;
                    Some(ThreatTransition::Cleared)
                } else {
                    None
                }
            }
        }
    }
}

impl Default for ThreatStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_SAFE_FRAMES)
    }
}
