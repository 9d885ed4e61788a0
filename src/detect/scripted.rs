//! Scripted extractor.
//!
//! Replays a face-count script against whatever frames it is given and
//! synthesizes frontal 68-point landmark sets for each face. Used for demos
//! on machines without a landmark model, and by tests.
//!
//! Script grammar: comma-separated steps, each `<count>` or `<count>x<repeat>`,
//! where `<count>` is a face count or `e` (extraction failure). The script
//! loops when exhausted. Example: `0x20,2x30,ex2,1x40`.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::{Face, FaceBox, FaceLandmarkExtractor, LandmarkSet, Point};
use crate::frame::Frame;
use crate::gaze::OPEN_EYE_ASPECT;

const PRIMARY_FACE_SCALE: f32 = 0.45;
const ONLOOKER_FACE_SCALE: f32 = 0.22;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptStep {
    Faces(usize),
    Fail,
}

pub struct ScriptedExtractor {
    steps: Vec<ScriptStep>,
    cursor: usize,
    jitter: f32,
    eye_aspect: f32,
    rng: StdRng,
}

impl ScriptedExtractor {
    pub fn new(steps: Vec<ScriptStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(anyhow!("extractor script must contain at least one step"));
        }
        Ok(Self {
            steps,
            cursor: 0,
            jitter: 0.0,
            eye_aspect: OPEN_EYE_ASPECT,
            rng: StdRng::seed_from_u64(0x6a7e),
        })
    }

    pub fn parse(script: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for token in script.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (head, repeat) = match token.split_once('x') {
                Some((head, repeat)) => {
                    let repeat: usize = repeat
                        .trim()
                        .parse()
                        .with_context(|| format!("invalid repeat in script step '{}'", token))?;
                    (head.trim(), repeat)
                }
                None => (token, 1),
            };
            let step = if head == "e" {
                ScriptStep::Fail
            } else {
                ScriptStep::Faces(
                    head.parse()
                        .with_context(|| format!("invalid face count in script step '{}'", token))?,
                )
            };
            steps.extend(std::iter::repeat(step).take(repeat));
        }
        Self::new(steps)
    }

    /// Max landmark displacement in pixels (uniform noise per point).
    pub fn with_jitter(mut self, pixels: f32) -> Self {
        self.jitter = pixels.max(0.0);
        self
    }

    /// Eye aspect ratio given to every synthesized face.
    pub fn with_eye_aspect(mut self, eye_aspect: f32) -> Self {
        self.eye_aspect = eye_aspect;
        self
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    fn next_step(&mut self) -> ScriptStep {
        let step = self.steps[self.cursor % self.steps.len()];
        self.cursor = self.cursor.wrapping_add(1);
        step
    }

    fn face_boxes(&self, count: usize, width: f32, height: f32) -> Vec<FaceBox> {
        let side = width.min(height);
        let mut boxes = Vec::with_capacity(count);
        if count == 0 {
            return boxes;
        }
        let primary = side * PRIMARY_FACE_SCALE;
        boxes.push(FaceBox::new(
            (width - primary) / 2.0,
            (height - primary) / 2.0,
            primary,
            primary,
        ));
        // Onlookers line up along the top edge, behind the user.
        let small = side * ONLOOKER_FACE_SCALE;
        for k in 0..count - 1 {
            let x = (width * 0.02 + k as f32 * small * 1.1) % (width - small).max(1.0);
            boxes.push(FaceBox::new(x, height * 0.02, small, small));
        }
        boxes
    }

    fn synthesize(&mut self, bbox: FaceBox) -> Face {
        let jitter = self.jitter;
        let template = LandmarkSet::template(&bbox, self.eye_aspect);
        let landmarks = if jitter > 0.0 {
            let rng = &mut self.rng;
            template.map_points(|_, p| {
                Point::new(
                    p.x + rng.gen_range(-jitter..=jitter),
                    p.y + rng.gen_range(-jitter..=jitter),
                )
            })
        } else {
            template
        };
        Face::new(bbox, landmarks)
    }
}

impl FaceLandmarkExtractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn extract(&mut self, frame: &Frame) -> Result<Vec<Face>> {
        match self.next_step() {
            ScriptStep::Fail => Err(anyhow!(
                "scripted extraction failure at frame {}",
                frame.sequence
            )),
            ScriptStep::Faces(count) => {
                let boxes = self.face_boxes(count, frame.width as f32, frame.height as f32);
                Ok(boxes.into_iter().map(|b| self.synthesize(b)).collect())
            }
        }
    }
}
