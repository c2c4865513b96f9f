use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::backend::InferenceEngine;
use crate::detect::result::{BoundingBox, Detection, DetectionOutcome};
use crate::error::EngineInitError;
use crate::preprocess::PreparedImage;

/// Script file layout:
///
/// ```json
/// { "labels": ["focused", "distracted"],
///   "frames_per_step": 30,
///   "steps": [["focused"], ["distracted"], []] }
/// ```
#[derive(Debug, Deserialize)]
struct ScriptFile {
    labels: Vec<String>,
    #[serde(default = "default_frames_per_step")]
    frames_per_step: u32,
    steps: Vec<Vec<String>>,
}

fn default_frames_per_step() -> u32 {
    1
}

/// Engine that replays a fixed sequence of label batches, one step per
/// `frames_per_step` frames, cycling forever.
///
/// Stands in for a model on hosts without one. Setup fails the same way a
/// real engine does when its label file is missing or inconsistent.
pub struct ScriptedEngine {
    source: Option<PathBuf>,
    labels: Vec<String>,
    steps: Vec<Vec<String>>,
    frames_per_step: u32,
    cursor: usize,
    frames_in_step: u32,
    ready: bool,
}

impl ScriptedEngine {
    pub fn new(labels: Vec<String>, steps: Vec<Vec<String>>) -> Self {
        Self {
            source: None,
            labels,
            steps,
            frames_per_step: 1,
            cursor: 0,
            frames_in_step: 0,
            ready: false,
        }
    }

    /// Load labels and steps from a JSON script during `setup`.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            ..Self::new(Vec::new(), Vec::new())
        }
    }

    /// Same batch on every frame.
    pub fn constant(labels: &[&str]) -> Self {
        let owned: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        Self::new(owned.clone(), vec![owned])
    }

    pub fn with_frames_per_step(mut self, frames: u32) -> Self {
        self.frames_per_step = frames.max(1);
        self
    }

    fn load_source(&mut self) -> Result<(), EngineInitError> {
        let Some(path) = &self.source else {
            return Ok(());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineInitError::Model(format!("{}: {}", path.display(), e)))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .map_err(|e| EngineInitError::Labels(format!("{}: {}", path.display(), e)))?;
        self.labels = script.labels;
        self.steps = script.steps;
        self.frames_per_step = script.frames_per_step.max(1);
        Ok(())
    }

    fn current_step(&self) -> Result<&[String]> {
        self.steps
            .get(self.cursor)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("script cursor out of range"))
    }

    fn advance(&mut self) {
        self.frames_in_step += 1;
        if self.frames_in_step >= self.frames_per_step {
            self.frames_in_step = 0;
            self.cursor = (self.cursor + 1) % self.steps.len();
        }
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn setup(&mut self) -> Result<(), EngineInitError> {
        self.load_source()?;
        if self.labels.is_empty() {
            return Err(EngineInitError::Labels("label list is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(EngineInitError::Model("script has no steps".to_string()));
        }
        for label in self.steps.iter().flatten() {
            if !self.labels.contains(label) {
                return Err(EngineInitError::Labels(format!(
                    "script uses unknown label '{}'",
                    label
                )));
            }
        }
        self.cursor = 0;
        self.frames_in_step = 0;
        self.ready = true;
        Ok(())
    }

    fn detect(&mut self, _image: &PreparedImage) -> Result<DetectionOutcome> {
        if !self.ready {
            return Err(anyhow!("scripted engine used before setup"));
        }
        let started = Instant::now();
        let step = self.current_step()?;
        let detections: Vec<Detection> = step
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let offset = 0.05 * i as f32;
                Detection {
                    label: label.clone(),
                    class_index: self.labels.iter().position(|l| l == label).unwrap_or(0),
                    confidence: 0.9,
                    bbox: BoundingBox {
                        x1: 0.25 + offset,
                        y1: 0.2 + offset,
                        x2: 0.75 + offset,
                        y2: 0.8 + offset,
                    },
                }
            })
            .collect();
        self.advance();

        if detections.is_empty() {
            return Ok(DetectionOutcome::Empty);
        }
        let inference_ms = started.elapsed().as_millis() as u64;
        Ok(DetectionOutcome::detected(detections, inference_ms))
    }

    fn clear(&mut self) {
        self.ready = false;
        log::debug!("scripted engine cleared");
    }
}
