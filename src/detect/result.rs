/// Axis-aligned box in normalized (0..1) image coordinates, upright and
/// mirrored the way the driver sees the preview.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// One classified region.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Result of one `detect` call: either a batch or an explicit "nothing found".
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    Detected {
        detections: Vec<Detection>,
        inference_ms: u64,
    },
    Empty,
}

impl DetectionOutcome {
    pub fn detected(detections: Vec<Detection>, inference_ms: u64) -> Self {
        DetectionOutcome::Detected {
            detections,
            inference_ms,
        }
    }

    /// Labels in engine order. Empty for `Empty`.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            DetectionOutcome::Detected { detections, .. } => {
                detections.iter().map(|d| d.label.as_str()).collect()
            }
            DetectionOutcome::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DetectionOutcome::Detected { detections, .. } => detections.is_empty(),
            DetectionOutcome::Empty => true,
        }
    }
}
