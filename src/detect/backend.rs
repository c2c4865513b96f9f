use anyhow::Result;

use crate::detect::result::{Detection, DetectionOutcome};
use crate::error::EngineInitError;
use crate::preprocess::PreparedImage;

/// On-device inference engine.
///
/// # Contract
///
/// - `setup` loads model and labels; failure is an initialization error.
/// - `detect` yields exactly one outcome per call. The pipeline delivers it to
///   the coordination thread; the engine never touches alert state.
/// - `clear` releases engine resources. The pipeline calls it exactly once.
pub trait InferenceEngine: Send {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    fn setup(&mut self) -> Result<(), EngineInitError>;

    /// Run detection on one upright image.
    fn detect(&mut self, image: &PreparedImage) -> Result<DetectionOutcome>;

    fn clear(&mut self);
}

/// Detection-result listener exposed upward (overlay rendering).
pub trait DetectorListener: Send {
    fn on_detect(&mut self, detections: &[Detection], inference_ms: u64);

    fn on_empty_detect(&mut self);
}

/// Listener that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullListener;

impl DetectorListener for NullListener {
    fn on_detect(&mut self, _detections: &[Detection], _inference_ms: u64) {}

    fn on_empty_detect(&mut self) {}
}

/// Listener that logs inference latency at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl DetectorListener for LogListener {
    fn on_detect(&mut self, detections: &[Detection], inference_ms: u64) {
        log::debug!("overlay: {} boxes ({}ms)", detections.len(), inference_ms);
    }

    fn on_empty_detect(&mut self) {
        log::debug!("overlay: cleared");
    }
}

/// Mirror an outcome to a listener, picking the matching callback.
pub fn dispatch(listener: &mut dyn DetectorListener, outcome: &DetectionOutcome) {
    match outcome {
        DetectionOutcome::Detected {
            detections,
            inference_ms,
        } => listener.on_detect(detections, *inference_ms),
        DetectionOutcome::Empty => listener.on_empty_detect(),
    }
}
