mod backend;
mod backends;
mod handle;
mod result;

pub use backend::{dispatch, DetectorListener, InferenceEngine, LogListener, NullListener};
pub use backends::ScriptedEngine;
pub use handle::EngineHandle;
pub use result::{BoundingBox, Detection, DetectionOutcome};
