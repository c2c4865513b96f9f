//! Pipeline error taxonomy.
//!
//! Plumbing (config, store internals, binaries) uses `anyhow`. The kinds below
//! are the ones callers need to tell apart:
//!
//! - `InitError`: fatal to the session; the pipeline does not start.
//! - `BindingError`: camera left unbound; retry by rebinding or toggling.
//! - `PersistenceError`: logged and surfaced; never gates alerting.
//! - `PreprocessError`: the frame is dropped silently.

use crate::camera::Facing;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("inference engine failed to initialize: {0}")]
    Engine(#[from] EngineInitError),

    #[error("pipeline thread failed to start: {0}")]
    Spawn(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineInitError {
    #[error("model could not be loaded: {0}")]
    Model(String),

    #[error("labels could not be loaded: {0}")]
    Labels(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("no {0} camera available")]
    CameraUnavailable(Facing),

    #[error("camera provider rejected binding: {0}")]
    Provider(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("store did not return a key for {0}")]
    KeyGeneration(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("event could not be encoded: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreprocessError {
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    MalformedBuffer { expected: usize, actual: usize },

    #[error("unsupported sensor rotation {0} degrees")]
    UnsupportedRotation(u32),
}
