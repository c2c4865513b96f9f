//! Driver Watch
//!
//! Continuous detection-to-alert pipeline for driver behaviour monitoring.
//!
//! # Architecture
//!
//! Frames flow one way:
//!
//! camera → `FrameSlot` (keep latest) → analysis worker (preprocess + engine)
//! → coordinator (alert machine → actuators, event persister)
//!
//! The coordinator is the only thread that touches alert state, timers,
//! actuators and the camera binding. Everything else talks to it through
//! channels.
//!
//! # Module Structure
//!
//! - `frame`: frames and the keep-latest handoff slot
//! - `camera`: providers, facing toggles, permission gate
//! - `preprocess`: rotation and front-camera mirroring
//! - `detect`: inference engine boundary and outcomes
//! - `alert`: alert state machine and periodic timers
//! - `actuator`: haptic loop and audio alarm
//! - `persist`, `store`, `history`: detection events and the event store
//! - `pipeline`: wiring, lifecycle and teardown order
//! - `config`: layered configuration (file, then environment)

pub mod actuator;
pub mod alert;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod history;
pub mod notify;
pub mod persist;
pub mod pipeline;
pub mod preprocess;
pub mod store;
pub mod worker;

pub use actuator::{ActuatorController, Amplitude, AudioAlarm, Haptics, LogAlarm, LogHaptics};
pub use alert::{AlertMachine, AlertState, LabelPolicy, PeriodicTask, Transition};
pub use camera::{
    CameraController, CameraPermission, CameraProvider, Facing, StaticPermission, SyntheticCamera,
    SyntheticCameraConfig,
};
pub use config::{AlertSettings, CameraSettings, MonitorConfig};
pub use detect::{
    DetectionOutcome, DetectorListener, EngineHandle, InferenceEngine, LogListener, ScriptedEngine,
};
pub use error::{BindingError, EngineInitError, InitError, PersistenceError, PreprocessError};
pub use frame::{Frame, FrameSlot};
pub use notify::{LogNotifier, Notice, Notifier};
pub use persist::{DetectionEvent, EventPersister};
pub use pipeline::{Pipeline, PipelineParts, PipelineSettings, PipelineSnapshot};
pub use store::{MemoryStore, RemoteStore, SqliteStore, StoreClient};
