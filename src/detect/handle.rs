use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use crate::detect::backend::InferenceEngine;
use crate::detect::result::DetectionOutcome;
use crate::error::EngineInitError;
use crate::preprocess::PreparedImage;

enum EngineState {
    Active(Box<dyn InferenceEngine>),
    Released,
}

/// Shared, release-once wrapper around the inference engine.
///
/// The analysis worker calls `detect`; teardown calls `release` from another
/// thread. The engine sits behind a `Mutex` because `detect` takes `&mut self`,
/// so release waits for an in-flight inference and every later `detect`
/// returns `None`.
pub struct EngineHandle {
    name: &'static str,
    state: Mutex<EngineState>,
}

impl EngineHandle {
    /// Run `setup` and wrap the engine. Fails with the engine's init error.
    pub fn setup(mut engine: Box<dyn InferenceEngine>) -> Result<Self, EngineInitError> {
        engine.setup()?;
        log::info!("inference engine '{}' ready", engine.name());
        Ok(Self {
            name: engine.name(),
            state: Mutex::new(EngineState::Active(engine)),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` once the engine has been released.
    pub fn detect(&self, image: &PreparedImage) -> Option<Result<DetectionOutcome>> {
        match &mut *self.lock() {
            EngineState::Active(engine) => Some(engine.detect(image)),
            EngineState::Released => None,
        }
    }

    /// Clear the engine. Returns `true` only for the call that released it.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, EngineState::Released) {
            EngineState::Active(mut engine) => {
                engine.clear();
                log::info!("inference engine '{}' released", self.name);
                true
            }
            EngineState::Released => false,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.lock(), EngineState::Released)
    }
}
