//! Camera frame source.
//!
//! This module provides the camera side of the pipeline:
//! - `CameraProvider`: platform binding of preview + analysis use cases
//! - `CameraController`: facing toggles and unbind-before-bind rebinding
//! - `SyntheticCamera`: in-process provider for tests and the demo daemon
//! - `CameraPermission`: the permission gate checked before the pipeline opens
//!
//! Providers push frames into the shared `FrameSlot`; they never queue and
//! never retain a frame after handing it off.

mod controller;
pub mod synthetic;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::BindingError;
use crate::frame::FrameSlot;

pub use controller::CameraController;
pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facing {
    Front,
    Back,
}

impl Facing {
    pub fn flipped(self) -> Self {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
        }
    }
}

impl FromStr for Facing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Facing::Front),
            "back" | "rear" => Ok(Facing::Back),
            other => Err(anyhow!("unknown camera facing '{}'", other)),
        }
    }
}

/// Mutable camera configuration, owned by the `CameraController`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    pub facing: Facing,
    /// Display rotation the use cases target (0, 90, 180, 270).
    pub rotation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AspectRatio {
    Ratio4x3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backpressure {
    KeepOnlyLatest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Rgba8888,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseCase {
    Preview,
    Analysis,
}

/// Everything a provider needs to bind preview + analysis for one facing.
///
/// Aspect ratio, backpressure and output format are fixed at construction of
/// the controller and carried unchanged across every rebind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindRequest {
    pub facing: Facing,
    pub rotation: u32,
    pub aspect_ratio: AspectRatio,
    pub backpressure: Backpressure,
    pub output_format: OutputFormat,
    pub use_cases: Vec<UseCase>,
}

/// Platform camera binding.
pub trait CameraProvider: Send {
    /// Bind the requested use cases. Analysis frames go to `analyzer`.
    fn bind(&mut self, request: &BindRequest, analyzer: Arc<FrameSlot>)
        -> Result<(), BindingError>;

    /// Release every bound use case. Must be safe to call when nothing is bound.
    fn unbind_all(&mut self);
}

/// Camera permission query/request.
pub trait CameraPermission: Send {
    fn is_granted(&self) -> bool;

    /// Prompt for the permission; returns the grant outcome.
    fn request(&mut self) -> bool;
}

/// Permission with a fixed answer (headless hosts, tests).
#[derive(Clone, Copy, Debug)]
pub struct StaticPermission {
    granted: bool,
}

impl StaticPermission {
    pub fn granted() -> Self {
        Self { granted: true }
    }

    pub fn denied() -> Self {
        Self { granted: false }
    }
}

impl CameraPermission for StaticPermission {
    fn is_granted(&self) -> bool {
        self.granted
    }

    fn request(&mut self) -> bool {
        self.granted
    }
}
