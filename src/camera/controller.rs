use std::sync::Arc;

use crate::error::BindingError;
use crate::frame::FrameSlot;

use super::{
    AspectRatio, Backpressure, BindRequest, CameraConfig, CameraProvider, Facing, OutputFormat,
    UseCase,
};

/// Camera reconfiguration manager.
///
/// Owns the provider and the `CameraConfig`. Every bind first unbinds all use
/// cases, so a failed bind leaves the camera unbound rather than half bound,
/// and the next toggle or rebind starts from a clean state.
pub struct CameraController {
    provider: Box<dyn CameraProvider>,
    config: CameraConfig,
    aspect_ratio: AspectRatio,
    backpressure: Backpressure,
    output_format: OutputFormat,
    analyzer: Arc<FrameSlot>,
    bound: bool,
}

impl CameraController {
    pub fn new(
        provider: Box<dyn CameraProvider>,
        config: CameraConfig,
        analyzer: Arc<FrameSlot>,
    ) -> Self {
        Self {
            provider,
            config,
            aspect_ratio: AspectRatio::Ratio4x3,
            backpressure: Backpressure::KeepOnlyLatest,
            output_format: OutputFormat::Rgba8888,
            analyzer,
            bound: false,
        }
    }

    pub fn facing(&self) -> Facing {
        self.config.facing
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Bind with the current facing.
    pub fn start(&mut self) -> Result<(), BindingError> {
        self.bind_use_cases()
    }

    /// Bind with `facing`. No-op when already bound with that facing.
    pub fn rebind(&mut self, facing: Facing) -> Result<(), BindingError> {
        if self.bound && self.config.facing == facing {
            return Ok(());
        }
        self.config.facing = facing;
        self.bind_use_cases()
    }

    /// Flip facing, then unbind everything and bind again.
    ///
    /// The facing flips even if the bind fails.
    pub fn toggle(&mut self) -> Result<Facing, BindingError> {
        self.config.facing = self.config.facing.flipped();
        log::info!("camera: switching to {} camera", self.config.facing);
        self.bind_use_cases()?;
        Ok(self.config.facing)
    }

    pub fn unbind(&mut self) {
        self.provider.unbind_all();
        self.analyzer.clear();
        self.bound = false;
    }

    fn request(&self) -> BindRequest {
        BindRequest {
            facing: self.config.facing,
            rotation: self.config.rotation,
            aspect_ratio: self.aspect_ratio,
            backpressure: self.backpressure,
            output_format: self.output_format,
            use_cases: vec![UseCase::Preview, UseCase::Analysis],
        }
    }

    fn bind_use_cases(&mut self) -> Result<(), BindingError> {
        self.unbind();
        let request = self.request();
        match self.provider.bind(&request, Arc::clone(&self.analyzer)) {
            Ok(()) => {
                self.bound = true;
                log::info!(
                    "camera: bound {} camera (rotation={}, {:?})",
                    request.facing,
                    request.rotation,
                    request.aspect_ratio
                );
                Ok(())
            }
            Err(e) => {
                log::error!("camera: use case binding failed: {}", e);
                Err(e)
            }
        }
    }
}
