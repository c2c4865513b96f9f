//! Synthetic camera provider.
//!
//! Generates RGBA frames on a capture thread at the configured rate and pushes
//! them into the analyzer slot. Used by the demo daemon and the tests in place
//! of a platform camera.
//!
//! The synthetic provider MUST NOT:
//! - Queue frames (the slot decides what survives)
//! - Keep producing after `unbind_all` returns

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::BindingError;
use crate::frame::{Frame, FrameSlot};

use super::{BindRequest, CameraProvider, Facing};

/// Configuration for the synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    /// Frames per second produced while bound.
    pub fps: u32,
    /// Sensor orientation reported with front-camera frames.
    pub front_sensor_rotation: u32,
    /// Sensor orientation reported with back-camera frames.
    pub back_sensor_rotation: u32,
    /// Facings this device does not have; binding them fails.
    pub unavailable: HashSet<Facing>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 10,
            front_sensor_rotation: 270,
            back_sensor_rotation: 90,
            unavailable: HashSet::new(),
        }
    }
}

struct Capture {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// In-process camera provider.
pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    capture: Option<Capture>,
    frames_captured: Arc<AtomicU64>,
    binds: u64,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Self {
        Self {
            config,
            capture: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            binds: 0,
        }
    }

    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            binds: self.binds,
            bound: self.capture.is_some(),
        }
    }

    fn sensor_rotation(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Front => self.config.front_sensor_rotation,
            Facing::Back => self.config.back_sensor_rotation,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SyntheticStats {
    pub frames_captured: u64,
    pub binds: u64,
    pub bound: bool,
}

impl CameraProvider for SyntheticCamera {
    fn bind(
        &mut self,
        request: &BindRequest,
        analyzer: Arc<FrameSlot>,
    ) -> Result<(), BindingError> {
        if self.capture.is_some() {
            return Err(BindingError::Provider(
                "use cases already bound; unbind first".to_string(),
            ));
        }
        if self.config.unavailable.contains(&request.facing) {
            return Err(BindingError::CameraUnavailable(request.facing));
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(BindingError::Provider("zero frame size".to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let generator = PatternGenerator {
            width: self.config.width,
            height: self.config.height,
            rotation: self.sensor_rotation(request.facing),
            facing: request.facing,
        };
        let period = Duration::from_micros(1_000_000 / u64::from(self.config.fps.clamp(1, 1000)));
        let counter = Arc::clone(&self.frames_captured);
        let thread_stop = Arc::clone(&stop);

        let join = std::thread::Builder::new()
            .name(format!("camera-{}", request.facing))
            .spawn(move || {
                let mut sequence = 0u64;
                while !thread_stop.load(Ordering::SeqCst) {
                    sequence += 1;
                    let frame = generator.frame(sequence);
                    counter.fetch_add(1, Ordering::Relaxed);
                    analyzer.offer(frame);
                    std::thread::sleep(period);
                }
            })
            .map_err(|e| BindingError::Provider(format!("capture thread: {}", e)))?;

        self.binds += 1;
        self.capture = Some(Capture { stop, join });
        log::info!(
            "SyntheticCamera: bound {} camera {}x{} @ {} fps",
            request.facing,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    fn unbind_all(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop.store(true, Ordering::SeqCst);
            if capture.join.join().is_err() {
                log::error!("SyntheticCamera: capture thread panicked");
            }
            log::debug!("SyntheticCamera: unbound");
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

struct PatternGenerator {
    width: u32,
    height: u32,
    rotation: u32,
    facing: Facing,
}

impl PatternGenerator {
    fn frame(&self, sequence: u64) -> Frame {
        let pixel_count = self.width as usize * self.height as usize;
        let mut pixels = Vec::with_capacity(pixel_count * 4);
        for i in 0..pixel_count {
            let v = ((i as u64 + sequence) % 256) as u8;
            pixels.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170), 255]);
        }
        Frame::new(
            pixels,
            self.width,
            self.height,
            self.rotation,
            self.facing,
            sequence,
        )
    }
}
