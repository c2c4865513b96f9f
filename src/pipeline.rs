//! Detection-to-alert pipeline.
//!
//! Threads:
//! - camera capture (owned by the provider) offers frames to the slot
//! - `analysis` preprocesses and runs the engine, one frame at a time
//! - `coordinator` owns the alert machine, actuators, persister and camera
//!   controller; outcomes, commands and timer deadlines all arrive there
//!
//! Nothing outside the coordinator reads its state directly; `snapshot`,
//! `toggle_camera` and `rebind` are requests over its command channel.
//!
//! Teardown order (`close`, or drop):
//! 0. mark the pipeline closing; the coordinator stops applying outcomes
//!    and timers from here on
//! 1. release the engine
//! 2. stop the analysis worker
//! 3. cancel haptic and resync timers
//! 4. release the audio alarm
//! 5. unbind the camera and flush queued store writes

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{at, bounded, never, select, unbounded, Receiver, Sender};

use crate::actuator::{ActuatorController, AudioAlarm, Haptics};
use crate::alert::{AlertMachine, AlertState, Transition};
use crate::camera::{CameraConfig, CameraController, CameraPermission, CameraProvider, Facing};
use crate::config::{AlertSettings, CameraSettings, MonitorConfig};
use crate::detect::{dispatch, DetectionOutcome, DetectorListener, EngineHandle, InferenceEngine};
use crate::error::{BindingError, InitError};
use crate::frame::{FrameSlot, SlotStats};
use crate::notify::{Notice, Notifier};
use crate::persist::EventPersister;
use crate::store::StoreClient;
use crate::worker::{AnalysisWorker, WorkerStats};

/// Immutable settings a pipeline is built with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub user_id: String,
    pub alert: AlertSettings,
    pub camera: CameraSettings,
}

impl PipelineSettings {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            user_id: cfg.user_id.clone(),
            alert: cfg.alert.clone(),
            camera: cfg.camera.clone(),
        }
    }
}

/// Platform collaborators handed to `Pipeline::open`.
pub struct PipelineParts {
    pub camera: Box<dyn CameraProvider>,
    pub permission: Box<dyn CameraPermission>,
    pub engine: Box<dyn InferenceEngine>,
    pub haptics: Box<dyn Haptics>,
    pub alarm: Box<dyn AudioAlarm>,
    pub store: Arc<StoreClient>,
    pub notifier: Arc<dyn Notifier>,
    pub listener: Box<dyn DetectorListener>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSnapshot {
    pub alert: AlertState,
    pub facing: Facing,
    pub bound: bool,
    pub frames: SlotStats,
    pub analyzed: u64,
    pub events_issued: u64,
}

enum Command {
    ToggleCamera {
        reply: Sender<Result<Facing, BindingError>>,
    },
    Rebind {
        reply: Sender<Result<(), BindingError>>,
    },
    Snapshot {
        reply: Sender<PipelineSnapshot>,
    },
    Shutdown,
}

pub struct Pipeline {
    engine: Arc<EngineHandle>,
    worker: AnalysisWorker,
    commands: Sender<Command>,
    coordinator: Option<JoinHandle<()>>,
    store: Arc<StoreClient>,
    closing: Arc<Mutex<bool>>,
    closed: bool,
}

impl Pipeline {
    /// Check the camera permission, set up the engine and start every thread.
    ///
    /// A camera that fails to bind does not fail `open`: the failure is
    /// reported and the pipeline stays unbound until `rebind` or
    /// `toggle_camera` succeeds.
    pub fn open(settings: PipelineSettings, parts: PipelineParts) -> Result<Self, InitError> {
        let PipelineParts {
            camera,
            mut permission,
            engine,
            haptics,
            alarm,
            store,
            notifier,
            listener,
        } = parts;

        if !permission.is_granted() && !permission.request() {
            log::error!("camera permission denied; pipeline not started");
            return Err(InitError::PermissionDenied);
        }

        let engine = Arc::new(EngineHandle::setup(engine)?);
        let slot = Arc::new(FrameSlot::new());

        let (outcome_tx, outcome_rx) = unbounded();
        let worker = match AnalysisWorker::spawn(Arc::clone(&slot), Arc::clone(&engine), outcome_tx) {
            Ok(worker) => worker,
            Err(e) => {
                engine.release();
                return Err(InitError::Spawn(e.to_string()));
            }
        };

        let actuators = ActuatorController::new(
            haptics,
            alarm,
            settings.alert.haptic_interval,
            settings.alert.haptic_pulse,
        );
        let persister =
            EventPersister::new(&settings.user_id, Arc::clone(&store), Arc::clone(&notifier));
        let machine = AlertMachine::new(
            settings.alert.policy(),
            actuators,
            persister,
            Arc::clone(&notifier),
            settings.alert.resync_interval,
        );
        let camera = CameraController::new(
            camera,
            CameraConfig {
                facing: settings.camera.facing,
                rotation: settings.camera.display_rotation,
            },
            Arc::clone(&slot),
        );

        let closing = Arc::new(Mutex::new(false));
        let coordinator = Coordinator {
            machine,
            camera,
            listener,
            notifier,
            slot,
            worker_stats: worker.stats(),
            closing: Arc::clone(&closing),
        };
        let (command_tx, command_rx) = unbounded();
        let join = std::thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || coordinator.run(outcome_rx, command_rx));
        let join = match join {
            Ok(join) => join,
            Err(e) => {
                engine.release();
                return Err(InitError::Spawn(e.to_string()));
            }
        };

        log::info!(
            "pipeline open (user={}, engine={}, facing={})",
            settings.user_id,
            engine.name(),
            settings.camera.facing
        );
        Ok(Self {
            engine,
            worker,
            commands: command_tx,
            coordinator: Some(join),
            store,
            closing,
            closed: false,
        })
    }

    /// Flip facing and rebind. The facing stays flipped if binding fails.
    pub fn toggle_camera(&self) -> Result<Facing, BindingError> {
        let (reply, rx) = bounded(1);
        self.request(Command::ToggleCamera { reply }, rx)
            .map_err(|e| BindingError::Provider(e.to_string()))?
    }

    /// Bind again with the current facing after a binding failure.
    pub fn rebind(&self) -> Result<(), BindingError> {
        let (reply, rx) = bounded(1);
        self.request(Command::Rebind { reply }, rx)
            .map_err(|e| BindingError::Provider(e.to_string()))?
    }

    pub fn snapshot(&self) -> Result<PipelineSnapshot> {
        let (reply, rx) = bounded(1);
        self.request(Command::Snapshot { reply }, rx)
    }

    pub fn worker_stats(&self) -> Arc<WorkerStats> {
        self.worker.stats()
    }

    fn request<T>(&self, command: Command, reply: Receiver<T>) -> Result<T> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("pipeline is closed"))?;
        reply
            .recv()
            .map_err(|_| anyhow!("coordinator stopped before replying"))
    }

    /// Tear the pipeline down.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        log::info!("pipeline closing");

        // Waits out any step the coordinator is applying; outcomes still in
        // flight after this must not start a new alert.
        *self.closing.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.engine.release();
        self.worker.shutdown();

        // The coordinator cancels timers, releases the alarm and unbinds.
        let _ = self.commands.send(Command::Shutdown);
        if let Some(join) = self.coordinator.take() {
            if join.join().is_err() {
                log::error!("coordinator thread panicked");
            }
        }

        if let Err(e) = self.store.flush() {
            log::warn!("pending store writes not flushed: {}", e);
        }
        log::info!("pipeline closed");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Coordinator {
    machine: AlertMachine,
    camera: CameraController,
    listener: Box<dyn DetectorListener>,
    notifier: Arc<dyn Notifier>,
    slot: Arc<FrameSlot>,
    worker_stats: Arc<WorkerStats>,
    /// Held while an outcome or timer is applied.
    closing: Arc<Mutex<bool>>,
}

impl Coordinator {
    fn run(mut self, outcomes: Receiver<DetectionOutcome>, commands: Receiver<Command>) {
        if let Err(e) = self.camera.start() {
            self.binding_failed(&e);
        }

        let mut worker_alive = true;
        loop {
            let timer = match self.machine.next_deadline() {
                Some(deadline) if !self.is_closing() => at(deadline),
                _ => never(),
            };
            // Worker stopped; keep serving commands until shutdown.
            let incoming = if worker_alive { outcomes.clone() } else { never() };
            select! {
                recv(incoming) -> msg => match msg {
                    Ok(outcome) => self.on_outcome(outcome),
                    Err(_) => worker_alive = false,
                },
                recv(commands) -> msg => match msg {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => self.on_command(command),
                },
                recv(timer) -> _ => self.on_timer(),
            }
        }

        self.machine.shutdown();
        self.camera.unbind();
        log::debug!("coordinator stopped");
    }

    fn is_closing(&self) -> bool {
        *self.closing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_timer(&mut self) {
        let closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
        if !*closing {
            self.machine.on_timer(Instant::now());
        }
    }

    fn on_outcome(&mut self, outcome: DetectionOutcome) {
        let closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
        if *closing {
            log::debug!("discarding outcome received during teardown");
            return;
        }
        dispatch(self.listener.as_mut(), &outcome);
        let now = Instant::now();
        // Fire anything that came due while the outcome was queued.
        self.machine.on_timer(now);
        match self.machine.on_outcome(&outcome, now) {
            Transition::Entered | Transition::Exited => {
                log::debug!("alert state now {:?}", self.machine.state())
            }
            Transition::Refreshed | Transition::Unchanged => {}
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ToggleCamera { reply } => {
                let result = self.camera.toggle();
                if let Err(e) = &result {
                    self.binding_failed(e);
                }
                let _ = reply.send(result);
            }
            Command::Rebind { reply } => {
                let facing = self.camera.facing();
                let result = self.camera.rebind(facing);
                if let Err(e) = &result {
                    self.binding_failed(e);
                }
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(PipelineSnapshot {
                    alert: self.machine.state().clone(),
                    facing: self.camera.facing(),
                    bound: self.camera.is_bound(),
                    frames: self.slot.stats(),
                    analyzed: self.worker_stats.analyzed(),
                    events_issued: self.machine.persister().issued(),
                });
            }
            Command::Shutdown => {}
        }
    }

    fn binding_failed(&self, error: &BindingError) {
        self.notifier.notify(Notice::CameraBindingFailed {
            reason: error.to_string(),
        });
    }
}
