//! Alert state machine.
//!
//! Consumes one detection outcome at a time on the coordination thread and
//! decides Idle vs Alerting. Entry engages the actuators, persists one event
//! and arms the resync timer; exit disengages and cancels, without persisting.
//! While alerting, later batches only refresh the current classification.
//!
//! Time is passed in explicitly. The owner sleeps until `next_deadline` and
//! then calls `on_timer`.

mod periodic;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuator::ActuatorController;
use crate::detect::DetectionOutcome;
use crate::notify::{Notice, Notifier};
use crate::persist::EventPersister;

pub use periodic::PeriodicTask;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Alerting { classification: String },
}

impl AlertState {
    pub fn is_alerting(&self) -> bool {
        matches!(self, AlertState::Alerting { .. })
    }

    pub fn classification(&self) -> Option<&str> {
        match self {
            AlertState::Alerting { classification } => Some(classification.as_str()),
            AlertState::Idle => None,
        }
    }
}

/// Which labels raise an alert and what class name gets recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelPolicy {
    /// Labels that qualify as alert-worthy.
    pub monitored: Vec<String>,
    /// Recorded instead of the monitored label when it is present in the same batch.
    pub preferred: Option<String>,
    /// Label -> recorded class name. Missing labels are recorded as-is.
    pub class_names: HashMap<String, String>,
}

impl LabelPolicy {
    pub fn new(monitored: Vec<String>) -> Self {
        Self {
            monitored,
            preferred: None,
            class_names: HashMap::new(),
        }
    }

    pub fn is_monitored(&self, label: &str) -> bool {
        self.monitored.iter().any(|m| m == label)
    }

    /// Class name for a batch, or `None` when no monitored label is present.
    pub fn classify(&self, labels: &[&str]) -> Option<String> {
        let first_monitored = labels.iter().find(|l| self.is_monitored(l))?;
        let chosen = match &self.preferred {
            Some(p) if labels.iter().any(|l| l == p) => p.as_str(),
            _ => *first_monitored,
        };
        Some(
            self.class_names
                .get(chosen)
                .cloned()
                .unwrap_or_else(|| chosen.to_string()),
        )
    }
}

/// Effect of one outcome on the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Entered,
    Refreshed,
    Exited,
    Unchanged,
}

pub struct AlertMachine {
    policy: LabelPolicy,
    state: AlertState,
    actuators: ActuatorController,
    persister: EventPersister,
    notifier: Arc<dyn Notifier>,
    resync: PeriodicTask,
    shut_down: bool,
}

impl AlertMachine {
    pub fn new(
        policy: LabelPolicy,
        actuators: ActuatorController,
        persister: EventPersister,
        notifier: Arc<dyn Notifier>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            policy,
            state: AlertState::Idle,
            actuators,
            persister,
            notifier,
            resync: PeriodicTask::new(resync_interval),
            shut_down: false,
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn persister(&self) -> &EventPersister {
        &self.persister
    }

    /// Apply one detection outcome.
    pub fn on_outcome(&mut self, outcome: &DetectionOutcome, now: Instant) -> Transition {
        if self.shut_down {
            return Transition::Unchanged;
        }
        let target = self.policy.classify(&outcome.labels());
        match (target, self.state.is_alerting()) {
            (Some(classification), false) => {
                self.enter(classification, now);
                Transition::Entered
            }
            (Some(classification), true) => {
                self.state = AlertState::Alerting { classification };
                Transition::Refreshed
            }
            (None, true) => {
                self.exit();
                Transition::Exited
            }
            (None, false) => Transition::Unchanged,
        }
    }

    fn enter(&mut self, classification: String, now: Instant) {
        log::info!("alert: entering ({})", classification);
        self.actuators.engage(now);
        self.persist(&classification);
        self.notifier.notify(Notice::BehaviorDetected {
            class: classification.clone(),
        });
        self.resync.start_delayed(now);
        self.state = AlertState::Alerting { classification };
    }

    fn exit(&mut self) {
        log::info!("alert: cleared");
        self.actuators.disengage();
        self.resync.cancel();
        self.state = AlertState::Idle;
    }

    fn persist(&mut self, classification: &str) {
        // The persister reports its own failures; alerting carries on.
        if let Err(e) = self.persister.persist(classification) {
            log::debug!("alert: continuing without event ({})", e);
        }
    }

    /// Run whatever timers are due at `now`.
    pub fn on_timer(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }
        self.actuators.poll(now);
        if self.resync.poll(now) {
            if let AlertState::Alerting { classification } = &self.state {
                let classification = classification.clone();
                log::debug!("alert: resync ({})", classification);
                self.persist(&classification);
            }
        }
    }

    /// Earliest instant at which `on_timer` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.actuators.next_deadline(), self.resync.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Cancel both timers, then release the alarm. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.resync.cancel();
        self.actuators.disengage();
        self.actuators.release();
    }
}
