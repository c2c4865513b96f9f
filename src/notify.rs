//! Transient user notices (toast-style).

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Alert entered; carries the recorded class name.
    BehaviorDetected { class: String },
    PersistenceFailed { reason: String },
    HistoryDeleted { id: String },
    HistoryDeleteFailed { id: String, reason: String },
    CameraBindingFailed { reason: String },
}

/// Sink for notices. Called from the coordination thread and from the store
/// thread's completion callbacks, hence `Sync`.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::BehaviorDetected { class } => log::warn!("behaviour detected: {}", class),
            Notice::PersistenceFailed { reason } => {
                log::warn!("detection event not saved: {}", reason)
            }
            Notice::HistoryDeleted { id } => log::info!("history entry {} deleted", id),
            Notice::HistoryDeleteFailed { id, reason } => {
                log::warn!("history entry {} not deleted: {}", id, reason)
            }
            Notice::CameraBindingFailed { reason } => log::error!("camera unavailable: {}", reason),
        }
    }
}

/// Keeps every notice; handy for tests and for UIs that drain a queue.
#[derive(Clone, Debug, Default)]
pub struct CollectingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}
