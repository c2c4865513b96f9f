//! Detection event persistence.
//!
//! Every trigger (alert entry, each resync tick) builds a fresh
//! `DetectionEvent` with a new store key and new timestamps, and writes it to
//! `history/{userId}/{key}`. Writes are fire-and-forget; a failure is logged
//! and surfaced as a notice, never retried, and never feeds back into alerting.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::notify::{Notice, Notifier};
use crate::store::{new_child, StoreClient};

pub const HISTORY_ROOT: &str = "history";

pub fn history_path(user_id: &str) -> String {
    format!("{}/{}", HISTORY_ROOT, user_id)
}

/// One persisted alert record. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "cls")]
    pub class: String,
    pub created_at: String,
    pub updated_at: String,
}

impl DetectionEvent {
    pub fn new(id: String, user_id: &str, class: &str) -> Self {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id,
            user_id: user_id.to_string(),
            class: class.to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

pub struct EventPersister {
    user_id: String,
    store: Arc<StoreClient>,
    notifier: Arc<dyn Notifier>,
    last_event: Option<DetectionEvent>,
    issued: u64,
}

impl EventPersister {
    pub fn new(user_id: &str, store: Arc<StoreClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            user_id: user_id.to_string(),
            store,
            notifier,
            last_event: None,
            issued: 0,
        }
    }

    /// Build a new event for `class` and issue its write.
    ///
    /// Errors only when the event could not be built (no key, not encodable);
    /// the write outcome arrives later through the completion callback.
    pub fn persist(&mut self, class: &str) -> Result<DetectionEvent, PersistenceError> {
        self.issue(class).map_err(|e| {
            log::error!("detection event not built: {}", e);
            self.notifier.notify(Notice::PersistenceFailed {
                reason: e.to_string(),
            });
            e
        })
    }

    fn issue(&mut self, class: &str) -> Result<DetectionEvent, PersistenceError> {
        let parent = history_path(&self.user_id);
        let (key, path) = new_child(&self.store, &parent)?;
        let event = DetectionEvent::new(key, &self.user_id, class);
        let value =
            serde_json::to_value(&event).map_err(|e| PersistenceError::Encode(e.to_string()))?;

        let notifier = Arc::clone(&self.notifier);
        let id = event.id.clone();
        self.store.write(
            &path,
            value,
            Box::new(move |outcome| match outcome {
                Ok(()) => log::info!("detection event {} stored", id),
                Err(e) => {
                    log::warn!("detection event {} failed to store: {}", id, e);
                    notifier.notify(Notice::PersistenceFailed {
                        reason: e.to_string(),
                    });
                }
            }),
        );

        self.issued += 1;
        self.last_event = Some(event.clone());
        Ok(event)
    }

    /// Most recently built event (the resync payload template).
    pub fn last_event(&self) -> Option<&DetectionEvent> {
        self.last_event.as_ref()
    }

    /// Number of writes issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingNotifier;
    use crate::store::MemoryStore;

    fn persister(store: &MemoryStore) -> (EventPersister, CollectingNotifier, Arc<StoreClient>) {
        let client = Arc::new(StoreClient::start(store.clone()).unwrap());
        let notifier = CollectingNotifier::new();
        let persister = EventPersister::new("driver-1", Arc::clone(&client), Arc::new(notifier.clone()));
        (persister, notifier, client)
    }

    #[test]
    fn event_serializes_with_store_field_names() {
        let event = DetectionEvent::new("-Nabc".into(), "driver-1", "distracted");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["id"], "-Nabc");
        assert_eq!(value["userId"], "driver-1");
        assert_eq!(value["cls"], "distracted");
        assert_eq!(value["createdAt"], value["updatedAt"]);
    }

    #[test]
    fn each_persist_writes_a_new_record_under_the_user() {
        let store = MemoryStore::new();
        let (mut persister, notifier, client) = persister(&store);

        let first = persister.persist("distracted").unwrap();
        let second = persister.persist("distracted").unwrap();
        client.flush().unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.len(), 2);
        let stored = store
            .get(&format!("history/driver-1/{}", first.id))
            .expect("first event stored");
        assert_eq!(stored["cls"], "distracted");
        assert_eq!(persister.issued(), 2);
        assert_eq!(persister.last_event(), Some(&second));
        assert!(notifier.notices().is_empty());
    }

    #[test]
    fn write_failure_is_surfaced_as_a_notice() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let (mut persister, notifier, client) = persister(&store);

        persister.persist("distracted").unwrap();
        client.flush().unwrap();

        assert!(store.is_empty());
        assert!(matches!(
            notifier.notices().as_slice(),
            [Notice::PersistenceFailed { .. }]
        ));
    }

    #[test]
    fn key_generation_failure_is_surfaced_as_a_notice() {
        let store = MemoryStore::new();
        let client = Arc::new(StoreClient::start(store).unwrap());
        let notifier = CollectingNotifier::new();
        let mut persister = EventPersister::new("bad.user", client, Arc::new(notifier.clone()));
        assert!(matches!(
            persister.persist("distracted"),
            Err(PersistenceError::KeyGeneration(_))
        ));
        assert_eq!(persister.issued(), 0);
        assert!(persister.last_event().is_none());
        assert!(matches!(
            notifier.notices().as_slice(),
            [Notice::PersistenceFailed { .. }]
        ));
    }
}
