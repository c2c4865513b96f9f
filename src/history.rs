//! Detection history: list and delete a user's stored events.

use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;

use crate::notify::{Notice, Notifier};
use crate::persist::{history_path, DetectionEvent};
use crate::store::{child_path, StoreClient};

const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// Every stored event for `user_id`, oldest first.
///
/// The child key is authoritative for `id`. Entries that do not parse as an
/// event are skipped with a warning.
pub fn list(store: &StoreClient, user_id: &str) -> Result<Vec<DetectionEvent>> {
    let children = store.read_children(&history_path(user_id))?;
    let mut events = Vec::with_capacity(children.len());
    for child in children {
        match serde_json::from_value::<DetectionEvent>(child.value) {
            Ok(mut event) => {
                event.id = child.key;
                events.push(event);
            }
            Err(e) => log::warn!("skipping unreadable history entry {}: {}", child.key, e),
        }
    }
    Ok(events)
}

/// Delete one event and wait for the store to confirm.
///
/// The outcome is also reported to `notifier`.
pub fn delete(store: &StoreClient, user_id: &str, id: &str, notifier: &dyn Notifier) -> Result<()> {
    let path = child_path(&history_path(user_id), id);
    let (tx, rx) = bounded(1);
    store.delete(
        &path,
        Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }),
    );

    let outcome = rx
        .recv_timeout(DELETE_TIMEOUT)
        .map_err(|_| anyhow!("no reply from store deleting {}", path))?;
    match outcome {
        Ok(()) => {
            notifier.notify(Notice::HistoryDeleted { id: id.to_string() });
            Ok(())
        }
        Err(e) => {
            notifier.notify(Notice::HistoryDeleteFailed {
                id: id.to_string(),
                reason: e.to_string(),
            });
            Err(anyhow!("failed to delete {}: {}", path, e))
        }
    }
}
