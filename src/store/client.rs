use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::Value;

use crate::error::PersistenceError;

use super::keys::PushKeyGenerator;
use super::{child_path, validate_path, ChildSnapshot, RemoteStore};

/// Completion callback for a write or delete. Runs on the store thread.
pub type Completion = Box<dyn FnOnce(Result<(), PersistenceError>) + Send>;

enum StoreCmd {
    Write {
        path: String,
        value: Value,
        done: Completion,
    },
    Delete {
        path: String,
        done: Completion,
    },
    ReadChildren {
        path: String,
        reply: Sender<Result<Vec<ChildSnapshot>>>,
    },
    Flush {
        reply: Sender<()>,
    },
    Shutdown,
}

#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub writes_ok: AtomicU64,
    pub writes_failed: AtomicU64,
    pub deletes_ok: AtomicU64,
    pub deletes_failed: AtomicU64,
}

impl StoreMetrics {
    pub fn writes_ok(&self) -> u64 {
        self.writes_ok.load(Ordering::Relaxed)
    }

    pub fn writes_failed(&self) -> u64 {
        self.writes_failed.load(Ordering::Relaxed)
    }
}

/// Client for a `RemoteStore` owned by a dedicated thread.
///
/// Writes and deletes are fire-and-forget: they return immediately and
/// report through their completion callback. Nothing is retried. Commands run
/// in submission order; `shutdown` drains whatever is queued, then joins.
pub struct StoreClient {
    tx: Sender<StoreCmd>,
    keys: Mutex<PushKeyGenerator>,
    metrics: Arc<StoreMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StoreClient {
    pub fn start<S: RemoteStore + 'static>(store: S) -> Result<Self> {
        let (tx, rx) = unbounded();
        let metrics = Arc::new(StoreMetrics::default());
        let worker_metrics = Arc::clone(&metrics);
        let worker = std::thread::Builder::new()
            .name("event-store".to_string())
            .spawn(move || run(store, rx, worker_metrics))
            .map_err(|e| anyhow!("failed to spawn store thread: {}", e))?;
        Ok(Self {
            tx,
            keys: Mutex::new(PushKeyGenerator::new()),
            metrics,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// New unique child key under `path`. Generated locally; no round trip.
    pub fn generate_key(&self, path: &str) -> Result<String, PersistenceError> {
        validate_path(path).map_err(|_| PersistenceError::KeyGeneration(path.to_string()))?;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| PersistenceError::KeyGeneration(path.to_string()))?
            .as_millis() as u64;
        let key = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_key(now_ms);
        Ok(key)
    }

    pub fn write(&self, path: &str, value: Value, done: Completion) {
        let cmd = StoreCmd::Write {
            path: path.to_string(),
            value,
            done,
        };
        if let Err(rejected) = self.tx.send(cmd) {
            if let StoreCmd::Write { done, .. } = rejected.into_inner() {
                done(Err(PersistenceError::Write("store client closed".into())));
            }
        }
    }

    pub fn delete(&self, path: &str, done: Completion) {
        let cmd = StoreCmd::Delete {
            path: path.to_string(),
            done,
        };
        if let Err(rejected) = self.tx.send(cmd) {
            if let StoreCmd::Delete { done, .. } = rejected.into_inner() {
                done(Err(PersistenceError::Write("store client closed".into())));
            }
        }
    }

    /// Snapshot of the children of `path`, after every previously queued command.
    pub fn read_children(&self, path: &str) -> Result<Vec<ChildSnapshot>> {
        let (reply, rx) = bounded(1);
        self.tx
            .send(StoreCmd::ReadChildren {
                path: path.to_string(),
                reply,
            })
            .map_err(|_| anyhow!("store client closed"))?;
        rx.recv().map_err(|_| anyhow!("store thread exited"))?
    }

    /// Block until every queued command has completed.
    pub fn flush(&self) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.tx
            .send(StoreCmd::Flush { reply })
            .map_err(|_| anyhow!("store client closed"))?;
        rx.recv().map_err(|_| anyhow!("store thread exited"))
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Drain queued commands and stop the store thread. Idempotent.
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = self.tx.send(StoreCmd::Shutdown);
            if handle.join().is_err() {
                log::error!("store thread panicked");
            }
        }
    }
}

impl Drop for StoreClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Path of a new child of `parent` with a freshly generated key.
pub(crate) fn new_child(client: &StoreClient, parent: &str) -> Result<(String, String), PersistenceError> {
    let key = client.generate_key(parent)?;
    let path = child_path(parent, &key);
    Ok((key, path))
}

fn run<S: RemoteStore>(mut store: S, rx: Receiver<StoreCmd>, metrics: Arc<StoreMetrics>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            StoreCmd::Write { path, value, done } => match store.write(&path, &value) {
                Ok(()) => {
                    metrics.writes_ok.fetch_add(1, Ordering::Relaxed);
                    done(Ok(()));
                }
                Err(e) => {
                    metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
                    done(Err(PersistenceError::Write(e.to_string())));
                }
            },
            StoreCmd::Delete { path, done } => match store.delete(&path) {
                Ok(()) => {
                    metrics.deletes_ok.fetch_add(1, Ordering::Relaxed);
                    done(Ok(()));
                }
                Err(e) => {
                    metrics.deletes_failed.fetch_add(1, Ordering::Relaxed);
                    done(Err(PersistenceError::Write(e.to_string())));
                }
            },
            StoreCmd::ReadChildren { path, reply } => {
                let _ = reply.send(store.read_children(&path));
            }
            StoreCmd::Flush { reply } => {
                let _ = reply.send(());
            }
            StoreCmd::Shutdown => break,
        }
    }
    log::debug!("store thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn recorder() -> (Completion, Receiver<Result<(), PersistenceError>>) {
        let (tx, rx) = unbounded();
        (
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
            rx,
        )
    }

    #[test]
    fn writes_complete_in_order_and_are_readable() -> Result<()> {
        let store = MemoryStore::new();
        let client = StoreClient::start(store.clone())?;
        let (done, outcomes) = recorder();
        client.write("history/u1/k1", json!({"cls": "distracted"}), done);

        let children = client.read_children("history/u1")?;
        assert_eq!(children.len(), 1);
        assert!(outcomes.recv()?.is_ok());
        assert_eq!(client.metrics().writes_ok(), 1);
        Ok(())
    }

    #[test]
    fn failed_write_is_reported_not_retried() -> Result<()> {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let client = StoreClient::start(store.clone())?;
        let (done, outcomes) = recorder();
        client.write("history/u1/k1", json!(1), done);
        client.flush()?;

        assert!(matches!(outcomes.recv()?, Err(PersistenceError::Write(_))));
        assert_eq!(client.metrics().writes_failed(), 1);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn shutdown_drains_queue_and_rejects_later_writes() -> Result<()> {
        let store = MemoryStore::new();
        let client = StoreClient::start(store.clone())?;
        for i in 0..5 {
            client.write(&format!("history/u1/k{}", i), json!(i), Box::new(|_| {}));
        }
        client.shutdown();
        assert_eq!(store.len(), 5);

        let (done, outcomes) = recorder();
        client.write("history/u1/late", json!(0), done);
        assert!(outcomes.recv()?.is_err());
        client.shutdown();
        Ok(())
    }

    #[test]
    fn generated_keys_are_unique_and_path_checked() {
        let client = StoreClient::start(MemoryStore::new()).unwrap();
        let a = client.generate_key("history/u1").unwrap();
        let b = client.generate_key("history/u1").unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            client.generate_key("history//u1"),
            Err(PersistenceError::KeyGeneration(_))
        ));
    }
}
