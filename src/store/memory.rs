use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{validate_path, ChildSnapshot, RemoteStore};

/// In-memory store. Clones share the same data, so a test can keep one clone
/// and hand the other to a `StoreClient`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    nodes: Arc<Mutex<BTreeMap<String, Value>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (simulates an unreachable backend).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

impl RemoteStore for MemoryStore {
    fn write(&mut self, path: &str, value: &Value) -> Result<()> {
        validate_path(path)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("store unreachable"));
        }
        self.lock().insert(path.to_string(), value.clone());
        Ok(())
    }

    fn read_children(&mut self, path: &str) -> Result<Vec<ChildSnapshot>> {
        validate_path(path)?;
        let prefix = format!("{}/", path);
        Ok(self
            .lock()
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, v)| {
                let key = &p[prefix.len()..];
                (!key.contains('/')).then(|| ChildSnapshot {
                    key: key.to_string(),
                    value: v.clone(),
                })
            })
            .collect())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        validate_path(path)?;
        let prefix = format!("{}/", path);
        self.lock()
            .retain(|p, _| p != path && !p.starts_with(&prefix));
        Ok(())
    }
}
