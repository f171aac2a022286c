use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use tracing::{debug, info};

use super::model::{NewSecret, SecretId, SecretRecord};
use super::SecretStore;

/// Process-local store. Every operation runs under one mutex, which makes
/// `increment_and_fetch` a serialized read-modify-write. Records are lost on
/// restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<SecretId, SecretRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SecretId, SecretRecord>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl SecretStore for MemoryStore {
    fn insert(&self, secret: NewSecret) -> Result<SecretId> {
        let mut map = self.lock()?;
        let mut id = super::generate_id();
        while map.contains_key(&id) {
            id = super::generate_id();
        }
        map.insert(id.clone(), SecretRecord::from_new(id.clone(), secret));
        debug!(id = %id, "stored secret");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<SecretRecord>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn increment_and_fetch(&self, id: &str) -> Result<Option<u32>> {
        let mut map = self.lock()?;
        Ok(map.get_mut(id).map(|record| {
            record.view_count = record.view_count.saturating_add(1);
            record.view_count
        }))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.lock()?.remove(id).is_some();
        if existed {
            debug!(id = %id, "deleted secret");
        }
        Ok(existed)
    }

    fn sweep_expired(&self, now: i64) -> Result<Vec<SecretId>> {
        let mut map = self.lock()?;
        let expired: Vec<SecretId> = map
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            map.remove(id);
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), "swept expired secrets");
        }
        Ok(expired)
    }
}
