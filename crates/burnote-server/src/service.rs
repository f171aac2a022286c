use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::SecretError;
use crate::store::{CryptoProvider, NewSecret, SecretId, SecretStore};

pub const DEFAULT_VIEW_LIMIT: u32 = 1;
pub const DEFAULT_TTL_MINUTES: u32 = 1440;

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Defaults applied when a create request omits (or garbles) its limits.
#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub default_view_limit: u32,
    pub default_ttl_minutes: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_view_limit: DEFAULT_VIEW_LIMIT,
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

/// Owns the create and reveal protocol over a `SecretStore` and a
/// `CryptoProvider`.
///
/// The service keeps no locks of its own. Concurrent reveals of the same id
/// are serialized solely by `SecretStore::increment_and_fetch`, and every
/// limit decision is made against the count that call returned.
#[derive(Clone)]
pub struct SecretService {
    store: Arc<dyn SecretStore>,
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl SecretService {
    pub fn new(
        store: Arc<dyn SecretStore>,
        crypto: Arc<dyn CryptoProvider>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_clock(store, crypto, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn SecretStore>,
        crypto: Arc<dyn CryptoProvider>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            crypto,
            clock,
            config,
        }
    }

    /// Encrypt `plaintext` and store it as a new record.
    ///
    /// A missing or non-positive `view_limit` / `ttl_minutes` falls back to
    /// the configured default.
    pub fn create(
        &self,
        plaintext: &str,
        view_limit: Option<i64>,
        ttl_minutes: Option<i64>,
    ) -> Result<SecretId, SecretError> {
        if plaintext.is_empty() {
            return Err(SecretError::validation(
                "please provide some text to encrypt",
            ));
        }

        let view_limit = positive_or(view_limit, self.config.default_view_limit);
        let ttl_minutes = positive_or(ttl_minutes, self.config.default_ttl_minutes);

        let now = self.clock.now();
        let expires_at = now + i64::from(ttl_minutes) * 60;

        let (ciphertext, nonce) = self
            .crypto
            .encrypt(plaintext.as_bytes())
            .context("encrypt secret")?;

        let id = self.store.insert(NewSecret {
            ciphertext,
            nonce,
            view_limit,
            created_at: now,
            expires_at,
        })?;

        info!(id = %id, view_limit, ttl_minutes, "secret created");
        Ok(id)
    }

    /// Read-and-consume: return the plaintext and spend one view.
    ///
    /// A consumed view is never given back, even if decryption then fails or
    /// the caller goes away.
    pub fn reveal(&self, id: &str) -> Result<String, SecretError> {
        let record = self.store.get(id)?.ok_or(SecretError::NotFound)?;

        if record.is_expired(self.clock.now()) {
            self.store.delete(id)?;
            debug!(id = %id, "lazy-evicted expired secret");
            return Err(SecretError::NotFound);
        }

        let count = self
            .store
            .increment_and_fetch(id)?
            .ok_or(SecretError::NotFound)?;

        if count > record.view_limit {
            self.store.delete(id)?;
            debug!(id = %id, count, "view budget already exhausted");
            return Err(SecretError::NotFound);
        }

        if count == record.view_limit {
            // Last permitted reader: the record goes before anything else can fail.
            self.store.delete(id)?;
            info!(id = %id, "secret burned after final view");
        }

        // The lookup snapshot may predate the deadline; the increment may not.
        if record.is_expired(self.clock.now()) {
            self.store.delete(id)?;
            debug!(id = %id, "secret expired while being revealed");
            return Err(SecretError::NotFound);
        }

        let plaintext = match self.crypto.decrypt(&record.ciphertext, &record.nonce) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(id = %id, error = %e, "decryption failed, view consumed");
                return Err(SecretError::Decryption);
            }
        };

        String::from_utf8(plaintext).map_err(|_| {
            warn!(id = %id, "decrypted secret is not valid UTF-8, view consumed");
            SecretError::Decryption
        })
    }

    /// Remove every record whose TTL has elapsed. Returns the removed ids.
    pub fn sweep(&self) -> Result<Vec<SecretId>, SecretError> {
        Ok(self.store.sweep_expired(self.clock.now())?)
    }

    /// Spawn a background Tokio task that calls `sweep()` every `interval`.
    /// Reads never depend on it; expiry is always re-checked on reveal.
    pub fn spawn_sweep(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep() {
                    warn!(error = %e, "background sweep error");
                }
            }
        })
    }
}

fn positive_or(value: Option<i64>, default: u32) -> u32 {
    value
        .filter(|v| *v > 0)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(default)
}
