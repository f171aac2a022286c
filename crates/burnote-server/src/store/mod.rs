pub mod crypto;
pub mod db;
pub mod memory;
pub mod model;

use anyhow::Result;
use rand::Rng;

pub use crypto::{ChaChaCrypto, CryptoProvider, EncryptionKey};
pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{NewSecret, SecretId, SecretRecord};

/// Keyed persistence for secret records.
///
/// `increment_and_fetch` is the serialization point of the reveal protocol:
/// for a given id, concurrent calls (from any thread or process sharing the
/// backend) must observe a strict total order of returned counts with no
/// duplicates.
pub trait SecretStore: Send + Sync {
    /// Persist a new record with `view_count = 0` and return its id.
    fn insert(&self, secret: NewSecret) -> Result<SecretId>;

    /// Read a record without mutating it.
    fn get(&self, id: &str) -> Result<Option<SecretRecord>>;

    /// Atomically increment `view_count` and return the post-increment value.
    /// Returns `None` if the record does not exist.
    fn increment_and_fetch(&self, id: &str) -> Result<Option<u32>>;

    /// Remove a record. Idempotent; returns whether something was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every record whose TTL has elapsed at `now`. Returns the removed ids.
    fn sweep_expired(&self, now: i64) -> Result<Vec<SecretId>>;
}

/// Generate a random 128-bit record id as 32 lowercase hex chars.
pub fn generate_id() -> SecretId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}
