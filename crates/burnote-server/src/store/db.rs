use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::model::{NewSecret, SecretId, SecretRecord};
use super::SecretStore;

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Leading byte of every encoded record, so the layout can evolve.
const RECORD_FORMAT_V1: u8 = 0x01;

/// Thread-safe handle to the redb store.
///
/// redb admits a single write transaction at a time, so every mutation below
/// (in particular `increment_and_fetch`) is a serialized read-modify-write.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl SecretStore for RedbStore {
    fn insert(&self, secret: NewSecret) -> Result<SecretId> {
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut table = write_txn.open_table(SECRETS)?;

            let mut id = super::generate_id();
            while table.get(id.as_str())?.is_some() {
                id = super::generate_id();
            }

            let record = SecretRecord::from_new(id.clone(), secret);
            let bytes = encode(&record)?;
            table.insert(id.as_str(), bytes.as_slice())?;
            id
        };
        write_txn.commit()?;

        debug!(id = %id, "stored secret");
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Option<SecretRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;

        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.as_deref().map(decode).transpose()
    }

    fn increment_and_fetch(&self, id: &str) -> Result<Option<u32>> {
        let write_txn = self.db.begin_write()?;
        let count = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Copy the bytes out so the AccessGuard (which borrows `table`)
            // is dropped before the insert.
            let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => None,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    record.view_count = record.view_count.saturating_add(1);
                    let updated = encode(&record)?;
                    table.insert(id, updated.as_slice())?;
                    Some(record.view_count)
                }
            }
        };
        write_txn.commit()?;
        Ok(count)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SECRETS)?;
            let existed = table.remove(id)?.is_some();
            existed
        };
        write_txn.commit()?;

        if existed {
            debug!(id = %id, "deleted secret");
        }
        Ok(existed)
    }

    fn sweep_expired(&self, now: i64) -> Result<Vec<SecretId>> {
        // Scan and remove inside one write transaction so a concurrent
        // reveal cannot interleave between the decision and the removal.
        let write_txn = self.db.begin_write()?;
        let expired = {
            let mut table = write_txn.open_table(SECRETS)?;

            let mut ids = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                let record = decode(v.value())?;
                if record.is_expired(now) {
                    ids.push(k.value().to_owned());
                }
            }

            for id in &ids {
                table.remove(id.as_str())?;
            }
            ids
        };
        write_txn.commit()?;

        if !expired.is_empty() {
            info!(removed = expired.len(), "swept expired secrets");
        }
        Ok(expired)
    }
}

/// Encode a record as `[RECORD_FORMAT_V1] + bincode(record)`.
fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_FORMAT_V1);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    match bytes.split_first() {
        None => anyhow::bail!("empty record"),
        Some((&RECORD_FORMAT_V1, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record format 0x{marker:02x}"),
    }
}
