//! Message ledger for meshchat
//!
//! The ledger is the append-only record of every message this node has
//! accepted. Replication consults it to decide whether an inbound message
//! was already seen; display front ends read it incrementally through
//! `list_since`.

use std::sync::{Arc, Mutex};

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::kv_store::{KVStore, KVStoreError};

/// Key prefix for records ordered by id
const ID_PREFIX: &str = "msg:id:";

/// Key prefix for the content-addressed dedup index
const DEDUP_PREFIX: &str = "msg:dedup:";

/// Error types for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Key-value store error
    #[error("KV store error: {0}")]
    Store(#[from] KVStoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A single accepted message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// Monotonic id, assigned at acceptance
    pub id: u64,

    /// Server-assigned timestamp, "%Y-%m-%d %H:%M:%S"
    pub timestamp: String,

    /// Sender identity
    pub sender: String,

    /// Message text
    pub content: String,
}

/// Append-only store of accepted messages with a content-addressed
/// dedup index on `(sender, content)`
pub struct MessageLedger {
    /// The underlying key-value store
    store: Arc<dyn KVStore>,

    /// Serializes check-then-record and id assignment; holds the last
    /// assigned id
    last_id: Mutex<u64>,
}

impl MessageLedger {
    /// Open a ledger over the given store, recovering the id counter
    /// from the highest persisted record
    pub fn open(store: Arc<dyn KVStore>) -> Result<Self, LedgerError> {
        let rows = store.scan_prefix(ID_PREFIX.as_bytes())?;
        let last_id = match rows.last() {
            Some((_, value)) => Self::decode(value)?.id,
            None => 0,
        };

        debug!("Opened message ledger at id {}", last_id);

        Ok(Self {
            store,
            last_id: Mutex::new(last_id),
        })
    }

    /// True if the `(sender, content)` pair was previously recorded
    pub fn exists(&self, sender: &str, content: &str) -> Result<bool, LedgerError> {
        Ok(self.store.exists(&Self::dedup_key(sender, content))?)
    }

    /// Persist the pair with a server-assigned timestamp and the next id
    pub fn record(&self, sender: &str, content: &str) -> Result<MessageRecord, LedgerError> {
        let mut last_id = self.last_id.lock().unwrap();
        self.append(&mut last_id, sender, content)
    }

    /// Check-then-record as one atomic unit. Returns `None` when the pair
    /// is already in the ledger; two concurrent callers with the same pair
    /// cannot both succeed.
    pub fn record_if_new(
        &self,
        sender: &str,
        content: &str,
    ) -> Result<Option<MessageRecord>, LedgerError> {
        let mut last_id = self.last_id.lock().unwrap();

        if self.store.exists(&Self::dedup_key(sender, content))? {
            return Ok(None);
        }

        Ok(Some(self.append(&mut last_id, sender, content)?))
    }

    /// Records with id greater than `cursor`, ordered by id. A consumer
    /// that remembers the last id it saw can resume from there after a
    /// restart.
    pub fn list_since(&self, cursor: u64) -> Result<Vec<MessageRecord>, LedgerError> {
        let start = Self::id_key(cursor.saturating_add(1));
        let rows = self.store.scan_from(&start, ID_PREFIX.as_bytes())?;

        rows.iter().map(|(_, value)| Self::decode(value)).collect()
    }

    /// The highest id assigned so far; 0 for an empty ledger
    pub fn latest_id(&self) -> u64 {
        *self.last_id.lock().unwrap()
    }

    fn append(
        &self,
        last_id: &mut u64,
        sender: &str,
        content: &str,
    ) -> Result<MessageRecord, LedgerError> {
        let record = MessageRecord {
            id: *last_id + 1,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
        };

        let value =
            bincode::serialize(&record).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let id_bytes = record.id.to_be_bytes().to_vec();

        // Record and dedup index land atomically; a failure leaves the
        // message unaccepted.
        self.store.put_batch(vec![
            (Self::id_key(record.id), value),
            (Self::dedup_key(sender, content), id_bytes),
        ])?;

        *last_id = record.id;
        Ok(record)
    }

    fn decode(value: &[u8]) -> Result<MessageRecord, LedgerError> {
        bincode::deserialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    fn id_key(id: u64) -> Vec<u8> {
        format!("{}{:020}", ID_PREFIX, id).into_bytes()
    }

    fn dedup_key(sender: &str, content: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        format!("{}{}", DEDUP_PREFIX, hex::encode(hasher.finalize())).into_bytes()
    }
}
