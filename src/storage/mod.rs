// Storage module for meshchat
// Provides persistent storage for the append-only message ledger

pub mod kv_store;
pub mod ledger;

// Re-export main components
pub use kv_store::{KVStore, KVStoreError, RocksDBStore};
pub use ledger::{LedgerError, MessageLedger, MessageRecord};
