use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::fmt;
use std::io::Error;
use std::path::Path;

/// Custom error type for KVStore operations
#[derive(Debug)]
pub enum KVStoreError {
    /// IO error
    IoError(Error),
    /// RocksDB error
    RocksDBError(String),
    /// Batch operation failed
    BatchOperationFailed(String),
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IoError(err) => write!(f, "IO error: {}", err),
            KVStoreError::RocksDBError(err) => write!(f, "RocksDB error: {}", err),
            KVStoreError::BatchOperationFailed(msg) => write!(f, "Batch operation failed: {}", msg),
        }
    }
}

impl std::error::Error for KVStoreError {}

impl From<Error> for KVStoreError {
    fn from(err: Error) -> Self {
        KVStoreError::IoError(err)
    }
}

impl From<rocksdb::Error> for KVStoreError {
    fn from(err: rocksdb::Error) -> Self {
        KVStoreError::RocksDBError(err.to_string())
    }
}

/// Key-value store trait
pub trait KVStore: Send + Sync {
    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// Write several key-value pairs atomically
    fn put_batch(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), KVStoreError>;

    /// Iterate over key-value pairs with a prefix
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;

    /// Iterate over key-value pairs with a prefix, starting at the given key
    fn scan_from(&self, start: &[u8], prefix: &[u8])
        -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;

    /// Flush any pending writes to disk
    fn flush(&self) -> Result<(), KVStoreError>;
}

/// RocksDB implementation of KVStore
pub struct RocksDBStore {
    /// RocksDB instance
    db: DB,
}

impl RocksDBStore {
    /// Create a new RocksDBStore
    pub fn new(path: &Path) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to open RocksDB: {}", e)))?;
        Ok(Self { db })
    }

    /// Create a new RocksDBStore with custom options
    pub fn with_options(path: &Path, options: Options) -> Result<Self, KVStoreError> {
        let db = DB::open(&options, path)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to open RocksDB: {}", e)))?;
        Ok(Self { db })
    }
}

impl KVStore for RocksDBStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.db
            .put(key, value)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to put key: {}", e)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db
            .get(key)
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to get key: {}", e)))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        match self.db.get(key)? {
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    fn put_batch(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();

        for (key, value) in pairs {
            batch.put(&key, &value);
        }

        self.db
            .write(batch)
            .map_err(|e| KVStoreError::BatchOperationFailed(format!("Failed to write batch: {}", e)))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        self.scan_from(prefix, prefix)
    }

    fn scan_from(
        &self,
        start: &[u8],
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let mut results = Vec::new();
        let iterator = self
            .db
            .iterator(IteratorMode::From(start, Direction::Forward));

        for item in iterator {
            let (key, value) =
                item.map_err(|e| KVStoreError::RocksDBError(format!("Failed to iterate: {}", e)))?;

            // Check if key starts with prefix
            if key.starts_with(prefix) {
                results.push((key.to_vec(), value.to_vec()));
            } else {
                // We've moved past the prefix
                break;
            }
        }

        Ok(results)
    }

    fn flush(&self) -> Result<(), KVStoreError> {
        self.db
            .flush()
            .map_err(|e| KVStoreError::RocksDBError(format!("Failed to flush: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_basic_operations() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::new(temp_dir.path()).unwrap();

        // Test put and get
        let key = b"test_key";
        let value = b"test_value";
        store.put(key, value).unwrap();

        let result = store.get(key).unwrap();
        assert_eq!(result, Some(value.to_vec()));

        // Test exists
        assert!(store.exists(key).unwrap());
        assert!(!store.exists(b"nonexistent_key").unwrap());
    }

    #[test]
    fn test_batch_operations() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::new(temp_dir.path()).unwrap();

        let batch = vec![
            (b"key1".to_vec(), b"value1".to_vec()),
            (b"key2".to_vec(), b"value2".to_vec()),
            (b"key3".to_vec(), b"value3".to_vec()),
        ];

        store.put_batch(batch).unwrap();

        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key2").unwrap(), Some(b"value2".to_vec()));
        assert_eq!(store.get(b"key3").unwrap(), Some(b"value3".to_vec()));
    }

    #[test]
    fn test_scan_prefix() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::new(temp_dir.path()).unwrap();

        // Insert some keys with a common prefix
        store.put(b"prefix:1", b"value1").unwrap();
        store.put(b"prefix:2", b"value2").unwrap();
        store.put(b"prefix:3", b"value3").unwrap();
        store.put(b"other:1", b"other1").unwrap();

        let results = store.scan_prefix(b"prefix:").unwrap();

        // Should find 3 keys with the prefix
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, b"prefix:1".to_vec());
        assert_eq!(results[2].1, b"value3".to_vec());
    }

    #[test]
    fn test_scan_from_skips_earlier_keys() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::new(temp_dir.path()).unwrap();

        store.put(b"prefix:1", b"value1").unwrap();
        store.put(b"prefix:2", b"value2").unwrap();
        store.put(b"prefix:3", b"value3").unwrap();

        let results = store.scan_from(b"prefix:2", b"prefix:").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, b"prefix:2".to_vec());
        assert_eq!(results[1].0, b"prefix:3".to_vec());
    }
}
