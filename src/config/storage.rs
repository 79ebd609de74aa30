use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit database path; when unset the ledger lives under
    /// `<data_dir>/<node_name>/db`
    pub db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: None }
    }
}

impl StorageConfig {
    /// Resolve the ledger database path for this node
    pub fn ledger_path(&self, data_dir: &str, node_name: &str) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(data_dir).join(node_name).join("db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_path_defaults_to_per_node_directory() {
        let config = StorageConfig::default();
        assert_eq!(
            config.ledger_path("./data", "alice"),
            PathBuf::from("./data/alice/db")
        );
    }

    #[test]
    fn test_explicit_db_path_wins() {
        let config = StorageConfig {
            db_path: Some("/var/lib/meshchat/db".to_string()),
        };
        assert_eq!(
            config.ledger_path("./data", "alice"),
            PathBuf::from("/var/lib/meshchat/db")
        );
    }
}
