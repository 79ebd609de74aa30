use serde::{Deserialize, Serialize};

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, used as the sender identity for locally authored messages
    pub node_name: String,

    /// Data directory
    pub data_dir: String,

    /// Log level
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "meshchat-node".to_string(),
            data_dir: "./data/meshchat".to_string(),
            log_level: "info".to_string(),
        }
    }
}
