// Meshchat - a peer-to-peer chat replication node
//
// Nodes flood user messages across a mesh of peers, deduplicate them by
// content, and guarantee eventual delivery with acknowledgements and a
// retry buffer.

pub mod config;
pub mod network;
pub mod storage;

// Initialize logging
pub fn init_logger() {
    env_logger::init();
}
