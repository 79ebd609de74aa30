use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use structopt::StructOpt;
use tokio::time::interval;

use meshchat::config::Config;
use meshchat::init_logger;
use meshchat::network::Node;
use meshchat::storage::{MessageLedger, RocksDBStore};

#[derive(Debug, StructOpt)]
#[structopt(name = "meshchat", about = "Peer-to-peer chat replication node")]
struct Opt {
    /// Configuration file
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Node name, used as the sender identity
    #[structopt(long)]
    name: Option<String>,

    /// Listen address
    #[structopt(long)]
    listen_addr: Option<String>,

    /// Listen port
    #[structopt(long)]
    port: Option<u16>,

    /// Static peers in host:port form, comma separated
    #[structopt(long)]
    peers: Option<String>,

    /// Data directory
    #[structopt(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize logger
    init_logger();

    let opt = Opt::from_args();

    let mut config = match &opt.config {
        Some(path) => Config::load(path).expect("Failed to load config"),
        None => Config::default(),
    };

    // Command line arguments override the config file
    if let Some(name) = opt.name {
        config.node.node_name = name;
    }
    if let Some(addr) = opt.listen_addr {
        config.network.listen_addr = addr;
    }
    if let Some(port) = opt.port {
        config.network.listen_port = port;
    }
    if let Some(peers) = opt.peers {
        config.network.static_peers = peers
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }
    if let Some(data_dir) = opt.data_dir {
        config.node.data_dir = data_dir;
    }

    info!("Starting meshchat node {}...", config.node.node_name);

    // Initialize storage
    let db_path = config
        .storage
        .ledger_path(&config.node.data_dir, &config.node.node_name);
    if !db_path.exists() {
        std::fs::create_dir_all(&db_path).expect("Failed to create data directory");
    }

    info!("Initializing storage at {:?}...", db_path);
    let store = Arc::new(RocksDBStore::new(&db_path).expect("Failed to initialize RocksDB"));
    let ledger = Arc::new(MessageLedger::open(store).expect("Failed to open message ledger"));

    // Start the node
    let node = Node::start(
        config.node.node_name.clone(),
        config.network.clone(),
        ledger.clone(),
    )
    .await
    .expect("Failed to start node");

    // Tail newly ledgered messages into the log, the same incremental
    // read a display front end would do
    let tail = ledger.clone();
    tokio::spawn(async move {
        let mut cursor = tail.latest_id();
        let mut ticker = interval(Duration::from_millis(500));

        loop {
            ticker.tick().await;
            match tail.list_since(cursor) {
                Ok(records) => {
                    for record in records {
                        info!("[{}] {}: {}", record.timestamp, record.sender, record.content);
                        cursor = record.id;
                    }
                }
                Err(e) => error!("Failed to read new messages: {}", e),
            }
        }
    });

    info!("Meshchat node started successfully");

    // Keep the main task alive until interrupted
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c");
    info!("Shutting down meshchat node...");
    node.shutdown();
}
