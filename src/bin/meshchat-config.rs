use std::path::PathBuf;

use log::{error, info};
use structopt::StructOpt;

use meshchat::config::Config;
use meshchat::init_logger;

#[derive(Debug, StructOpt)]
#[structopt(name = "meshchat-config", about = "Meshchat configuration tool")]
struct Opt {
    /// Generate a default configuration
    #[structopt(long)]
    generate: bool,

    /// Output file
    #[structopt(long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Input file
    #[structopt(long, parse(from_os_str))]
    input: Option<PathBuf>,

    /// Node name
    #[structopt(long)]
    node_name: Option<String>,

    /// Data directory
    #[structopt(long)]
    data_dir: Option<String>,

    /// Listen address
    #[structopt(long)]
    listen_addr: Option<String>,

    /// Listen port
    #[structopt(long)]
    listen_port: Option<u16>,

    /// Static peers in host:port form, comma separated
    #[structopt(long)]
    peers: Option<String>,

    /// Announcement interval in seconds
    #[structopt(long)]
    announce_interval: Option<u64>,

    /// Retry-sweep interval in seconds
    #[structopt(long)]
    retry_interval: Option<u64>,

    /// Peer liveness timeout in seconds
    #[structopt(long)]
    liveness_timeout: Option<u64>,

    /// Maximum delivery attempts per pending message
    #[structopt(long)]
    max_send_attempts: Option<u32>,
}

fn main() {
    // Initialize logger
    init_logger();

    let opt = Opt::from_args();

    if opt.generate {
        let mut config = Config::default();

        // Update config with command line arguments
        if let Some(node_name) = opt.node_name {
            config.node.node_name = node_name;
        }

        if let Some(data_dir) = opt.data_dir {
            config.node.data_dir = data_dir;
        }

        if let Some(listen_addr) = opt.listen_addr {
            config.network.listen_addr = listen_addr;
        }

        if let Some(listen_port) = opt.listen_port {
            config.network.listen_port = listen_port;
        }

        if let Some(peers) = opt.peers {
            config.network.static_peers = peers
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }

        if let Some(announce_interval) = opt.announce_interval {
            config.network.announce_interval = announce_interval;
        }

        if let Some(retry_interval) = opt.retry_interval {
            config.network.retry_interval = retry_interval;
        }

        if let Some(liveness_timeout) = opt.liveness_timeout {
            config.network.liveness_timeout = liveness_timeout;
        }

        if let Some(max_send_attempts) = opt.max_send_attempts {
            config.network.max_send_attempts = Some(max_send_attempts);
        }

        // Save the configuration
        if let Some(output) = opt.output {
            match config.save(&output) {
                Ok(_) => {
                    info!("Configuration saved to {:?}", output);
                }
                Err(e) => {
                    error!("Failed to save configuration: {}", e);
                    std::process::exit(1);
                }
            }
        } else {
            // Print the configuration to stdout
            match toml::to_string_pretty(&config) {
                Ok(config_str) => {
                    println!("{}", config_str);
                }
                Err(e) => {
                    error!("Failed to serialize configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
    } else if let Some(input) = opt.input {
        // Load the configuration
        match Config::load(&input) {
            Ok(config) => match toml::to_string_pretty(&config) {
                Ok(config_str) => {
                    println!("{}", config_str);
                }
                Err(e) => {
                    error!("Failed to serialize configuration: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        // Print help
        Opt::clap().print_help().expect("Failed to print help");
        println!();
    }
}
