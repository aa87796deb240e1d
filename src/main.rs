//! WebSocket Protobuf Proxy Command Line Tool
//!
//! This binary is the command-line interface for WebSocket Protobuf Proxy.

use std::path::Path;

use clap::Parser;
use log::{info, warn};

use ws_protobuf_proxy::common::{init_logger, parse_socket_addr, Result};
use ws_protobuf_proxy::config::{ConfigLoader, ConfigMerger, ConfigValidator, ProxyConfig};
use ws_protobuf_proxy::{Proxy, APP_NAME, VERSION};

/// WebSocket Protobuf Proxy: JSON over WebSocket in front of a protobuf TCP backend
///
/// Settings are applied in order: defaults, configuration file,
/// `WS_PROTO_PROXY_*` environment variables, command line.
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Listen address [default: 0.0.0.0:8080]
    #[clap(short, long)]
    listen: Option<String>,

    /// Backend service address [default: 127.0.0.1:9000]
    #[clap(short, long)]
    backend: Option<String>,

    /// Log level [default: info]
    #[clap(long)]
    log_level: Option<String>,

    /// Backend read buffer size in bytes, i.e. the largest backend message
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Backend connect timeout in seconds
    #[clap(long)]
    connection_timeout: Option<u64>,

    /// Upgrade handshake timeout in milliseconds
    #[clap(long)]
    handshake_timeout: Option<u64>,

    /// Allowed Origin header value; repeat for several, omit to allow all
    #[clap(long = "allowed-origin")]
    allowed_origins: Vec<String>,

    /// Load configuration from a JSON file
    #[clap(long)]
    config_file: Option<String>,
}

impl Args {
    /// Overlay the flags that were given onto `config`
    fn apply(&self, mut config: ProxyConfig) -> Result<ProxyConfig> {
        if let Some(listen) = &self.listen {
            config.listen = parse_socket_addr(listen)?;
        }
        if let Some(backend) = &self.backend {
            config.backend = parse_socket_addr(backend)?;
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(connection_timeout) = self.connection_timeout {
            config.connection_timeout = connection_timeout;
        }
        if let Some(handshake_timeout) = self.handshake_timeout {
            config.handshake_timeout = handshake_timeout;
        }
        if !self.allowed_origins.is_empty() {
            config.allowed_origins = self.allowed_origins.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ProxyConfig::default();

    let mut missing_file = None;
    if let Some(config_file) = &args.config_file {
        if Path::new(config_file).exists() {
            config = config.merge(ProxyConfig::from_file(config_file)?);
        } else {
            missing_file = Some(config_file);
        }
    }

    config = config.merge(ProxyConfig::from_env()?);
    let config = args.apply(config)?;

    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);
    match (&args.config_file, missing_file) {
        (_, Some(path)) => warn!("Configuration file not found: {}", path),
        (Some(path), None) => info!("Loaded configuration from file: {}", path),
        (None, None) => {}
    }

    config.validate()?;

    info!("Listen address: {}", config.listen);
    info!("Backend service: {}", config.backend);
    if !config.allowed_origins.is_empty() {
        info!("Allowed origins: {}", config.allowed_origins.join(", "));
    }

    info!("Proxy service ready, press Ctrl+C to stop");

    Proxy::new(config).run().await
}
