//! Entry point for `gbn-transfer`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, configuration, argument parsing).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use gbn_transfer::client;
use gbn_transfer::config::{self, ClientConfig, ConfigMap, ServerConfig};
use gbn_transfer::server::Server;
use gbn_transfer::session::SessionReport;

/// Config file the server picks up when `--config` is not given.
const DEFAULT_SERVER_CONFIG: &str = "server_config.txt";

/// Reliable single-file transfer with a Go-Back-N sliding window.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, receiving one file per connection.
    Server {
        /// `key: value` config file (default: ./server_config.txt if present).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Local address to bind.
        #[arg(long)]
        bind_ip: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Maximum payload size announced during negotiation.
        #[arg(long)]
        max_size: Option<usize>,
        /// Send a new random size directive with every ack.
        #[arg(long, overrides_with = "no_dynamic")]
        dynamic: bool,
        /// Keep the size fixed even if the config file enables directives.
        #[arg(long, overrides_with = "dynamic")]
        no_dynamic: bool,
        /// Seconds allowed for each handshake and negotiation read.
        #[arg(long)]
        handshake_timeout: Option<f64>,
    },
    /// Run as a client, sending one message or file.
    Client {
        /// `key: value` config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        server_ip: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Requested maximum payload size.
        #[arg(long)]
        max_size: Option<usize>,
        #[arg(short, long)]
        window_size: Option<usize>,
        /// Seconds to wait for an ack before resending the window.
        #[arg(short, long)]
        timeout: Option<f64>,
        /// Follow the server's size directives.
        #[arg(long, overrides_with = "no_dynamic")]
        dynamic: bool,
        /// Ignore size directives even if the config file enables them.
        #[arg(long, overrides_with = "dynamic")]
        no_dynamic: bool,
        /// Inline text to send.
        #[arg(short, long, conflicts_with = "message_file")]
        message: Option<String>,
        /// File whose bytes are sent.
        #[arg(short = 'f', long)]
        message_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            config,
            bind_ip,
            port,
            max_size,
            dynamic,
            no_dynamic,
            handshake_timeout,
        } => {
            let mut map = match config {
                Some(path) => config::read_file(&path)?,
                None if Path::new(DEFAULT_SERVER_CONFIG).exists() => {
                    config::read_file(Path::new(DEFAULT_SERVER_CONFIG))?
                }
                None => ConfigMap::new(),
            };
            set(&mut map, "bind_ip", bind_ip);
            set(&mut map, "port", port);
            set(&mut map, "maximum_msg_size", max_size);
            set(&mut map, "dynamic_message_size", dynamic_flag(dynamic, no_dynamic));
            set(&mut map, "handshake_timeout", handshake_timeout);
            let config = ServerConfig::from_map(&map).context("invalid server configuration")?;

            run_server(config).await
        }
        Mode::Client {
            config,
            server_ip,
            port,
            max_size,
            window_size,
            timeout,
            dynamic,
            no_dynamic,
            message,
            message_file,
        } => {
            let mut map = match config {
                Some(path) => config::read_file(&path)?,
                None => ConfigMap::new(),
            };
            set(&mut map, "server_ip", server_ip);
            set(&mut map, "server_port", port);
            set(&mut map, "maximum_msg_size", max_size);
            set(&mut map, "window_size", window_size);
            set(&mut map, "timeout", timeout);
            set(&mut map, "dynamic_message_size", dynamic_flag(dynamic, no_dynamic));
            if let Some(text) = message {
                map.remove("message_file");
                map.insert("message".into(), text);
            }
            if let Some(path) = message_file {
                map.insert("message_file".into(), path.display().to_string());
            }
            let config = ClientConfig::from_map(&map).context("invalid client configuration")?;

            let report = client::run(&config).await?;
            log::info!(
                "Sent {} chunk(s) ({} frame(s), {} timeout(s), {} resize(s))",
                report.chunks,
                report.frames_sent,
                report.timeouts,
                report.resizes
            );
            Ok(())
        }
    }
}

/// Override a file setting with a command-line value.
fn set<T: ToString>(map: &mut ConfigMap, key: &str, value: Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.to_string());
    }
}

/// `--dynamic` / `--no-dynamic`, whichever came last; neither keeps the file value.
fn dynamic_flag(dynamic: bool, no_dynamic: bool) -> Option<bool> {
    match (dynamic, no_dynamic) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<SessionReport>(16);
    let server = Server::bind(config)
        .await
        .context("cannot bind listening socket")?
        .with_reports(tx);

    tokio::spawn(server.run());

    while let Some(report) = rx.recv().await {
        let outcome = &report.outcome;
        if outcome.is_complete() {
            log::info!("[{}] full message received ({} bytes):", report.peer, outcome.data.len());
        } else {
            log::warn!(
                "[{}] connection ended early, message may be incomplete: {:?}",
                report.peer,
                outcome.status
            );
        }
        println!("{}", String::from_utf8_lossy(&outcome.data));
    }
    Ok(())
}
