//! TCP accept loop.
//!
//! One tokio task per accepted connection, each running its own
//! [`Session`].  The only thing tasks share is the optional report sink.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::config::ServerConfig;
use crate::session::{Session, SessionReport};
use crate::size_policy::RandomSize;

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    reports: Option<mpsc::Sender<SessionReport>>,
    size_seed: Option<u64>,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.bind_ip, config.port)).await?;
        log::info!(
            "[server] listening on {} (max size {}, dynamic {})",
            listener.local_addr()?,
            config.maximum_msg_size,
            config.dynamic_message_size
        );
        Ok(Self {
            listener,
            config,
            reports: None,
            size_seed: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Deliver every finished session's report on `tx`.
    pub fn with_reports(mut self, tx: mpsc::Sender<SessionReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Seed the dynamic size chooser; connection `n` uses `seed + n`.
    pub fn with_size_seed(mut self, seed: u64) -> Self {
        self.size_seed = Some(seed);
        self
    }

    /// Accept connections forever.  Failed accepts are logged and skipped.
    pub async fn run(self) {
        let mut accepted = 0u64;
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("[server] accept failed: {e}");
                    continue;
                }
            };
            let channel = match Channel::new(stream) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("[server] cannot set up {addr}: {e}");
                    continue;
                }
            };
            log::info!("[server] new connection from {addr}");

            let mut session = Session::new(channel, &self.config);
            if let Some(seed) = self.size_seed {
                session = session.with_size_policy(RandomSize::seeded(seed.wrapping_add(accepted)));
            }
            accepted += 1;

            let reports = self.reports.clone();
            tokio::spawn(async move {
                let report = match session.run().await {
                    Ok(report) => report,
                    Err(_) => {
                        log::info!("[server] connection {addr} closed");
                        return;
                    }
                };
                if let Some(tx) = reports {
                    if tx.send(report).await.is_err() {
                        log::debug!("[server] report sink closed");
                    }
                }
            });
        }
    }
}
