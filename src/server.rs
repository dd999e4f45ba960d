// TCP listener and connection lifecycle

use crate::config::ServerConfig;
use crate::connection;
use crate::store::MessageStore;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// The connection multiplexer: accepts sockets, runs one task per
/// connection, and honors the external shutdown signal.
pub struct Server {
    listener: TcpListener,
    store: Arc<MessageStore>,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Bind the listening socket. Failure here is fatal to the process;
    /// everything after this point is contained per connection.
    pub async fn bind(config: ServerConfig, store: Arc<MessageStore>) -> Result<Self> {
        let addr = SocketAddr::new(config.listen_addr, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Self {
            listener,
            store,
            config: Arc::new(config),
        })
    }

    /// The address actually bound, useful when the port was 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept and serve connections until the shutdown signal flips.
    ///
    /// On shutdown the listener stops accepting at once; in-flight
    /// connections get a bounded grace period to flush, then the rest are
    /// aborted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("listening on {}", addr);

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("accepted connection from {}", peer);
                            connections.spawn(connection::serve(
                                stream,
                                peer,
                                self.store.clone(),
                                self.config.clone(),
                            ));
                        }
                        Err(e) => tracing::error!("accept error: {}", e),
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request too
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        drop(self.listener);
        let in_flight = connections.len();
        if in_flight > 0 {
            tracing::info!("shutting down, draining {} connections", in_flight);
            let drain = async {
                while connections.join_next().await.is_some() {}
            };
            if tokio::time::timeout(self.config.shutdown_grace, drain)
                .await
                .is_err()
            {
                tracing::warn!("grace period expired, aborting remaining connections");
                connections.shutdown().await;
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}
