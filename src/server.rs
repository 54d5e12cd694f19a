use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::metrics::MetricsCollector;
use crate::session::Session;
use crate::storage::{LocalStorage, StorageTarget};

/// One listening socket; every accepted connection gets its own task.
///
/// Shutdown stops accepting but does not drain in-flight sessions, so a
/// transfer cut off by process exit can leave a partial file behind.
pub struct Listener {
    listener: TcpListener,
    storage: Arc<dyn StorageTarget>,
    chunk_size: usize,
    metrics: Arc<MetricsCollector>,
}

impl Listener {
    pub async fn bind(config: &ServerConfig, storage: Arc<dyn StorageTarget>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen_address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            storage,
            chunk_size: config.chunk_size,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Serve until Ctrl-C
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    pub async fn serve_until<F: Future<Output = ()>>(self, shutdown: F) -> anyhow::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => self.dispatch(socket, peer),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        let snapshot = self.metrics.get_metrics();
        if snapshot.active_connections > 0 {
            warn!("{} sessions still in flight at shutdown", snapshot.active_connections);
        }
        info!("Final metrics: {}", serde_json::to_string(&snapshot)?);
        Ok(())
    }

    fn dispatch(&self, socket: tokio::net::TcpStream, peer: SocketAddr) {
        self.metrics.connection_opened();

        let storage = Arc::clone(&self.storage);
        let metrics = Arc::clone(&self.metrics);
        let chunk_size = self.chunk_size;

        tokio::spawn(async move {
            let session = Session::new(socket, peer.to_string(), storage, chunk_size, Some(Arc::clone(&metrics)));
            let report = session.run().await;
            info!(
                "Session {} for {} closed after {:.2?} ({}/{} bytes)",
                report.upload.id, peer, report.elapsed, report.upload.received, report.upload.declared_size
            );
            metrics.connection_closed();
        });
    }
}

/// Build the configured storage target and serve on it until Ctrl-C
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.ensure_directories()?;

    let storage = LocalStorage::new(config.storage_directory.clone(), config.file_extension.clone())
        .with_quota(config.quota_bytes);
    if let Some(quota) = config.quota_bytes {
        info!("Storage quota: {} bytes", quota);
    }
    info!("Storing uploads in {:?}", storage.root());

    let listener = Listener::bind(&config, Arc::new(storage)).await?;
    listener.serve().await
}
