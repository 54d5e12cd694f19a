use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::metrics::MetricsCollector;
use crate::protocol::{read_size_header, write_status, StatusCode, StatusResponse};
use crate::storage::StorageTarget;

/// Connection phases, strictly in this order. Any phase may fall through
/// to `ErrorResponding`. A session ends in `Responding` or `ErrorResponding`;
/// once `run` returns its `SessionReport` the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSize,
    CheckingSpace,
    ReceivingBody,
    Responding,
    ErrorResponding,
}

/// Per-connection upload state; never shared between connections
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,
    pub peer: String,
    pub declared_size: u64,
    pub received: u64,
    pub destination: Option<PathBuf>,
    pub started: Instant,
}

impl UploadSession {
    pub fn new(peer: impl Into<String>) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            peer: peer.into(),
            declared_size: 0,
            received: 0,
            destination: None,
            started: Instant::now(),
        }
    }
}

/// What a finished session leaves behind
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub upload: UploadSession,
    /// Status actually delivered; `None` when the peer was no longer writable
    pub sent: Option<StatusCode>,
    /// `Responding` or `ErrorResponding`
    pub terminal_phase: Phase,
    pub elapsed: Duration,
}

pub struct Session<T> {
    stream: T,
    storage: Arc<dyn StorageTarget>,
    chunk_size: usize,
    metrics: Option<Arc<MetricsCollector>>,
    upload: UploadSession,
    phase: Phase,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Session<T> {
    pub fn new(
        stream: T,
        peer: impl Into<String>,
        storage: Arc<dyn StorageTarget>,
        chunk_size: usize,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            stream,
            storage,
            chunk_size: chunk_size.max(1),
            metrics,
            upload: UploadSession::new(peer),
            phase: Phase::AwaitingSize,
        }
    }

    pub fn id(&self) -> &str {
        &self.upload.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the connection to completion. Exactly one status is attempted;
    /// faults never escape as errors.
    pub async fn run(mut self) -> SessionReport {
        info!("[{}] Connected by {}", self.upload.id, self.upload.peer);

        let response = match self.drive().await {
            Ok(status) => {
                self.phase = Phase::Responding;
                status
            }
            Err(e) => {
                error!("[{}] Error in {:?}: {:#}", self.upload.id, self.phase, e);
                self.phase = Phase::ErrorResponding;
                StatusResponse::internal_error()
            }
        };

        self.respond(response).await
    }

    /// Walk the phases in order until one of them settles the reply
    async fn drive(&mut self) -> anyhow::Result<StatusResponse> {
        self.await_size().await?;

        self.enter(Phase::CheckingSpace);
        if let Some(refusal) = self.check_space()? {
            return Ok(refusal);
        }

        self.enter(Phase::ReceivingBody);
        self.receive_body().await
    }

    fn enter(&mut self, next: Phase) {
        debug!("[{}] {:?} -> {:?}", self.upload.id, self.phase, next);
        self.phase = next;
    }

    async fn await_size(&mut self) -> anyhow::Result<()> {
        let declared = read_size_header(&mut self.stream)
            .await
            .context("reading size header")?;
        self.upload.declared_size = declared;
        info!("[{}] File size: {} bytes", self.upload.id, declared);
        Ok(())
    }

    /// `Some` carries the refusal to send instead of receiving the body
    fn check_space(&mut self) -> anyhow::Result<Option<StatusResponse>> {
        let cap = self.storage.capacity()?;
        info!(
            "[{}] Disk space: total={} used={} free={}",
            self.upload.id, cap.total, cap.used, cap.free
        );

        if cap.free < self.upload.declared_size {
            warn!(
                "[{}] Rejecting upload: {} bytes declared, {} free",
                self.upload.id, self.upload.declared_size, cap.free
            );
            return Ok(Some(StatusResponse::insufficient_storage()));
        }
        Ok(None)
    }

    async fn receive_body(&mut self) -> anyhow::Result<StatusResponse> {
        let (path, mut file) = self.storage.create_destination(&self.upload.id).await?;
        self.upload.destination = Some(path);

        let declared = self.upload.declared_size;
        let mut buf = vec![0u8; self.chunk_size];

        // Ends on declared size OR peer EOF; both count as completion
        while self.upload.received < declared {
            let want = (declared - self.upload.received).min(buf.len() as u64) as usize;
            let n = self
                .stream
                .read(&mut buf[..want])
                .await
                .context("reading body")?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await.context("writing body")?;
            self.upload.received += n as u64;
        }
        file.flush().await.context("flushing destination")?;

        let received = self.upload.received;
        if let Some(metrics) = &self.metrics {
            metrics.record_bytes(received);
        }
        if received < declared {
            warn!(
                "[{}] Peer closed early: {} of {} bytes",
                self.upload.id, received, declared
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_short_transfer();
            }
        }
        info!(
            "[{}] File received: {} bytes in {:.2?}",
            self.upload.id,
            received,
            self.upload.started.elapsed()
        );

        Ok(StatusResponse::success(received))
    }

    async fn respond(mut self, status: StatusResponse) -> SessionReport {
        // Counted before the peer can see the reply
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(status.code);
        }

        let sent = match write_status(&mut self.stream, &status).await {
            Ok(()) => {
                info!("[{}] Sent status {} {:?}", self.upload.id, status.code, status.message);
                Some(status.code)
            }
            Err(e) => {
                debug!("[{}] Peer not writable, status dropped: {}", self.upload.id, e);
                None
            }
        };
        let _ = self.stream.shutdown().await;

        SessionReport {
            elapsed: self.upload.started.elapsed(),
            upload: self.upload,
            sent,
            terminal_phase: self.phase,
        }
    }
}
