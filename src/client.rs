use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Take};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::protocol::{encode_size_header, ProtocolError, StatusCode, StatusResponse};

/// Notifications for whatever UI drives the uploader
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Connected { address: String },
    Progress { sent: u64, total: u64 },
    Completed { bytes: u64, message: String },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub path: PathBuf,
    pub bytes_sent: u64,
    pub status: StatusResponse,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum UploadError {
    /// Local file rejected before any network activity
    Validation(String),
    Connection(io::Error),
    Timeout(&'static str),
    Protocol(ProtocolError),
    Rejected { code: StatusCode, message: String },
    Io(io::Error),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Validation(msg) => write!(f, "{}", msg),
            UploadError::Connection(e) => write!(f, "connection failed: {}", e),
            UploadError::Timeout(what) => write!(f, "timed out while {}", what),
            UploadError::Protocol(e) => write!(f, "bad response: {}", e),
            UploadError::Rejected { code, message } => write!(f, "server error {}: {}", code, message),
            UploadError::Io(e) => write!(f, "reading local file: {}", e),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Connection(e) | UploadError::Io(e) => Some(e),
            UploadError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

type Observer = Box<dyn FnMut(&TransferEvent) + Send>;

/// Uploads one file per call over a fresh connection. No retries.
pub struct Uploader {
    config: ClientConfig,
    observer: Option<Observer>,
}

impl Uploader {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl FnMut(&TransferEvent) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn notify(&mut self, event: TransferEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }

    /// Extension and existence checks; returns the file size
    pub fn validate(&self, path: &Path) -> Result<u64, UploadError> {
        let required = self.config.required_extension.trim_start_matches('.');
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(required))
            .unwrap_or(false);
        if !matches {
            return Err(UploadError::Validation(format!(
                "file must be in {} format: {}",
                required,
                path.display()
            )));
        }

        let meta = std::fs::metadata(path)
            .map_err(|e| UploadError::Validation(format!("cannot read {}: {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(UploadError::Validation(format!("not a regular file: {}", path.display())));
        }
        Ok(meta.len())
    }

    pub async fn upload(&mut self, path: impl AsRef<Path>) -> Result<UploadReport, UploadError> {
        let result = self.send_file(path.as_ref()).await;
        match &result {
            Ok(report) => self.notify(TransferEvent::Completed {
                bytes: report.bytes_sent,
                message: report.status.message.clone(),
            }),
            Err(e) => self.notify(TransferEvent::Failed { reason: e.to_string() }),
        }
        result
    }

    async fn send_file(&mut self, path: &Path) -> Result<UploadReport, UploadError> {
        let size = self.validate(path)?;
        let file = File::open(path)
            .await
            .map_err(|e| UploadError::Validation(format!("cannot open {}: {}", path.display(), e)))?;

        let started = Instant::now();
        let timeout = self.config.timeout();
        let address = self.config.address();

        let mut stream = timed(timeout, "connecting", TcpStream::connect(&address)).await?;
        info!("Connected to {}", address);
        self.notify(TransferEvent::Connected { address });

        // Never send more than declared, even if the file grew since stat
        let mut body = file.take(size);
        let sent = match self.send_body(&mut stream, &mut body, size).await {
            Ok(sent) => sent,
            Err(UploadError::Connection(e)) => {
                // A refusing server answers before it closes; that answer
                // may still be readable behind the broken write.
                debug!("Send failed after connect: {}", e);
                return Err(match read_refusal(&mut stream, timeout).await {
                    Some(status) => UploadError::Rejected {
                        code: status.code,
                        message: status.message,
                    },
                    None => UploadError::Connection(e),
                });
            }
            Err(e) => return Err(e),
        };
        debug!("Body sent: {} of {} bytes", sent, size);

        let status = read_response(&mut stream, timeout).await?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                code: status.code,
                message: status.message,
            });
        }

        info!("Upload of {} finished: {}", path.display(), status.message);
        Ok(UploadReport {
            path: path.to_path_buf(),
            bytes_sent: sent,
            status,
            elapsed: started.elapsed(),
        })
    }

    /// Header then body in chunks; returns the body bytes written
    async fn send_body(
        &mut self,
        stream: &mut TcpStream,
        body: &mut Take<File>,
        size: u64,
    ) -> Result<u64, UploadError> {
        let timeout = self.config.timeout();
        timed(timeout, "sending size header", stream.write_all(&encode_size_header(size))).await?;

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut sent = 0u64;
        loop {
            let n = body.read(&mut buf).await.map_err(UploadError::Io)?;
            if n == 0 {
                break;
            }
            timed(timeout, "sending body", stream.write_all(&buf[..n])).await?;
            sent += n as u64;
            self.notify(TransferEvent::Progress { sent, total: size });
        }
        timed(timeout, "sending body", stream.flush()).await?;
        Ok(sent)
    }
}

/// The one 16-byte status read
async fn read_response(stream: &mut TcpStream, timeout: Duration) -> Result<StatusResponse, UploadError> {
    let mut raw = [0u8; StatusResponse::WIRE_SIZE];
    timed(timeout, "waiting for response", stream.read_exact(&mut raw)).await?;
    StatusResponse::decode(&raw).map_err(UploadError::Protocol)
}

/// Status left behind by a server that stopped reading; only non-success counts
async fn read_refusal(stream: &mut TcpStream, timeout: Duration) -> Option<StatusResponse> {
    match read_response(stream, timeout).await {
        Ok(status) if !status.is_success() => Some(status),
        _ => None,
    }
}

/// Apply the client timeout to one socket operation
async fn timed<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, UploadError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(UploadError::Connection),
        Err(_) => Err(UploadError::Timeout(what)),
    }
}
