use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mediaput::metrics::MetricsCollector;
use mediaput::protocol::{encode_size_header, StatusCode, StatusResponse};
use mediaput::{ClientConfig, Listener, LocalStorage, ServerConfig, StorageTarget, UploadError, Uploader};

struct TestServer {
    addr: SocketAddr,
    storage_dir: TempDir,
    storage: Arc<LocalStorage>,
    metrics: Arc<MetricsCollector>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    async fn start(quota: Option<u64>) -> Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter("mediaput=debug")
            .try_init()
            .ok();

        let storage_dir = tempfile::tempdir()?;
        let config = ServerConfig {
            listen_address: "127.0.0.1:0".to_string(),
            storage_directory: storage_dir.path().to_path_buf(),
            quota_bytes: quota,
            ..Default::default()
        };
        let storage = Arc::new(
            LocalStorage::new(config.storage_directory.clone(), "mp4").with_quota(quota),
        );

        let listener = Listener::bind(&config, storage.clone()).await?;
        let addr = listener.local_addr()?;
        let metrics = listener.metrics();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(listener.serve_until(async {
            let _ = rx.await;
        }));

        Ok(Self {
            addr,
            storage_dir,
            storage,
            metrics,
            shutdown: Some(tx),
            handle,
        })
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn stored_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.storage_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    async fn wait_for_files(&self, count: usize) {
        for _ in 0..200 {
            if self.stored_files().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} destination files, found {}", count, self.stored_files().len());
    }

    async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await?
    }
}

fn media_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

/// Send a header and raw body bytes, half-close, and collect whatever comes back
async fn raw_upload(addr: SocketAddr, declared: u64, body: &[u8]) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&encode_size_header(declared)).await?;
    stream.write_all(body).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(reply)
}

#[tokio::test]
async fn upload_stores_exact_bytes() -> Result<()> {
    let server = TestServer::start(None).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "clip.mp4", 10_000);

    let report = Uploader::new(server.client_config()).upload(&path).await?;
    assert_eq!(report.bytes_sent, 10_000);
    assert_eq!(report.status.message, "OK 10000");

    let files = server.stored_files();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0])?, std::fs::read(&path)?);
    assert_eq!(files[0].extension().unwrap(), "mp4");

    server.stop().await
}

#[tokio::test]
async fn progress_events_cover_every_chunk() -> Result<()> {
    use mediaput::TransferEvent;
    use std::sync::Mutex;

    let server = TestServer::start(None).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "clip.MP4", 3_000);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut uploader = Uploader::new(server.client_config())
        .with_observer(move |e| sink.lock().unwrap().push(e.clone()));
    uploader.upload(&path).await?;

    let events = events.lock().unwrap();
    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress { sent, total } => {
                assert_eq!(*total, 3_000);
                Some(*sent)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1400, 2800, 3000]);
    assert!(matches!(events.first(), Some(TransferEvent::Connected { .. })));
    assert!(matches!(events.last(), Some(TransferEvent::Completed { bytes: 3_000, .. })));

    drop(events);
    server.stop().await
}

#[tokio::test]
async fn zero_byte_upload_succeeds() -> Result<()> {
    let server = TestServer::start(None).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "empty.mp4", 0);

    let report = Uploader::new(server.client_config()).upload(&path).await?;
    assert_eq!(report.status.message, "OK 0");

    let files = server.stored_files();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::metadata(&files[0])?.len(), 0);

    server.stop().await
}

#[tokio::test]
async fn oversized_upload_is_refused_without_a_file() -> Result<()> {
    let server = TestServer::start(Some(100)).await?;
    let used_before = server.storage.capacity()?.used;

    let reply = raw_upload(server.addr, 500, &[]).await?;
    let status = StatusResponse::decode(&reply)?;
    assert_eq!(reply.len(), 16);
    assert_eq!(status.code, StatusCode::InsufficientStorage);
    assert_eq!(status.message, "No space left");

    assert!(server.stored_files().is_empty());
    assert_eq!(server.storage.capacity()?.used, used_before);

    server.stop().await
}

// The server refuses right after the header and closes while the client is
// still pushing a body far larger than the socket buffers.
#[tokio::test]
async fn uploader_reports_refusal_for_large_file() -> Result<()> {
    let server = TestServer::start(Some(100)).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "big.mp4", 8_000_000);

    let err = Uploader::new(server.client_config()).upload(&path).await.unwrap_err();
    match err {
        UploadError::Rejected { code, message } => {
            assert_eq!(code, StatusCode::InsufficientStorage);
            assert_eq!(message, "No space left");
        }
        other => panic!("expected a refusal, got {:?}", other),
    }
    assert!(server.stored_files().is_empty());

    server.stop().await
}

#[tokio::test]
async fn oversized_declared_size_against_real_volume() -> Result<()> {
    let server = TestServer::start(None).await?;

    let reply = raw_upload(server.addr, u64::MAX, &[]).await?;
    assert_eq!(StatusResponse::decode(&reply)?.code, StatusCode::InsufficientStorage);
    assert!(server.stored_files().is_empty());

    server.stop().await
}

#[tokio::test]
async fn wrong_extension_never_connects() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "clip.mov", 10);

    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..Default::default()
    };
    let err = Uploader::new(config).upload(&path).await.unwrap_err();
    assert!(matches!(err, UploadError::Validation(_)));

    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "no connection may be opened for a rejected file");
    Ok(())
}

// Early disconnect is treated as completion: the reply cites the bytes that
// actually arrived and the partial file is kept.
#[tokio::test]
async fn early_disconnect_reports_partial_count() -> Result<()> {
    let server = TestServer::start(None).await?;

    let reply = raw_upload(server.addr, 1_000, &[7u8; 300]).await?;
    let status = StatusResponse::decode(&reply)?;
    assert!(status.is_success());
    assert_eq!(status.message, "OK 300");

    let files = server.stored_files();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0])?, vec![7u8; 300]);

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn short_header_gets_internal_error() -> Result<()> {
    let server = TestServer::start(None).await?;

    let mut stream = TcpStream::connect(server.addr).await?;
    stream.write_all(&[0u8; 12]).await?;
    stream.shutdown().await?;
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;

    let status = StatusResponse::decode(&reply)?;
    assert_eq!(status.code, StatusCode::InternalError);
    assert!(server.stored_files().is_empty());

    server.stop().await
}

// Capacity is checked without reservation: two uploads that each fit the
// quota both pass the check and together overshoot it.
#[tokio::test]
async fn concurrent_uploads_can_jointly_exceed_quota() -> Result<()> {
    let server = TestServer::start(Some(1_000)).await?;

    let mut a = TcpStream::connect(server.addr).await?;
    let mut b = TcpStream::connect(server.addr).await?;
    a.write_all(&encode_size_header(600)).await?;
    b.write_all(&encode_size_header(600)).await?;

    // A destination file only exists once its session passed the check
    server.wait_for_files(2).await;

    for s in [&mut a, &mut b] {
        s.write_all(&[1u8; 600]).await?;
        s.shutdown().await?;
    }
    for s in [&mut a, &mut b] {
        let mut reply = Vec::new();
        s.read_to_end(&mut reply).await?;
        let status = StatusResponse::decode(&reply)?;
        assert!(status.is_success());
        assert_eq!(status.message, "OK 600");
    }

    let cap = server.storage.capacity()?;
    assert_eq!(cap.used, 1_200);
    assert_eq!(cap.free, 0);

    // Once the overshoot is on disk, later uploads are refused
    let reply = raw_upload(server.addr, 1, &[]).await?;
    assert_eq!(StatusResponse::decode(&reply)?.code, StatusCode::InsufficientStorage);

    server.stop().await
}

#[tokio::test]
async fn stalled_client_does_not_block_others() -> Result<()> {
    let server = TestServer::start(None).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "clip.mp4", 2_048);

    // Declares a body it never sends
    let mut stalled = TcpStream::connect(server.addr).await?;
    stalled.write_all(&encode_size_header(1 << 20)).await?;
    server.wait_for_files(1).await;

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Uploader::new(server.client_config()).upload(&path),
    )
    .await??;
    assert_eq!(report.status.message, "OK 2048");

    drop(stalled);
    server.stop().await
}

#[tokio::test]
async fn each_session_gets_its_own_file() -> Result<()> {
    let server = TestServer::start(None).await?;
    let src = tempfile::tempdir()?;
    let path = media_file(src.path(), "clip.mp4", 512);

    for _ in 0..3 {
        Uploader::new(server.client_config()).upload(&path).await?;
    }
    assert_eq!(server.stored_files().len(), 3);

    let metrics = server.metrics.get_metrics();
    assert_eq!(metrics.uploads_completed, 3);
    assert_eq!(metrics.bytes_received, 3 * 512);

    server.stop().await
}
