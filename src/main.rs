use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mediaput::config::{ConfigFile, DEFAULT_CONFIG_FILE};
use mediaput::{server, TransferEvent, Uploader};

#[derive(Parser)]
#[command(name = "mediaput")]
#[command(about = "Single-file media upload over TCP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the upload server
    Serve {
        #[arg(long, help = "Listen address (overrides config)")]
        listen: Option<String>,

        #[arg(long, help = "Upload directory (overrides config)")]
        storage: Option<PathBuf>,

        #[arg(long, help = "Runtime worker threads, 0 = one per core")]
        workers: Option<usize>,

        #[arg(long, help = "Cap the upload directory at this many bytes")]
        quota: Option<u64>,
    },
    /// Upload one file
    Upload {
        file: PathBuf,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long, help = "Seconds allowed for connect and each read/write")]
        timeout: Option<u64>,

        #[arg(long, help = "Output as JSON")]
        json: bool,
    },
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { output } => {
            ConfigFile::default().save(&output)?;
            println!("✅ Wrote default configuration to {}", output);
            Ok(())
        }
        Commands::Serve { listen, storage, workers, quota } => {
            init_logging("mediaput=info");
            let mut config = ConfigFile::load_or_create(cli.config.as_deref())?.server;

            if let Some(listen) = listen {
                config.listen_address = listen;
            }
            if let Some(storage) = storage {
                config.storage_directory = storage;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if quota.is_some() {
                config.quota_bytes = quota;
            }

            let threads = config.worker_threads();
            info!("Starting server with {} worker threads", threads);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .build()?;
            runtime.block_on(server::run(config))
        }
        Commands::Upload { file, host, port, timeout, json } => {
            init_logging("mediaput=warn");
            let mut config = ConfigFile::load(cli.config.as_deref())?.client;

            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(timeout) = timeout {
                config.timeout_secs = timeout;
            }

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(upload(config, file, json))
        }
    }
}

async fn upload(config: mediaput::ClientConfig, file: PathBuf, json: bool) -> anyhow::Result<()> {
    let bar = if json { ProgressBar::hidden() } else { ProgressBar::new(0) };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {bytes}/{total_bytes} {bytes_per_sec} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let progress = bar.clone();
    let mut uploader = Uploader::new(config).with_observer(move |event| match event {
        TransferEvent::Connected { address } => progress.set_message(format!("→ {}", address)),
        TransferEvent::Progress { sent, total } => {
            progress.set_length(*total);
            progress.set_position(*sent);
        }
        TransferEvent::Completed { .. } => progress.finish_and_clear(),
        TransferEvent::Failed { .. } => progress.abandon(),
    });

    match uploader.upload(&file).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::json!({
                    "success": true,
                    "file": report.path,
                    "bytes": report.bytes_sent,
                    "message": report.status.message,
                    "elapsed_ms": report.elapsed.as_millis() as u64,
                }));
            } else {
                println!("✅ File uploaded successfully ({} bytes in {:.2?})", report.bytes_sent, report.elapsed);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({"success": false, "error": e.to_string()}));
            } else {
                eprintln!("❌ Error: {}", e);
            }
            Err(e.into())
        }
    }
}
