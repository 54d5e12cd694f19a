//! Single-file media upload over raw TCP.
//!
//! Wire format: a 32-byte big-endian size header, the body, then a 16-byte
//! status response from the server. One file and one response per connection.

pub mod client;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod utils;

pub use client::{TransferEvent, UploadError, UploadReport, Uploader};
pub use config::{ClientConfig, ConfigFile, ServerConfig};
pub use server::Listener;
pub use session::{Phase, Session, SessionReport};
pub use storage::{Capacity, LocalStorage, StorageTarget};
