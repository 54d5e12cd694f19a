//! Wire constants for the mediaput upload protocol

/// Default server port
pub const DEFAULT_PORT: u16 = 65432;

/// Size header: declared body length, big-endian
pub const SIZE_HEADER_LEN: usize = 32;

/// Status response: 2 code digits + message
pub const STATUS_LEN: usize = 16;
pub const STATUS_CODE_LEN: usize = 2;
pub const STATUS_MESSAGE_LEN: usize = STATUS_LEN - STATUS_CODE_LEN;

/// Body chunk size used by both sides unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

/// Only accepted media extension
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Status codes
pub const CODE_SUCCESS: u8 = 0;
pub const CODE_INSUFFICIENT_STORAGE: u8 = 1;
pub const CODE_INTERNAL_ERROR: u8 = 99;

/// Canonical messages, each fits STATUS_MESSAGE_LEN
pub const MSG_NO_SPACE: &str = "No space left";
pub const MSG_INTERNAL_ERROR: &str = "Internal error";
