pub mod constants;
pub mod error;
pub mod header;
pub mod status;

pub use constants::*;
pub use error::ProtocolError;
pub use header::{decode_size_header, encode_size_header, read_size_header, write_size_header, SizeHeader};
pub use status::{read_status, write_status, StatusCode, StatusResponse};
