use crate::protocol::constants::SIZE_HEADER_LEN;
use crate::protocol::error::ProtocolError;
use crate::utils::io::{read_up_to, write_all};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, trace};

/// Fixed-size size header (32 bytes, big-endian).
///
/// The field is wider than any size we can hold in memory, so the upper
/// 24 bytes are always written as zero and must be zero on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeHeader {
    pub declared_size: u64,
}

impl SizeHeader {
    pub const SIZE: usize = SIZE_HEADER_LEN;
    const PAD: usize = Self::SIZE - 8;

    pub fn new(declared_size: u64) -> Self {
        Self { declared_size }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            error!("Size header too short: {} bytes", buf.len());
            return Err(ProtocolError::Truncated {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        if buf[..Self::PAD].iter().any(|&b| b != 0) {
            error!("Size header exceeds 64 bits");
            return Err(ProtocolError::SizeOverflow);
        }

        let mut low = [0u8; 8];
        low.copy_from_slice(&buf[Self::PAD..Self::SIZE]);

        Ok(Self {
            declared_size: u64::from_be_bytes(low),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[Self::PAD..].copy_from_slice(&self.declared_size.to_be_bytes());
        buf
    }
}

pub fn encode_size_header(size: u64) -> [u8; SIZE_HEADER_LEN] {
    SizeHeader::new(size).encode()
}

pub fn decode_size_header(bytes: &[u8]) -> Result<u64, ProtocolError> {
    SizeHeader::decode(bytes).map(|h| h.declared_size)
}

/// Read the size header, tolerating short reads until EOF.
///
/// A peer that closes before 32 bytes arrive yields `ProtocolError::Truncated`
/// rather than a bare I/O error, so callers can tell a framing fault apart.
pub async fn read_size_header<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<u64> {
    let mut buf = [0u8; SizeHeader::SIZE];
    let n = read_up_to(reader, &mut buf).await?;
    trace!("Raw size header ({} bytes): {:?}", n, &buf[..n]);

    let header = SizeHeader::decode(&buf[..n])?;
    Ok(header.declared_size)
}

pub async fn write_size_header<W: AsyncWrite + Unpin>(writer: &mut W, size: u64) -> anyhow::Result<()> {
    write_all(writer, &encode_size_header(size)).await?;
    Ok(())
}
