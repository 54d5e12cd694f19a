use crate::protocol::constants::{
    CODE_INSUFFICIENT_STORAGE, CODE_INTERNAL_ERROR, CODE_SUCCESS, MSG_INTERNAL_ERROR,
    MSG_NO_SPACE, STATUS_CODE_LEN, STATUS_LEN, STATUS_MESSAGE_LEN,
};
use crate::protocol::error::ProtocolError;
use crate::utils::io::{read_up_to, write_all};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    InsufficientStorage,
    InternalError,
    /// Any other two-digit code a peer may send
    Other(OtherCode),
}

/// A two-digit code outside the named ones. Only `StatusCode::from_u8`
/// builds these, so the value is always below 100 and never 0, 1 or 99.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherCode(u8);

impl OtherCode {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl StatusCode {
    pub fn from_u8(code: u8) -> Result<Self, ProtocolError> {
        match code {
            CODE_SUCCESS => Ok(Self::Success),
            CODE_INSUFFICIENT_STORAGE => Ok(Self::InsufficientStorage),
            CODE_INTERNAL_ERROR => Ok(Self::InternalError),
            c if c < 100 => Ok(Self::Other(OtherCode(c))),
            c => Err(ProtocolError::CodeOutOfRange(c)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Success => CODE_SUCCESS,
            Self::InsufficientStorage => CODE_INSUFFICIENT_STORAGE,
            Self::InternalError => CODE_INTERNAL_ERROR,
            Self::Other(c) => c.get(),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.as_u8())
    }
}

/// Fixed-width 16-byte status response: two ASCII digits, then a message
/// truncated or space-padded to 14 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub code: StatusCode,
    pub message: String,
}

impl StatusResponse {
    pub const WIRE_SIZE: usize = STATUS_LEN;

    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success(received: u64) -> Self {
        Self::new(StatusCode::Success, format!("OK {}", received))
    }

    pub fn insufficient_storage() -> Self {
        Self::new(StatusCode::InsufficientStorage, MSG_NO_SPACE)
    }

    pub fn internal_error() -> Self {
        Self::new(StatusCode::InternalError, MSG_INTERNAL_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [b' '; Self::WIRE_SIZE];
        let code = self.code.as_u8();
        buf[0] = b'0' + code / 10;
        buf[1] = b'0' + code % 10;

        let msg = truncate_to_boundary(&self.message, STATUS_MESSAGE_LEN);
        buf[STATUS_CODE_LEN..STATUS_CODE_LEN + msg.len()].copy_from_slice(msg.as_bytes());

        trace!("Encoded status {}: {:?}", self.code, buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(ProtocolError::Truncated {
                expected: Self::WIRE_SIZE,
                actual: buf.len(),
            });
        }

        let digits = [buf[0], buf[1]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(ProtocolError::InvalidStatus(digits));
        }
        let code = StatusCode::from_u8((digits[0] - b'0') * 10 + (digits[1] - b'0'))?;

        let message = String::from_utf8_lossy(&buf[STATUS_CODE_LEN..Self::WIRE_SIZE])
            .trim_end_matches(' ')
            .to_string();

        debug!("Decoded status: code={}, message={:?}", code, message);
        Ok(Self { code, message })
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char
fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<StatusResponse> {
    let mut buf = [0u8; StatusResponse::WIRE_SIZE];
    let n = read_up_to(reader, &mut buf).await?;
    Ok(StatusResponse::decode(&buf[..n])?)
}

pub async fn write_status<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: &StatusResponse,
) -> anyhow::Result<()> {
    write_all(writer, &status.encode()).await?;
    Ok(())
}
