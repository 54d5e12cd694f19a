use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Truncated { expected: usize, actual: usize },
    SizeOverflow,
    InvalidStatus([u8; 2]),
    CodeOutOfRange(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Truncated { expected, actual } =>
                write!(f, "truncated: expected {} bytes, got {}", expected, actual),
            ProtocolError::SizeOverflow =>
                write!(f, "declared size does not fit in 64 bits"),
            ProtocolError::InvalidStatus(raw) =>
                write!(f, "invalid status code bytes {:?}", raw),
            ProtocolError::CodeOutOfRange(c) =>
                write!(f, "status code {} does not fit in two digits", c),
        }
    }
}

impl std::error::Error for ProtocolError {}
