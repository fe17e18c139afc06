use thiserror::Error;

/// Errors that can end a parse. Structural corruption never surfaces here:
/// the scanner and tree walker absorb it locally and degrade to a partial or
/// illustrative result.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("input image is empty")]
    EmptyInput,

    #[error("parse cancelled")]
    Cancelled,
}

/// A field read that would exceed the buffer. Always recoverable: the
/// offending record or entry is dropped and scanning continues.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("read of {len} bytes at offset {offset} exceeds buffer size {max}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        max: usize,
    },
}

/// Errors raised by a single export call.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
