use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The input ends before the record does.
    #[error("record is truncated")]
    Truncated,

    #[error("malformed record: {0}")]
    Malformed(#[source] postcard::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[source] postcard::Error),

    #[error("deflate stream error: {0}")]
    Deflate(#[source] io::Error),
}

impl CodecError {
    pub fn is_truncated(&self) -> bool { matches!(self, CodecError::Truncated) }
}

pub type Result<T> = std::result::Result<T, CodecError>;
