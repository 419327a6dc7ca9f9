//! Durable record codec.
//!
//! Records are serialized with `postcard` ("raw" bytes) and stored behind a
//! deflate filter. Checksums are always taken over the raw bytes so that they
//! do not depend on the compression level.
//!
//! A record cut short on disk surfaces as [`CodecError::Truncated`], which the
//! stores treat as definite corruption.

mod checksum;
mod error;

pub use checksum::Checksum;
pub use error::{CodecError, Result};

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn to_raw<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    postcard::to_stdvec(value).map_err(CodecError::Encode)
}

pub fn from_raw<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    postcard::from_bytes(raw).map_err(|e| match e {
        postcard::Error::DeserializeUnexpectedEnd => CodecError::Truncated,
        other => CodecError::Malformed(other),
    })
}

pub fn deflate(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw).map_err(CodecError::Deflate)?;
    encoder.finish().map_err(CodecError::Deflate)
}

pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(compressed.len() * 2);
    DeflateDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::Truncated,
            _ => CodecError::Deflate(e),
        })?;
    Ok(raw)
}

/// Serialize and compress `value` into its on-disk form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> { deflate(&to_raw(value)?) }

/// Inverse of [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> { from_raw(&inflate(bytes)?) }

/// Raw bytes, their checksum and the compressed on-disk form of `value`.
pub struct Encoded {
    pub checksum:   Checksum,
    pub compressed: Vec<u8>,
}

pub fn encode_with_checksum<T: Serialize + ?Sized>(value: &T) -> Result<Encoded> {
    let raw = to_raw(value)?;
    Ok(Encoded {
        checksum:   Checksum::of(&raw),
        compressed: deflate(&raw)?,
    })
}

pub fn decode_with_checksum<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, Checksum)> {
    let raw = inflate(bytes)?;
    let checksum = Checksum::of(&raw);
    Ok((from_raw(&raw)?, checksum))
}
