use std::fmt;

use sha2::{Digest, Sha256};

/// SHA-256 over the raw (uncompressed) encoded bytes of a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    pub fn of(bytes: &[u8]) -> Self { Self(Sha256::digest(bytes).into()) }

    pub fn to_hex(&self) -> String { hex::encode(self.0) }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Checksum({})", self.to_hex()) }
}
