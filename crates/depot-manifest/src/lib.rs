//! Depot manifests and their on-disk cache.

mod cache;
mod data;
mod error;

pub use cache::{LoadedManifest, ManifestCache};
pub use data::{ChunkId, ChunkRecord, FileFlags, FileRecord, Manifest, ManifestBuilder};
pub use depot_codec::Checksum;
pub use error::{ManifestError, Result};
