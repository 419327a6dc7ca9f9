use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use depot_codec::Checksum;
use depot_fs::AtomicWriteOptions;
use tracing::{debug, warn};

use crate::data::Manifest;
use crate::error::Result;

/// A manifest read back from the cache together with the checksum of its
/// serialized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub checksum: Checksum,
}

/// On-disk cache of depot manifests.
///
/// Every load and save holds one process-wide lock, so concurrent callers
/// never observe a half-written manifest or race a deletion.
#[derive(Debug, Default)]
pub struct ManifestCache {
    lock: Mutex<()>,
}

impl ManifestCache {
    pub fn new() -> Self { Self::default() }

    /// `{dir}/{depot_id}_{manifest_id}.manifest`
    pub fn path_for(dir: impl AsRef<Path>, depot_id: u32, manifest_id: u64) -> PathBuf {
        dir.as_ref().join(format!("{depot_id}_{manifest_id}.manifest"))
    }

    /// Read a cached manifest.
    ///
    /// A missing file is a cache miss. A file that ends early is deleted and
    /// also reported as a miss so the caller refetches it.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Option<LoadedManifest>> {
        let path = path.as_ref();
        let _guard = self.guard();

        let Some(bytes) = depot_fs::read_optional(path)? else {
            debug!(path = %path.display(), "manifest not cached");
            return Ok(None);
        };

        match depot_codec::decode_with_checksum::<Manifest>(&bytes) {
            Ok((manifest, checksum)) => Ok(Some(LoadedManifest { manifest, checksum })),
            Err(e) if e.is_truncated() => {
                warn!(path = %path.display(), "cached manifest is truncated, deleting");
                depot_fs::remove_if_exists(path)?;
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Write `manifest` to `path`, returning the checksum a later
    /// [`load`](Self::load) of the same file will report.
    pub fn save(&self, manifest: &Manifest, path: impl AsRef<Path>) -> Result<Checksum> {
        let path = path.as_ref();
        let encoded = depot_codec::encode_with_checksum(manifest)?;

        let _guard = self.guard();
        depot_fs::atomic_write(path, &encoded.compressed, AtomicWriteOptions::default())?;
        debug!(
            path = %path.display(),
            depot_id = manifest.depot_id(),
            manifest_id = manifest.manifest_id(),
            checksum = %encoded.checksum,
            "manifest cached"
        );
        Ok(encoded.checksum)
    }

    fn guard(&self) -> MutexGuard<'_, ()> { self.lock.lock().unwrap_or_else(PoisonError::into_inner) }
}
