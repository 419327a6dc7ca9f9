use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::Result;
use crate::record::{LoadOutcome, Record, RecordStore, SaveOptions};

/// Depot id to the manifest id currently installed on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledManifests {
    pub installed: BTreeMap<u32, u64>,
}

impl Record for InstalledManifests {
    const NAME: &'static str = "installed content";
}

pub struct InstalledContentStore {
    store: RecordStore<InstalledManifests>,
}

impl InstalledContentStore {
    pub fn new(options: SaveOptions) -> Self {
        Self {
            store: RecordStore::new(options),
        }
    }

    pub fn with_clock(options: SaveOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RecordStore::with_clock(options, clock),
        }
    }

    pub async fn load(&self, path: impl Into<PathBuf>) -> LoadOutcome { self.store.load(path).await }

    pub fn record(&self) -> &RecordStore<InstalledManifests> { &self.store }

    pub fn installed_manifest(&self, depot_id: u32) -> Result<Option<u64>> {
        self.store.read(|r| r.installed.get(&depot_id).copied())
    }

    pub fn set_installed_manifest(&self, depot_id: u32, manifest_id: u64) -> Result<()> {
        let changed = self
            .store
            .update(|r| r.installed.insert(depot_id, manifest_id) != Some(manifest_id))?;
        if changed {
            self.store.save()?;
        }
        Ok(())
    }

    pub fn remove_installed(&self, depot_id: u32) -> Result<Option<u64>> {
        let removed = self.store.update(|r| r.installed.remove(&depot_id))?;
        if removed.is_some() {
            self.store.save()?;
        }
        Ok(removed)
    }

    pub fn installed(&self) -> Result<BTreeMap<u32, u64>> { self.store.read(|r| r.installed.clone()) }

    pub async fn flush(&self) { self.store.flush().await }

    pub async fn close(&self) { self.store.close().await }
}
