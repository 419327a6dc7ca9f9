use std::sync::Arc;

use anyhow::{Context, Result};
use depot_manifest::{Checksum, LoadedManifest, Manifest, ManifestCache};
use depot_pool::{Directory, EndpointPool, Lease, Session};
use depot_state::{AccountSettingsStore, InstalledContentStore, LoadOutcome};
use tracing::{info, warn};

use crate::config::DepotConfig;
use crate::env::DepotEnv;

/// Endpoint pool ranked by the account's persisted penalties.
pub type ContentPool<D, S> = EndpointPool<D, S, Arc<AccountSettingsStore>>;

/// Owns the stores of one client process.
///
/// Both records are loaded once in [`open`](Self::open) and shared by
/// reference from then on; [`close`](Self::close) flushes them.
pub struct DepotContext {
    env:       DepotEnv,
    config:    DepotConfig,
    account:   Arc<AccountSettingsStore>,
    installed: InstalledContentStore,
    manifests: ManifestCache,
}

impl DepotContext {
    /// Read `config.toml` under the environment root and load every store.
    pub async fn open(env: DepotEnv) -> Result<Self> {
        let config_file = env.config_file();
        let config = DepotConfig::load(&config_file)
            .with_context(|| format!("Failed to load configuration from {}", config_file.display()))?;
        Ok(Self::with_config(env, config).await)
    }

    pub async fn with_config(env: DepotEnv, config: DepotConfig) -> Self {
        let save = config.save_options();
        let account = Arc::new(AccountSettingsStore::new(save, config.penalty_policy));
        let installed = InstalledContentStore::new(save);

        report_load("account settings", account.load(env.account_settings_path()).await);
        report_load("installed content", installed.load(env.installed_path()).await);

        Self {
            env,
            config,
            account,
            installed,
            manifests: ManifestCache::new(),
        }
    }

    pub fn env(&self) -> &DepotEnv { &self.env }

    pub fn config(&self) -> &DepotConfig { &self.config }

    pub fn account(&self) -> &Arc<AccountSettingsStore> { &self.account }

    pub fn installed(&self) -> &InstalledContentStore { &self.installed }

    pub fn manifests(&self) -> &ManifestCache { &self.manifests }

    /// Start an endpoint pool that ranks servers by this account's penalties.
    pub fn start_pool<D, S>(&self, directory: D, session: S) -> ContentPool<D, S>
    where
        D: Directory,
        S: Session,
    {
        EndpointPool::start(self.config.pool_options(), directory, session, Arc::clone(&self.account))
    }

    /// Hand a working endpoint back for reuse and credit its host.
    pub fn report_success<D, S>(&self, pool: &ContentPool<D, S>, lease: Lease) -> Result<()>
    where
        D: Directory,
        S: Session,
    {
        self.account
            .record_success(lease.endpoint().host())
            .context("Failed to record endpoint success")?;
        pool.release(lease);
        Ok(())
    }

    /// Penalize the endpoint's host and drop the endpoint from the pool.
    pub fn report_failure<D, S>(&self, pool: &ContentPool<D, S>, lease: Lease) -> Result<()>
    where
        D: Directory,
        S: Session,
    {
        let host = lease.endpoint().host().to_string();
        pool.discard(lease);
        let score = self
            .account
            .penalize(&host, 1)
            .context("Failed to record endpoint penalty")?;
        warn!(host = %host, penalty = score, "content server penalized");
        Ok(())
    }

    pub fn cached_manifest(&self, depot_id: u32, manifest_id: u64) -> Result<Option<LoadedManifest>> {
        let path = ManifestCache::path_for(self.env.manifest_dir(), depot_id, manifest_id);
        self.manifests
            .load(&path)
            .with_context(|| format!("Failed to read cached manifest {}", path.display()))
    }

    pub fn cache_manifest(&self, manifest: &Manifest) -> Result<Checksum> {
        let path = ManifestCache::path_for(self.env.manifest_dir(), manifest.depot_id(), manifest.manifest_id());
        self.manifests
            .save(manifest, &path)
            .with_context(|| format!("Failed to cache manifest {}", path.display()))
    }

    /// Wait for pending saves and stop the store writers.
    pub async fn close(&self) {
        self.account.close().await;
        self.installed.close().await;
    }
}

fn report_load(record: &str, outcome: LoadOutcome) {
    match outcome {
        LoadOutcome::Recovered { deleted } => warn!(record, deleted, "state file was unreadable, starting over"),
        outcome => info!(record, ?outcome, "state loaded"),
    }
}
