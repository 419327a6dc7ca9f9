use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::record::{LoadOutcome, Record, RecordStore, SaveOptions};

/// Per-account login artifacts and per-server penalty scores.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub sentry_data:            BTreeMap<String, Vec<u8>>,
    pub content_server_penalty: BTreeMap<String, i32>,
    pub login_tokens:           BTreeMap<String, String>,
}

impl Record for AccountSettings {
    const NAME: &'static str = "account settings";
}

/// How penalty scores evolve once recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PenaltyPolicy {
    /// Scores only ever grow.
    #[default]
    Permanent,
    /// Each successful use lowers the score by `step`, never below zero.
    DecayOnSuccess { step: i32 },
}

pub struct AccountSettingsStore {
    store:  RecordStore<AccountSettings>,
    policy: PenaltyPolicy,
}

impl AccountSettingsStore {
    pub fn new(options: SaveOptions, policy: PenaltyPolicy) -> Self {
        Self {
            store: RecordStore::new(options),
            policy,
        }
    }

    pub fn with_clock(options: SaveOptions, policy: PenaltyPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RecordStore::with_clock(options, clock),
            policy,
        }
    }

    pub async fn load(&self, path: impl Into<PathBuf>) -> LoadOutcome { self.store.load(path).await }

    pub fn policy(&self) -> PenaltyPolicy { self.policy }

    pub fn record(&self) -> &RecordStore<AccountSettings> { &self.store }

    /// Current penalty of `host`; unknown hosts and an unloaded store score 0.
    pub fn penalty(&self, host: &str) -> i32 {
        self.store
            .read(|s| s.content_server_penalty.get(host).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Add `amount` to the penalty of `host` and schedule a save.
    pub fn penalize(&self, host: &str, amount: i32) -> Result<i32> {
        let score = self.store.update(|s| {
            let score = s.content_server_penalty.entry(host.to_string()).or_insert(0);
            *score = score.saturating_add(amount);
            *score
        })?;
        debug!(host, score, "content server penalized");
        self.store.save()?;
        Ok(score)
    }

    /// Apply the success side of the penalty policy for `host`.
    pub fn record_success(&self, host: &str) -> Result<i32> {
        let PenaltyPolicy::DecayOnSuccess { step } = self.policy else {
            return Ok(self.penalty(host));
        };

        let changed = self.store.update(|s| match s.content_server_penalty.get_mut(host) {
            Some(score) if *score > 0 => {
                *score = score.saturating_sub(step).max(0);
                Some(*score)
            }
            _ => None,
        })?;

        match changed {
            Some(score) => {
                self.store.save()?;
                Ok(score)
            }
            None => Ok(0),
        }
    }

    pub fn sentry_data(&self, account: &str) -> Result<Option<Vec<u8>>> {
        self.store.read(|s| s.sentry_data.get(account).cloned())
    }

    pub fn set_sentry_data(&self, account: &str, data: Vec<u8>) -> Result<()> {
        self.store.update(|s| s.sentry_data.insert(account.to_string(), data))?;
        self.store.save()
    }

    pub fn login_token(&self, account: &str) -> Result<Option<String>> {
        self.store.read(|s| s.login_tokens.get(account).cloned())
    }

    pub fn set_login_token(&self, account: &str, token: impl Into<String>) -> Result<()> {
        self.store
            .update(|s| s.login_tokens.insert(account.to_string(), token.into()))?;
        self.store.save()
    }

    pub fn remove_login_token(&self, account: &str) -> Result<bool> {
        let removed = self.store.update(|s| s.login_tokens.remove(account).is_some())?;
        if removed {
            self.store.save()?;
        }
        Ok(removed)
    }

    pub async fn flush(&self) { self.store.flush().await }

    pub async fn close(&self) { self.store.close().await }
}
