//! Seams to the outside world: server directory, logged-on session and the
//! penalty source used for ranking.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use depot_state::AccountSettingsStore;
use thiserror::Error;

use crate::data::{Server, Token};

#[derive(Clone, Debug, Error)]
pub enum DirectoryError {
    #[error("server directory is rate limiting requests")]
    RateLimited,
    #[error("server directory request failed: {0}")]
    Network(String),
}

#[derive(Clone, Debug, Error)]
pub enum SessionError {
    #[error("session is not connected")]
    Disconnected,
    #[error("no token issued for depot {depot_id} on {host}")]
    TokenUnavailable { depot_id: u32, host: String },
    #[error("token request failed: {0}")]
    Request(String),
}

/// Lists content servers for a cell.
pub trait Directory: Send + Sync + 'static {
    fn list_servers(&self, cell_id: u32) -> impl Future<Output = Result<Vec<Server>, DirectoryError>> + Send;
}

/// The logged-on client session.
pub trait Session: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Host that tokens for `host` are scoped to.
    fn resolve_routing_host(&self, host: &str) -> String;

    fn request_token(
        &self,
        app_id: u32,
        depot_id: u32,
        host: &str,
    ) -> impl Future<Output = Result<Token, SessionError>> + Send;
}

/// Source of per-host penalty scores.
pub trait Penalties: Send + Sync + 'static {
    fn penalty(&self, host: &str) -> i32;
}

impl<T: Directory> Directory for Arc<T> {
    fn list_servers(&self, cell_id: u32) -> impl Future<Output = Result<Vec<Server>, DirectoryError>> + Send {
        (**self).list_servers(cell_id)
    }
}

impl<T: Session> Session for Arc<T> {
    fn is_connected(&self) -> bool { (**self).is_connected() }

    fn resolve_routing_host(&self, host: &str) -> String { (**self).resolve_routing_host(host) }

    fn request_token(
        &self,
        app_id: u32,
        depot_id: u32,
        host: &str,
    ) -> impl Future<Output = Result<Token, SessionError>> + Send {
        (**self).request_token(app_id, depot_id, host)
    }
}

impl<T: Penalties> Penalties for Arc<T> {
    fn penalty(&self, host: &str) -> i32 { (**self).penalty(host) }
}

impl Penalties for AccountSettingsStore {
    fn penalty(&self, host: &str) -> i32 { AccountSettingsStore::penalty(self, host) }
}

impl Penalties for HashMap<String, i32> {
    fn penalty(&self, host: &str) -> i32 { self.get(host).copied().unwrap_or(0) }
}

impl Penalties for BTreeMap<String, i32> {
    fn penalty(&self, host: &str) -> i32 { self.get(host).copied().unwrap_or(0) }
}
