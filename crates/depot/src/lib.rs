//! Client-side state for depot downloads.
//!
//! [`DepotContext`] ties together the layered [`DepotConfig`], the state
//! locations from [`DepotEnv`], the account and installed-content stores, the
//! manifest cache and the endpoint pool. The building blocks are re-exported
//! as modules for callers that need them directly.

mod config;
mod context;
mod env;

pub use config::{ConfigError, DepotConfig};
pub use context::{ContentPool, DepotContext};
pub use env::DepotEnv;

pub use depot_manifest as manifest;
pub use depot_pool as pool;
pub use depot_state as state;
