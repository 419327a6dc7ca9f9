//! Pool of authenticated content server endpoints.
//!
//! # Architecture
//!
//! - [`data`] - servers, endpoints, tokens, leases and pool options
//! - [`core`] - pure ranking and backoff arithmetic
//! - `effects` - the directory, session and penalty seams
//!
//! The pool discovers servers in the background, hands them out with a
//! per-depot token, reuses endpoints that worked and drops the ones that
//! failed. An empty directory listing, or losing the session after the pool
//! was populated, exhausts the pool for good.

pub mod core;
pub mod data;
mod effects;
mod error;
mod pool;
mod token;

pub use data::{Endpoint, Lease, PoolOptions, Server, Token};
pub use effects::{Directory, DirectoryError, Penalties, Session, SessionError};
pub use error::PoolError;
pub use pool::EndpointPool;
