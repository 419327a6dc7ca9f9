use thiserror::Error;

use crate::effects::SessionError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out waiting for a content server")]
    Timeout,

    #[error("content server pool is exhausted")]
    PoolExhausted,

    #[error("failed to authenticate depot {depot_id} on {host}")]
    AuthenticationFailed {
        host:     String,
        depot_id: u32,
        #[source]
        source:   SessionError,
    },

    #[error("content server pool was shut down")]
    ShutDown,
}
