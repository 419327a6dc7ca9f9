//! Pure functions behind the pool: candidate ranking and retry backoff.

mod rank;
mod retry;

pub use rank::rank_servers;
pub use retry::backoff_delay;
