//! Durable client state.
//!
//! [`RecordStore`] is the shared persistence pattern: load once (never
//! failing, recovering from corrupt files), mutate in place, and save through
//! a debounced single-writer task. Two concrete stores build on it:
//!
//! - [`AccountSettingsStore`] - login artifacts and content server penalties
//! - [`InstalledContentStore`] - installed manifest per depot

mod account;
mod clock;
mod error;
mod installed;
mod record;

pub use account::{AccountSettings, AccountSettingsStore, PenaltyPolicy};
pub use clock::{BoxFuture, Clock, TokioClock};
pub use error::{Result, StateError};
pub use installed::{InstalledContentStore, InstalledManifests};
pub use record::{LoadOutcome, Record, RecordStore, SaveOptions};
