use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// The store was used before `load`; a caller contract violation.
    #[error("{record} used before it was loaded")]
    NotLoaded { record: &'static str },

    #[error("{record} store is closed")]
    Closed { record: &'static str },
}

pub type Result<T> = std::result::Result<T, StateError>;
