use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} has no parent directory")]
    NoParent { path: PathBuf },
}

impl Error {
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Error::Read { source, .. } | Error::Write { source, .. } | Error::Remove { source, .. } => {
                source.kind()
            }
            Error::NoParent { .. } => io::ErrorKind::InvalidInput,
        }
    }

    /// Whether retrying the same operation later can succeed, e.g. a file held
    /// open exclusively by another writer.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self.kind(),
            io::ErrorKind::InvalidInput | io::ErrorKind::NotFound | io::ErrorKind::Unsupported
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
