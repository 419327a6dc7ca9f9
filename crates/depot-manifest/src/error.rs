use depot_codec::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest codec: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Fs(#[from] depot_fs::Error),
}
