//! Unified error handling for the client.

use tandem_engine::RecordId;

use crate::config::ConfigError;

/// Errors reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Controller error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] tandem_engine::Error),

    #[error("remote write for {id} failed: {source}")]
    RemoteWrite {
        id: RecordId,
        #[source]
        source: RemoteError,
    },

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("controller closed")]
    Closed,
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, SyncError>;
