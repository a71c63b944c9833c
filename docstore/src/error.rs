use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("document '{0}' not found")]
    NotFound(String),

    #[error("document '{0}' already exists")]
    AlreadyExists(String),

    #[error("version conflict on '{path}': expected {expected}, found {found}")]
    VersionConflict {
        path: String,
        expected: u64,
        found: u64,
    },

    #[error("document fields must serialize to a JSON object")]
    NotAnObject,

    #[error("could not encode document fields")]
    Encode(#[source] serde_json::Error),

    #[error("could not decode document '{path}'")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("blob '{0}' not found")]
    BlobNotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether the error came from a failed write precondition.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_) | StoreError::VersionConflict { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
