use chrono::{DateTime, Utc};

use crate::document::Fields;
use crate::path::DocPath;

/// Condition a document must satisfy for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    Exists,
    NotExists,
    /// The document exists and is at exactly this version.
    Version(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteKind {
    /// Replace all fields (creating the document if needed).
    Set(Fields),
    /// Merge top-level fields into an existing document.
    Patch(Fields),
    Delete,
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub path: DocPath,
    pub kind: WriteKind,
    pub precondition: Precondition,
    /// Fields filled with the commit time by the store.
    pub server_timestamps: Vec<String>,
}

impl Write {
    /// Set that fails if the document already exists.
    pub fn create(path: DocPath, fields: Fields) -> Self {
        Self {
            path,
            kind: WriteKind::Set(fields),
            precondition: Precondition::NotExists,
            server_timestamps: Vec::new(),
        }
    }

    pub fn set(path: DocPath, fields: Fields) -> Self {
        Self {
            path,
            kind: WriteKind::Set(fields),
            precondition: Precondition::None,
            server_timestamps: Vec::new(),
        }
    }

    /// Patch that fails if the document does not exist.
    pub fn patch(path: DocPath, fields: Fields) -> Self {
        Self {
            path,
            kind: WriteKind::Patch(fields),
            precondition: Precondition::Exists,
            server_timestamps: Vec::new(),
        }
    }

    pub fn delete(path: DocPath) -> Self {
        Self {
            path,
            kind: WriteKind::Delete,
            precondition: Precondition::None,
            server_timestamps: Vec::new(),
        }
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn with_server_timestamp(mut self, field: &str) -> Self {
        self.server_timestamps.push(field.to_string());
        self
    }
}

/// Writes committed atomically: every precondition is checked before any
/// write applies, and all writes share one commit time and revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

impl From<Write> for WriteBatch {
    fn from(write: Write) -> Self {
        WriteBatch::new().push(write)
    }
}

/// Outcome of a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    pub revision: u64,
    pub commit_time: DateTime<Utc>,
}
