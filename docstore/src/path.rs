use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Path of a collection: `users`, or `conversations/{id}/messages`.
///
/// Always an odd number of non-empty segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

/// Path of a document: a collection path plus a document id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

fn segments(raw: &str) -> StoreResult<Vec<&str>> {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "empty segment",
        });
    }
    Ok(parts)
}

fn check_segment(raw: &str, segment: &str) -> StoreResult<()> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "segment must be non-empty and must not contain '/'",
        });
    }
    Ok(())
}

impl CollectionPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let parts = segments(raw)?;
        if parts.len() % 2 == 0 {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: "collection paths have an odd number of segments",
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// A top-level collection.
    pub fn root(name: &str) -> StoreResult<Self> {
        check_segment(name, name)?;
        Ok(Self(name.to_string()))
    }

    pub fn doc(&self, id: &str) -> StoreResult<DocPath> {
        check_segment(&format!("{}/{id}", self.0), id)?;
        Ok(DocPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let (collection, id) = raw.rsplit_once('/').ok_or_else(|| StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "document paths have an even number of segments",
        })?;
        CollectionPath::parse(collection)?.doc(id)
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A subcollection nested under this document.
    pub fn child(&self, name: &str) -> StoreResult<CollectionPath> {
        let raw = format!("{self}/{name}");
        check_segment(&raw, name)?;
        Ok(CollectionPath(raw))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}

impl TryFrom<String> for DocPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}
