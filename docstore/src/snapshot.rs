use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Every document of a store, keyed by full document path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub documents: BTreeMap<String, Document>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
