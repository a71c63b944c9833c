//! Document store abstraction used by the iLoved marketplace.
//!
//! Collections of JSON documents addressed by slash-separated paths, atomic
//! write batches with preconditions and server timestamps, and live
//! listeners that receive full snapshots after every relevant commit.

use std::future::Future;

mod blob;
mod document;
mod error;
mod listener;
mod memory;
mod path;
mod query;
mod snapshot;
mod write;

pub use blob::{Blob, BlobStore, MemoryBlobStore};
pub use document::{auto_id, to_fields, Document, Fields};
pub use error::{StoreError, StoreResult};
pub use listener::{
    DocumentCallback, DocumentSnapshot, ListenerRegistration, QueryCallback, QuerySnapshot,
};
pub use memory::MemoryStore;
pub use path::{CollectionPath, DocPath};
pub use query::{compare_values, Direction, Filter, OrderBy, Query};
pub use snapshot::StoreSnapshot;
pub use write::{CommitResult, Precondition, Write, WriteBatch, WriteKind};

/// A document database with live queries.
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &DocPath) -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Apply every write in the batch or none of them.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = StoreResult<CommitResult>> + Send;

    /// Watch one document. The callback runs once with the current state
    /// before this returns, then after every commit touching the document.
    fn listen_document(
        &self,
        path: &DocPath,
        callback: DocumentCallback,
    ) -> StoreResult<ListenerRegistration>;

    /// Watch a query over one collection, with the same delivery rules as
    /// [`DocumentStore::listen_document`].
    fn listen_query(
        &self,
        collection: &CollectionPath,
        query: Query,
        callback: QueryCallback,
    ) -> StoreResult<ListenerRegistration>;

    /// Add a document under a generated id.
    fn create(
        &self,
        collection: &CollectionPath,
        fields: Fields,
    ) -> impl Future<Output = StoreResult<DocPath>> + Send {
        let path = collection.doc(&auto_id());
        async move {
            let path = path?;
            self.commit(Write::create(path.clone(), fields).into()).await?;
            Ok(path)
        }
    }

    fn create_at(
        &self,
        path: &DocPath,
        fields: Fields,
    ) -> impl Future<Output = StoreResult<CommitResult>> + Send {
        self.commit(Write::create(path.clone(), fields).into())
    }

    fn set(
        &self,
        path: &DocPath,
        fields: Fields,
    ) -> impl Future<Output = StoreResult<CommitResult>> + Send {
        self.commit(Write::set(path.clone(), fields).into())
    }

    fn patch(
        &self,
        path: &DocPath,
        fields: Fields,
    ) -> impl Future<Output = StoreResult<CommitResult>> + Send {
        self.commit(Write::patch(path.clone(), fields).into())
    }

    fn delete(&self, path: &DocPath) -> impl Future<Output = StoreResult<CommitResult>> + Send {
        self.commit(Write::delete(path.clone()).into())
    }
}
