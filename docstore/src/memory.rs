use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::document::{Document, Fields};
use crate::error::{StoreError, StoreResult};
use crate::listener::{
    Callback, DocumentCallback, DocumentSnapshot, ListenerRegistration, Listeners, QueryCallback,
    QuerySnapshot, Sink, Snapshot, Target,
};
use crate::path::{CollectionPath, DocPath};
use crate::query::Query;
use crate::snapshot::StoreSnapshot;
use crate::write::{CommitResult, Precondition, Write, WriteBatch, WriteKind};
use crate::DocumentStore;

#[derive(Default)]
struct Inner {
    collections: BTreeMap<CollectionPath, BTreeMap<String, Document>>,
    revision: u64,
    next_seq: u64,
    clock: Option<DateTime<Utc>>,
}

impl Inner {
    fn lookup(&self, path: &DocPath) -> Option<&Document> {
        self.collections.get(path.collection())?.get(path.id())
    }

    /// Wall-clock time, nudged forward so commit times strictly increase.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn snapshot_for(&self, target: &Target) -> Snapshot {
        match target {
            Target::Document(path) => Snapshot::Document(DocumentSnapshot {
                revision: self.revision,
                document: self.lookup(path).cloned(),
            }),
            Target::Query(collection, query) => Snapshot::Query(QuerySnapshot {
                revision: self.revision,
                documents: self
                    .collections
                    .get(collection)
                    .map(|docs| query.apply(docs.values()))
                    .unwrap_or_default(),
            }),
        }
    }
}

/// In-process document store with live listeners.
///
/// Backs the daemon and the tests. Commits are serialized behind one lock,
/// listeners are notified after the lock is released.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    listeners: Arc<Listeners>,
}

fn check_precondition(
    path: &DocPath,
    current: Option<&Document>,
    precondition: Precondition,
) -> StoreResult<()> {
    match (precondition, current) {
        (Precondition::None, _) => Ok(()),
        (Precondition::Exists, Some(_)) => Ok(()),
        (Precondition::Exists, None) => Err(StoreError::NotFound(path.to_string())),
        (Precondition::NotExists, None) => Ok(()),
        (Precondition::NotExists, Some(_)) => Err(StoreError::AlreadyExists(path.to_string())),
        (Precondition::Version(_), None) => Err(StoreError::NotFound(path.to_string())),
        (Precondition::Version(expected), Some(doc)) if doc.version == expected => Ok(()),
        (Precondition::Version(expected), Some(doc)) => Err(StoreError::VersionConflict {
            path: path.to_string(),
            expected,
            found: doc.version,
        }),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from an exported snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> StoreResult<Self> {
        let mut inner = Inner {
            revision: snapshot.revision,
            ..Inner::default()
        };
        for (raw, doc) in snapshot.documents {
            let path = DocPath::parse(&raw)?;
            inner.next_seq = inner.next_seq.max(doc.create_seq + 1);
            inner.clock = inner.clock.max(Some(doc.update_time));
            inner
                .collections
                .entry(path.collection().clone())
                .or_default()
                .insert(path.id().to_string(), doc);
        }
        Ok(Self {
            inner: RwLock::new(inner),
            listeners: Arc::default(),
        })
    }

    /// Export every document, keyed by full path.
    pub fn export(&self) -> StoreResult<StoreSnapshot> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut documents = BTreeMap::new();
        for (collection, docs) in &inner.collections {
            for (id, doc) in docs {
                documents.insert(collection.doc(id)?.to_string(), doc.clone());
            }
        }
        Ok(StoreSnapshot {
            revision: inner.revision,
            documents,
        })
    }

    /// Number of registered live listeners.
    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub fn revision(&self) -> u64 {
        self.inner.read().map(|i| i.revision).unwrap_or_default()
    }

    fn commit_sync(&self, batch: WriteBatch) -> StoreResult<CommitResult> {
        let (result, pending) = {
            let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

            // Stage every write against an overlay first so a failed
            // precondition leaves the store untouched.
            let mut staged: HashMap<DocPath, Option<Document>> = HashMap::new();
            let mut order: Vec<DocPath> = Vec::new();
            let commit_time = inner.tick();
            let mut next_seq = inner.next_seq;

            for write in batch.into_writes() {
                let Write {
                    path,
                    kind,
                    precondition,
                    server_timestamps,
                } = write;
                let current = match staged.get(&path) {
                    Some(doc) => doc.clone(),
                    None => inner.lookup(&path).cloned(),
                };
                check_precondition(&path, current.as_ref(), precondition)?;

                let stamp = |fields: &mut Fields| {
                    for field in &server_timestamps {
                        fields.insert(field.clone(), Value::String(commit_time.to_rfc3339()));
                    }
                };
                let next = match (kind, current) {
                    (WriteKind::Delete, _) => None,
                    (WriteKind::Patch(_), None) => {
                        return Err(StoreError::NotFound(path.to_string()));
                    }
                    (WriteKind::Patch(patch), Some(mut doc)) => {
                        doc.fields.extend(patch);
                        stamp(&mut doc.fields);
                        doc.version += 1;
                        doc.update_time = commit_time;
                        Some(doc)
                    }
                    (WriteKind::Set(mut fields), Some(doc)) => {
                        stamp(&mut fields);
                        Some(Document {
                            fields,
                            version: doc.version + 1,
                            update_time: commit_time,
                            ..doc
                        })
                    }
                    (WriteKind::Set(mut fields), None) => {
                        stamp(&mut fields);
                        let seq = next_seq;
                        next_seq += 1;
                        Some(Document {
                            id: path.id().to_string(),
                            fields,
                            version: 1,
                            create_time: commit_time,
                            update_time: commit_time,
                            create_seq: seq,
                        })
                    }
                };
                if !staged.contains_key(&path) {
                    order.push(path.clone());
                }
                staged.insert(path, next);
            }

            for (path, doc) in staged {
                let collection = inner.collections.entry(path.collection().clone()).or_default();
                match doc {
                    Some(doc) => {
                        collection.insert(path.id().to_string(), doc);
                    }
                    None => {
                        collection.remove(path.id());
                    }
                }
            }
            inner.revision += 1;
            inner.next_seq = next_seq;

            let pending: Vec<_> = self
                .listeners
                .affected(&order)
                .into_iter()
                .map(|(target, sink)| (inner.snapshot_for(&target), sink))
                .collect();

            tracing::debug!(
                revision = inner.revision,
                writes = order.len(),
                listeners = pending.len(),
                "committed batch"
            );
            (
                CommitResult {
                    revision: inner.revision,
                    commit_time,
                },
                pending,
            )
        };

        for (snapshot, sink) in pending {
            sink.deliver(snapshot);
        }
        Ok(result)
    }

    fn listen(&self, target: Target, callback: Callback) -> StoreResult<ListenerRegistration> {
        let sink = Arc::new(Sink::new(callback));
        let (registration, initial) = {
            // Registering under the read lock means no commit can slip in
            // between the initial snapshot and the first notification.
            let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
            let initial = inner.snapshot_for(&target);
            (self.listeners.register(target, sink.clone()), initial)
        };
        sink.deliver(initial);
        Ok(registration)
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.lookup(path).cloned())
    }

    async fn query(&self, collection: &CollectionPath, query: &Query) -> StoreResult<Vec<Document>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| query.apply(docs.values()))
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<CommitResult> {
        self.commit_sync(batch)
    }

    fn listen_document(
        &self,
        path: &DocPath,
        callback: DocumentCallback,
    ) -> StoreResult<ListenerRegistration> {
        self.listen(Target::Document(path.clone()), Callback::Document(callback))
    }

    fn listen_query(
        &self,
        collection: &CollectionPath,
        query: Query,
        callback: QueryCallback,
    ) -> StoreResult<ListenerRegistration> {
        self.listen(
            Target::Query(collection.clone(), query),
            Callback::Query(callback),
        )
    }
}
