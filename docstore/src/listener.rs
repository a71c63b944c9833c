//! Live listener registry shared by store backends.
//!
//! Each listener receives full snapshots, never deltas. Snapshots carry the
//! store revision they were taken at and a listener silently skips any
//! snapshot older than the last one it saw, so concurrent commits can never
//! make a view go backwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;

use crate::document::Document;
use crate::path::{CollectionPath, DocPath};
use crate::query::Query;

/// Current state of a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub revision: u64,
    pub document: Option<Document>,
}

/// Current result set of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub revision: u64,
    pub documents: Vec<Document>,
}

pub type DocumentCallback = Box<dyn Fn(DocumentSnapshot) + Send + Sync>;
pub type QueryCallback = Box<dyn Fn(QuerySnapshot) + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) enum Target {
    Document(DocPath),
    Query(CollectionPath, Query),
}

impl Target {
    /// Whether a write to `path` can change what this listener sees.
    pub(crate) fn touched_by(&self, path: &DocPath) -> bool {
        match self {
            Target::Document(target) => target == path,
            Target::Query(collection, _) => path.collection() == collection,
        }
    }
}

pub(crate) enum Snapshot {
    Document(DocumentSnapshot),
    Query(QuerySnapshot),
}

impl Snapshot {
    fn revision(&self) -> u64 {
        match self {
            Snapshot::Document(s) => s.revision,
            Snapshot::Query(s) => s.revision,
        }
    }
}

pub(crate) enum Callback {
    Document(DocumentCallback),
    Query(QueryCallback),
}

pub(crate) struct Sink {
    callback: Callback,
    active: AtomicBool,
    last_revision: Mutex<Option<u64>>,
}

impl Sink {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            callback,
            active: AtomicBool::new(true),
            last_revision: Mutex::new(None),
        }
    }

    /// Invoke the callback unless the listener was removed or already saw
    /// a newer snapshot. Deliveries to one listener never overlap.
    pub(crate) fn deliver(&self, snapshot: Snapshot) {
        let Ok(mut last) = self.last_revision.lock() else {
            return;
        };
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let revision = snapshot.revision();
        if last.is_some_and(|seen| seen >= revision) {
            tracing::trace!(revision, "skipping stale snapshot");
            return;
        }
        *last = Some(revision);
        match (&self.callback, snapshot) {
            (Callback::Document(cb), Snapshot::Document(s)) => cb(s),
            (Callback::Query(cb), Snapshot::Query(s)) => cb(s),
            _ => tracing::error!("snapshot kind does not match listener kind"),
        }
    }
}

pub(crate) struct Listener {
    pub(crate) target: Target,
    pub(crate) sink: Arc<Sink>,
}

/// All live listeners of one store.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: DashMap<u64, Listener>,
}

impl Listeners {
    pub(crate) fn register(self: &Arc<Self>, target: Target, sink: Arc<Sink>) -> ListenerRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            Listener {
                target,
                sink: sink.clone(),
            },
        );
        ListenerRegistration {
            id,
            listeners: Arc::downgrade(self),
            sink,
        }
    }

    /// Listeners whose view may change after writes to `paths`.
    pub(crate) fn affected(&self, paths: &[DocPath]) -> Vec<(Target, Arc<Sink>)> {
        self.entries
            .iter()
            .filter(|entry| paths.iter().any(|p| entry.target.touched_by(p)))
            .map(|entry| (entry.target.clone(), entry.sink.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn remove(&self, id: u64) {
        self.entries.remove(&id);
    }
}

/// Handle returned by the `listen_*` methods. Dropping it (or calling
/// [`ListenerRegistration::remove`]) unsubscribes; no callback starts after
/// that point.
#[must_use = "dropping the registration immediately unsubscribes"]
pub struct ListenerRegistration {
    id: u64,
    listeners: Weak<Listeners>,
    sink: Arc<Sink>,
}

impl ListenerRegistration {
    pub fn remove(self) {}

    pub fn is_active(&self) -> bool {
        self.sink.active.load(Ordering::Acquire)
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.sink.active.store(false, Ordering::Release);
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
