//! The signed-in user's conversation list.
//!
//! Conversations where the user is buyer or seller, most recent activity
//! first, each joined with the counterparty's display name and avatar. The
//! profiles are resolved with batched `IN` lookups rather than one read per
//! conversation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use iloved_common::conversation::{Conversation, ConversationId, EMPTY_PREVIEW_LABEL};
use iloved_common::identity::{Role, UserId};
use iloved_common::product::ProductId;
use iloved_common::profile::ProfileSummary;
use iloved_docstore::{
    Direction, Document, DocumentStore, Filter, ListenerRegistration, Query, QuerySnapshot,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{InboxError, InboxResult};
use crate::profiles::resolve_profiles;
use crate::schema::{self, field};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: ConversationId,
    pub product: ProductId,
    pub counterparty: UserId,
    pub counterparty_name: String,
    pub counterparty_avatar: String,
    pub role: Role,
    /// Raw preview text, empty when nothing has been said.
    pub last_message: String,
    pub last_sender: Option<UserId>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    fn new(
        conversation: Conversation,
        viewer: &UserId,
        profiles: &HashMap<UserId, ProfileSummary>,
    ) -> Option<Self> {
        let counterparty = conversation.counterparty(viewer)?.clone();
        let role = conversation.role_of(viewer)?;
        let profile = profiles
            .get(&counterparty)
            .cloned()
            .unwrap_or_else(|| ProfileSummary::unknown(counterparty.clone()));
        Some(Self {
            conversation: conversation.id,
            product: conversation.product,
            counterparty,
            counterparty_name: profile.name,
            counterparty_avatar: profile.avatar,
            role,
            last_message: conversation.last_message,
            last_sender: conversation.last_sender,
            updated_at: conversation.updated_at,
        })
    }

    pub fn preview_label(&self) -> &str {
        if self.last_message.is_empty() {
            EMPTY_PREVIEW_LABEL
        } else {
            &self.last_message
        }
    }
}

/// What a live directory currently shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryState {
    pub conversations: Vec<ConversationSummary>,
    /// Set once the first snapshot has been processed, successfully or not.
    pub loaded: bool,
    /// The most recent failure, cleared by the next successful refresh.
    pub last_error: Option<String>,
}

fn directory_query(user: &UserId) -> Query {
    Query::all()
        .filter(Filter::Or(vec![
            Filter::eq(field::BUYER, user.as_str()),
            Filter::eq(field::SELLER, user.as_str()),
        ]))
        .order_by(field::UPDATED_AT, Direction::Desc)
}

async fn summarize<S: DocumentStore>(
    store: &S,
    viewer: &UserId,
    docs: &[Document],
) -> InboxResult<Vec<ConversationSummary>> {
    let conversations: Vec<Conversation> = docs
        .iter()
        .filter_map(|doc| match schema::decode::<Conversation>(doc) {
            Ok(conversation) => Some(conversation),
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "skipping unreadable conversation");
                None
            }
        })
        .collect();
    let counterparties: BTreeSet<UserId> = conversations
        .iter()
        .filter_map(|c| c.counterparty(viewer).cloned())
        .collect();
    let profiles = resolve_profiles(store, counterparties).await?;
    Ok(conversations
        .into_iter()
        .filter_map(|c| ConversationSummary::new(c, viewer, &profiles))
        .collect())
}

/// One-shot read of the user's conversations.
pub async fn list_conversations<S: DocumentStore>(
    store: &S,
    user: &UserId,
) -> InboxResult<Vec<ConversationSummary>> {
    let docs = store
        .query(&schema::conversations()?, &directory_query(user))
        .await?;
    summarize(store, user, &docs).await
}

/// Live view of the user's conversations. Dropping it stops the updates.
pub struct DirectoryWatch {
    state: watch::Receiver<DirectoryState>,
    task: JoinHandle<()>,
    _registration: ListenerRegistration,
}

impl DirectoryWatch {
    pub fn state(&self) -> DirectoryState {
        self.state.borrow().clone()
    }

    /// Wait for the next published state.
    pub async fn changed(&mut self) -> InboxResult<DirectoryState> {
        self.state
            .changed()
            .await
            .map_err(|_| InboxError::SubscriptionClosed)?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Wait until the first snapshot has been processed.
    pub async fn loaded(&mut self) -> InboxResult<DirectoryState> {
        let state = self
            .state
            .wait_for(|s| s.loaded)
            .await
            .map_err(|_| InboxError::SubscriptionClosed)?;
        Ok(state.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectoryState> {
        self.state.clone()
    }
}

impl Drop for DirectoryWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to the user's conversations. Must be called inside a tokio
/// runtime: profile resolution for each snapshot runs on a spawned task.
pub fn watch_conversations<S: DocumentStore + 'static>(
    store: Arc<S>,
    user: UserId,
) -> InboxResult<DirectoryWatch> {
    let (snapshots_tx, mut snapshots) = mpsc::unbounded_channel::<Vec<Document>>();
    let (state_tx, state) = watch::channel(DirectoryState::default());

    let registration = store.listen_query(
        &schema::conversations()?,
        directory_query(&user),
        Box::new(move |snapshot: QuerySnapshot| {
            // The receiver only goes away once the watch is dropped.
            let _ = snapshots_tx.send(snapshot.documents);
        }),
    )?;

    let task = tokio::spawn(async move {
        while let Some(mut docs) = snapshots.recv().await {
            // Only the newest snapshot matters.
            while let Ok(newer) = snapshots.try_recv() {
                docs = newer;
            }
            match summarize(&*store, &user, &docs).await {
                Ok(conversations) => {
                    tracing::debug!(%user, count = conversations.len(), "directory refreshed");
                    state_tx.send_replace(DirectoryState {
                        conversations,
                        loaded: true,
                        last_error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(%user, error = %e, "directory refresh failed");
                    state_tx.send_modify(|state| {
                        state.loaded = true;
                        state.last_error = Some(e.to_string());
                    });
                }
            }
        }
        tracing::debug!(%user, "directory watch finished");
    });

    Ok(DirectoryWatch {
        state,
        task,
        _registration: registration,
    })
}
