//! Live message view of a single conversation.
//!
//! The view subscribes to the conversation's message subcollection ordered
//! by send time and swaps in the full list on every change. Imported
//! history lands in its original place. Sending goes
//! through [`send_message`](crate::send::send_message); the store's listener
//! then delivers the new list here.

use iloved_common::conversation::{Conversation, ConversationId};
use iloved_common::identity::UserId;
use iloved_common::message::Message;
use iloved_common::profile::ProfileSummary;
use iloved_docstore::{Direction, DocumentStore, ListenerRegistration, Query, QuerySnapshot};
use tokio::sync::watch;

use crate::error::{InboxError, InboxResult};
use crate::profiles::profile_summary;
use crate::schema::{self, field};
use crate::send::{load_conversation, send_message};

fn decode_messages(snapshot: &QuerySnapshot) -> Vec<Message> {
    snapshot
        .documents
        .iter()
        .filter_map(|doc| match schema::decode::<Message>(doc) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "skipping unreadable message");
                None
            }
        })
        .collect()
}

/// Call `on_change` with the full message list now and after every change.
/// Dropping the registration stops the callbacks.
pub fn subscribe_messages<S, F>(
    store: &S,
    conversation: &ConversationId,
    on_change: F,
) -> InboxResult<ListenerRegistration>
where
    S: DocumentStore,
    F: Fn(Vec<Message>) + Send + Sync + 'static,
{
    let registration = store.listen_query(
        &schema::messages(conversation)?,
        Query::all().order_by(field::CREATED_AT, Direction::Asc),
        Box::new(move |snapshot: QuerySnapshot| {
            tracing::debug!(revision = snapshot.revision, count = snapshot.documents.len(), "messages changed");
            on_change(decode_messages(&snapshot));
        }),
    )?;
    Ok(registration)
}

/// An open conversation as seen by one of its participants.
#[derive(Debug)]
pub struct ChatView {
    conversation: Conversation,
    viewer: UserId,
    counterparty: ProfileSummary,
    messages: watch::Receiver<Vec<Message>>,
    registration: ListenerRegistration,
}

impl ChatView {
    /// Open the conversation for `viewer`, who must be its buyer or seller.
    pub async fn open<S: DocumentStore>(
        store: &S,
        conversation: &ConversationId,
        viewer: &UserId,
    ) -> InboxResult<Self> {
        let record = load_conversation(store, conversation).await?;
        let Some(other) = record.counterparty(viewer).cloned() else {
            return Err(InboxError::NotParticipant {
                conversation: conversation.clone(),
                user: viewer.clone(),
            });
        };
        let counterparty = profile_summary(store, &other).await?;

        let (tx, messages) = watch::channel(Vec::new());
        let registration = subscribe_messages(store, conversation, move |list| {
            tx.send_replace(list);
        })?;
        tracing::debug!(%conversation, %viewer, "chat opened");

        Ok(Self {
            conversation: record,
            viewer: viewer.clone(),
            counterparty,
            messages,
            registration,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn counterparty(&self) -> &ProfileSummary {
        &self.counterparty
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn is_mine(&self, message: &Message) -> bool {
        message.is_from(&self.viewer)
    }

    /// Wait for the next message list.
    pub async fn changed(&mut self) -> InboxResult<Vec<Message>> {
        self.messages
            .changed()
            .await
            .map_err(|_| InboxError::SubscriptionClosed)?;
        Ok(self.messages.borrow_and_update().clone())
    }

    /// Wait until the list holds at least `count` messages.
    pub async fn wait_for_count(&mut self, count: usize) -> InboxResult<Vec<Message>> {
        let list = self
            .messages
            .wait_for(|m| m.len() >= count)
            .await
            .map_err(|_| InboxError::SubscriptionClosed)?;
        Ok(list.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.clone()
    }

    /// Send as the viewer.
    pub async fn send<S: DocumentStore>(&self, store: &S, text: &str) -> InboxResult<Message> {
        send_message(store, &self.conversation.id, &self.viewer, text).await
    }

    pub fn close(self) {
        self.registration.remove();
    }
}
