use iloved_common::conversation::{Conversation, ConversationId};
use iloved_common::identity::UserId;
use iloved_common::message::{normalize_text, Message, MessageId};
use iloved_docstore::{auto_id, DocumentStore, Fields, StoreError, Write, WriteBatch};
use serde_json::Value;

use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};

/// Read a conversation record.
pub async fn load_conversation<S: DocumentStore>(
    store: &S,
    id: &ConversationId,
) -> InboxResult<Conversation> {
    let doc = store
        .get(&schema::conversation_doc(id)?)
        .await?
        .ok_or_else(|| InboxError::ConversationNotFound(id.clone()))?;
    schema::decode(&doc)
}

/// Append a message and refresh the conversation preview in one atomic batch.
///
/// Blank text, a sender outside the conversation or a missing conversation
/// are rejected before anything is written.
pub async fn send_message<S: DocumentStore>(
    store: &S,
    conversation: &ConversationId,
    sender: &UserId,
    text: &str,
) -> InboxResult<Message> {
    let text = normalize_text(text)?;
    let record = load_conversation(store, conversation).await?;
    if !record.is_participant(sender) {
        return Err(InboxError::NotParticipant {
            conversation: conversation.clone(),
            user: sender.clone(),
        });
    }

    let message_path = schema::messages(conversation)?.doc(&auto_id())?;
    let conversation_path = schema::conversation_doc(conversation)?;

    let mut message = Fields::new();
    message.insert(field::SENDER.into(), Value::String(sender.to_string()));
    message.insert(field::TEXT.into(), Value::String(text.clone()));

    let mut preview = Fields::new();
    preview.insert(field::LAST_MESSAGE.into(), Value::String(text.clone()));
    preview.insert(field::LAST_SENDER.into(), Value::String(sender.to_string()));

    let batch = WriteBatch::new()
        .push(Write::create(message_path.clone(), message).with_server_timestamp(field::CREATED_AT))
        .push(
            Write::patch(conversation_path, preview)
                .with_server_timestamp(field::LAST_MESSAGE_AT)
                .with_server_timestamp(field::UPDATED_AT),
        );

    let committed = match store.commit(batch).await {
        Ok(committed) => committed,
        Err(StoreError::NotFound(_)) => {
            return Err(InboxError::ConversationNotFound(conversation.clone()))
        }
        Err(e) => {
            tracing::error!(%conversation, %sender, error = %e, "send failed");
            return Err(e.into());
        }
    };
    tracing::debug!(%conversation, %sender, revision = committed.revision, "message sent");

    Ok(Message {
        id: MessageId(message_path.id().to_string()),
        sender: sender.clone(),
        text,
        created_at: committed.commit_time,
    })
}
