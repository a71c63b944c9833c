//! Find-or-create of the conversation behind "Contact seller" and "Buy now".
//!
//! The conversation id is derived from the (buyer, seller, product) triple,
//! so resolution is a keyed create with a "must not exist" precondition.
//! Whoever loses a creation race simply reads the winner's record.

use chrono::Utc;
use iloved_common::conversation::{check_participants, Conversation, ConversationId};
use iloved_common::identity::UserId;
use iloved_common::product::ProductId;
use iloved_docstore::{to_fields, DocumentStore, StoreError, Write};

use crate::catalog::get_product;
use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};
use crate::send::{load_conversation, send_message};

/// Opening line sent by the buyer when a conversation is first created.
pub const DEFAULT_GREETING: &str = "Hi, I am interested in your product!";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Sent as the buyer's first message, only when the conversation is new.
    pub greeting: Option<String>,
}

impl ResolveOptions {
    pub fn with_greeting(text: impl Into<String>) -> Self {
        Self {
            greeting: Some(text.into()),
        }
    }

    pub fn default_greeting() -> Self {
        Self::with_greeting(DEFAULT_GREETING)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub conversation: Conversation,
    /// Whether this call created the conversation.
    pub created: bool,
}

/// Resolve the conversation a buyer opens from a product page. The seller
/// is whoever listed the product.
pub async fn resolve_for_product<S: DocumentStore>(
    store: &S,
    buyer: &UserId,
    product: &ProductId,
    options: &ResolveOptions,
) -> InboxResult<Resolution> {
    let listing = get_product(store, product).await?;
    resolve_conversation(store, buyer, &listing.seller, product, options).await
}

pub async fn resolve_conversation<S: DocumentStore>(
    store: &S,
    buyer: &UserId,
    seller: &UserId,
    product: &ProductId,
    options: &ResolveOptions,
) -> InboxResult<Resolution> {
    check_participants(buyer, seller)?;
    let id = ConversationId::compose(buyer, seller, product);
    let path = schema::conversation_doc(&id)?;

    let created = match store.get(&path).await? {
        Some(_) => false,
        None => {
            let now = Utc::now();
            let draft = Conversation {
                id: id.clone(),
                buyer: buyer.clone(),
                seller: seller.clone(),
                product: product.clone(),
                last_message: String::new(),
                last_sender: None,
                last_message_at: None,
                created_at: now,
                updated_at: now,
            };
            let write = Write::create(path, to_fields(&draft)?)
                .with_server_timestamp(field::CREATED_AT)
                .with_server_timestamp(field::UPDATED_AT);
            match store.commit(write.into()).await {
                Ok(_) => true,
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!(conversation = %id, "created concurrently, reusing");
                    false
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let mut conversation = load_conversation(store, &id).await?;
    if !conversation.matches(buyer, seller, product) {
        tracing::warn!(conversation = %id, "conversation id collision");
        return Err(InboxError::ConversationKeyCollision(id));
    }

    if created {
        tracing::info!(conversation = %id, "conversation created");
        if let Some(greeting) = &options.greeting {
            // The conversation exists either way; a lost greeting is not retried.
            match send_message(store, &id, buyer, greeting).await {
                Ok(_) => conversation = load_conversation(store, &id).await?,
                Err(e) => tracing::warn!(conversation = %id, error = %e, "greeting not sent"),
            }
        }
    }

    Ok(Resolution {
        conversation,
        created,
    })
}
