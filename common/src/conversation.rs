use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{validate_segment, Role, UserId};
use crate::product::ProductId;

/// Shown in conversation lists when nothing has been said yet.
pub const EMPTY_PREVIEW_LABEL: &str = "No messages yet";

/// Conversation identifier.
///
/// Composed deterministically from the (buyer, seller, product) triple so
/// that contacting the same seller about the same item always lands in the
/// same conversation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn compose(buyer: &UserId, seller: &UserId, product: &ProductId) -> Self {
        Self(format!("{buyer}_{seller}_{product}"))
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate_segment("conversation", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One buyer talking to one seller about one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub buyer: UserId,
    pub seller: UserId,
    pub product: ProductId,
    /// Text of the most recently appended message, empty until the first one.
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_sender: Option<UserId>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user: &UserId) -> bool {
        self.buyer == *user || self.seller == *user
    }

    /// The other participant, or `None` if `user` is not in this conversation.
    pub fn counterparty(&self, user: &UserId) -> Option<&UserId> {
        if self.buyer == *user {
            Some(&self.seller)
        } else if self.seller == *user {
            Some(&self.buyer)
        } else {
            None
        }
    }

    pub fn role_of(&self, user: &UserId) -> Option<Role> {
        if self.buyer == *user {
            Some(Role::Buying)
        } else if self.seller == *user {
            Some(Role::Selling)
        } else {
            None
        }
    }

    /// Whether this record belongs to the given triple.
    pub fn matches(&self, buyer: &UserId, seller: &UserId, product: &ProductId) -> bool {
        self.buyer == *buyer && self.seller == *seller && self.product == *product
    }

    pub fn preview_label(&self) -> &str {
        if self.last_message.is_empty() {
            EMPTY_PREVIEW_LABEL
        } else {
            &self.last_message
        }
    }
}

/// Reject a triple that would put a user in a conversation with themselves.
pub fn check_participants(buyer: &UserId, seller: &UserId) -> Result<(), ValidationError> {
    if buyer == seller {
        return Err(ValidationError::SelfConversation);
    }
    Ok(())
}
