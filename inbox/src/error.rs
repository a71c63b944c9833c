use iloved_common::conversation::ConversationId;
use iloved_common::identity::UserId;
use iloved_common::product::ProductId;
use iloved_common::ValidationError;
use iloved_docstore::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InboxError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("{user} is not a participant in conversation {conversation}")]
    NotParticipant {
        conversation: ConversationId,
        user: UserId,
    },

    #[error("buyer and seller must be different users")]
    SelfConversation,

    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("conversation id {0} already belongs to a different buyer, seller or product")]
    ConversationKeyCollision(ConversationId),

    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),

    #[error("{0} is not a seller")]
    NotSeller(UserId),

    #[error("{user} does not own product {product}")]
    NotOwner { user: UserId, product: ProductId },

    #[error(transparent)]
    Validation(ValidationError),

    #[error("product {0} is already in the wishlist")]
    AlreadyInWishlist(ProductId),

    #[error("not enough stock: {available} available")]
    InsufficientStock { available: u32 },

    #[error("{0} was modified concurrently")]
    Conflict(String),

    #[error("subscription closed")]
    SubscriptionClosed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session file: {0}")]
    SessionIo(#[from] std::io::Error),

    #[error("session data: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ValidationError> for InboxError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::EmptyMessage => InboxError::EmptyMessage,
            ValidationError::SelfConversation => InboxError::SelfConversation,
            ValidationError::InvalidEmail(raw) => InboxError::InvalidIdentity(raw),
            other => InboxError::Validation(other),
        }
    }
}

pub type InboxResult<T> = Result<T, InboxError>;
