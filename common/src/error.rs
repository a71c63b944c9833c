use thiserror::Error;

/// Input rejected before anything is written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("'{raw}' is not a valid {kind} id")]
    InvalidId { kind: &'static str, raw: String },

    #[error("message text is empty")]
    EmptyMessage,

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("price must be greater than zero")]
    InvalidPrice,

    #[error("a product needs at least one image")]
    NoImages,

    #[error("buyer and seller must be different users")]
    SelfConversation,
}
