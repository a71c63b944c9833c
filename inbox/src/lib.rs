//! Conversation and catalog operations for the iLoved marketplace.
//!
//! Every operation takes the store (and blob store where images are
//! involved) explicitly, and the acting user either as a [`Session`] or as
//! a plain [`UserId`](iloved_common::identity::UserId) where only identity
//! matters.

pub mod catalog;
pub mod chat;
pub mod directory;
pub mod error;
pub mod migrate;
pub mod profiles;
pub mod reports;
pub mod resolve;
pub mod schema;
pub mod send;
pub mod session;
pub mod wishlist;

pub use catalog::{
    add_product, adjust_stock, delete_product, get_product, get_product_versioned, list_products,
    products_by_seller, update_product, ImageUpload,
};
pub use chat::{subscribe_messages, ChatView};
pub use directory::{
    list_conversations, watch_conversations, ConversationSummary, DirectoryState, DirectoryWatch,
};
pub use error::{InboxError, InboxResult};
pub use migrate::{migrate_legacy, MigrationReport};
pub use profiles::{get_profile, profile_summary, resolve_profiles, set_profile_picture, upsert_profile};
pub use reports::report_product;
pub use resolve::{resolve_conversation, resolve_for_product, Resolution, ResolveOptions};
pub use send::{load_conversation, send_message};
pub use session::{Session, SessionFile};
pub use wishlist::{add_to_wishlist, remove_from_wishlist, wishlist};
