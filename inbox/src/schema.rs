//! Where each record lives in the document store, and the field names the
//! core writes directly instead of through a serialized record.

use iloved_common::conversation::ConversationId;
use iloved_common::identity::UserId;
use iloved_common::product::ProductId;
use iloved_common::wishlist::WishlistEntry;
use iloved_docstore::{CollectionPath, DocPath, Document, StoreResult};
use serde::de::DeserializeOwned;

use crate::error::InboxResult;

pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";
pub const WISHLIST: &str = "wishlist";
pub const REPORTS: &str = "reports";
/// Pre-migration conversation records, one per contact, at the top level.
pub const LEGACY_CONVERSATIONS: &str = "messages";

pub const PRODUCT_IMAGES_PREFIX: &str = "product_images";
pub const PROFILE_PICTURES_PREFIX: &str = "profile_pictures";

pub mod field {
    pub const BUYER: &str = "buyer";
    pub const SELLER: &str = "seller";
    pub const EMAIL: &str = "email";
    pub const USER: &str = "user";
    pub const SENDER: &str = "sender";
    pub const TEXT: &str = "text";
    pub const CATEGORY: &str = "category";
    pub const STOCK: &str = "stock";
    pub const PROFILE_PICTURE: &str = "profile_picture";
    pub const LAST_MESSAGE: &str = "last_message";
    pub const LAST_SENDER: &str = "last_sender";
    pub const LAST_MESSAGE_AT: &str = "last_message_at";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const ADDED_AT: &str = "added_at";
}

pub fn users() -> StoreResult<CollectionPath> {
    CollectionPath::root(USERS)
}

pub fn user_doc(user: &UserId) -> StoreResult<DocPath> {
    users()?.doc(user.as_str())
}

pub fn products() -> StoreResult<CollectionPath> {
    CollectionPath::root(PRODUCTS)
}

pub fn product_doc(id: &ProductId) -> StoreResult<DocPath> {
    products()?.doc(id.as_str())
}

pub fn conversations() -> StoreResult<CollectionPath> {
    CollectionPath::root(CONVERSATIONS)
}

pub fn conversation_doc(id: &ConversationId) -> StoreResult<DocPath> {
    conversations()?.doc(id.as_str())
}

pub fn messages(conversation: &ConversationId) -> StoreResult<CollectionPath> {
    conversation_doc(conversation)?.child(MESSAGES)
}

pub fn wishlist() -> StoreResult<CollectionPath> {
    CollectionPath::root(WISHLIST)
}

pub fn wishlist_doc(user: &UserId, product: &ProductId) -> StoreResult<DocPath> {
    wishlist()?.doc(&WishlistEntry::doc_id(user, product))
}

pub fn reports() -> StoreResult<CollectionPath> {
    CollectionPath::root(REPORTS)
}

pub fn legacy_conversations() -> StoreResult<CollectionPath> {
    CollectionPath::root(LEGACY_CONVERSATIONS)
}

pub(crate) fn decode<T: DeserializeOwned>(doc: &Document) -> InboxResult<T> {
    Ok(doc.decode()?)
}
