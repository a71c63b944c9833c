use chrono::Utc;
use iloved_common::identity::UserId;
use iloved_common::product::ProductId;
use iloved_common::wishlist::WishlistEntry;
use iloved_docstore::{to_fields, Direction, DocumentStore, Filter, Query, StoreError, Write};

use crate::catalog::get_product;
use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};
use crate::session::Session;

/// Save a product to the signed-in user's wishlist.
pub async fn add_to_wishlist<S: DocumentStore>(
    store: &S,
    session: &Session,
    product: &ProductId,
) -> InboxResult<WishlistEntry> {
    let listing = get_product(store, product).await?;
    let mut entry = WishlistEntry::for_product(session.user.clone(), &listing, Utc::now());
    let write = Write::create(schema::wishlist_doc(&session.user, product)?, to_fields(&entry)?)
        .with_server_timestamp(field::ADDED_AT);
    match store.commit(write.into()).await {
        Ok(committed) => entry.added_at = committed.commit_time,
        Err(StoreError::AlreadyExists(_)) => return Err(InboxError::AlreadyInWishlist(product.clone())),
        Err(e) => return Err(e.into()),
    }
    tracing::debug!(user = %session.user, %product, "added to wishlist");
    Ok(entry)
}

/// Most recently saved first.
pub async fn wishlist<S: DocumentStore>(store: &S, user: &UserId) -> InboxResult<Vec<WishlistEntry>> {
    let query = Query::all()
        .filter(Filter::eq(field::USER, user.as_str()))
        .order_by(field::ADDED_AT, Direction::Desc);
    store
        .query(&schema::wishlist()?, &query)
        .await?
        .iter()
        .map(schema::decode)
        .collect()
}

/// Removing a product that is not saved is a no-op.
pub async fn remove_from_wishlist<S: DocumentStore>(
    store: &S,
    session: &Session,
    product: &ProductId,
) -> InboxResult<()> {
    store
        .delete(&schema::wishlist_doc(&session.user, product)?)
        .await?;
    Ok(())
}
