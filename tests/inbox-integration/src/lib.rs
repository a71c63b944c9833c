use std::time::Duration;

use iloved_common::identity::UserId;
use iloved_common::product::{NewProduct, ProductCategory};
use iloved_docstore::{CollectionPath, DocumentStore, Fields, MemoryStore};
use iloved_inbox::ImageUpload;
use tokio::sync::watch;
use tokio::time::Instant;

pub mod harness;

/// Parse an email known to be valid.
pub fn user(email: &str) -> UserId {
    UserId::parse(email).unwrap_or_else(|e| panic!("bad test email {email}: {e}"))
}

/// A listing draft with sensible defaults.
pub fn make_dummy_product(name: &str, price: u64, stock: u32) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: format!("Pre-loved {name}"),
        category: ProductCategory::Clothing,
        price,
        stock,
    }
}

pub fn make_dummy_image() -> ImageUpload {
    ImageUpload::new(vec![0x89, b'P', b'N', b'G'], "image/png")
}

/// Write a raw record, bypassing the typed operations. Used to seed legacy
/// data and malformed documents.
pub async fn put_raw(store: &MemoryStore, collection: &str, id: &str, value: serde_json::Value) {
    let fields: Fields = value
        .as_object()
        .cloned()
        .unwrap_or_else(|| panic!("raw record for {collection}/{id} must be an object"));
    let path = CollectionPath::parse(collection)
        .and_then(|c| c.doc(id))
        .unwrap_or_else(|e| panic!("bad path {collection}/{id}: {e}"));
    store.create_at(&path, fields).await.unwrap();
}

/// Wait until the watched value satisfies `predicate`, or give up after
/// `timeout`. Returns the matching value.
pub async fn wait_for_state<T, F>(rx: &mut watch::Receiver<T>, timeout: Duration, predicate: F) -> Option<T>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let deadline = Instant::now() + timeout;
    match tokio::time::timeout_at(deadline, rx.wait_for(|v| predicate(v))).await {
        Ok(Ok(value)) => Some(value.clone()),
        Ok(Err(_)) => {
            tracing::debug!("wait_for_state: sender dropped");
            None
        }
        Err(_) => None,
    }
}
