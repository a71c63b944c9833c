use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::product::{Product, ProductId};

/// A product saved by a buyer. One entry per (user, product) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub user: UserId,
    pub product: ProductId,
    pub name: String,
    pub price: u64,
    #[serde(default)]
    pub image: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl WishlistEntry {
    /// Snapshot the product's display fields at the time it was saved.
    pub fn for_product(user: UserId, product: &Product, added_at: DateTime<Utc>) -> Self {
        Self {
            user,
            product: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            image: product.cover_image().map(str::to_string),
            added_at,
        }
    }

    /// Document id; deterministic so a product can only be saved once.
    pub fn doc_id(user: &UserId, product: &ProductId) -> String {
        format!("{user}_{product}")
    }
}
