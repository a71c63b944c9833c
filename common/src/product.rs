use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{validate_segment, UserId};

/// Store-assigned product identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        validate_segment("product", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a listed item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    Clothing,
    Shoes,
    Accessories,
    Bags,
    Beauty,
    Other(String),
}

impl ProductCategory {
    /// Map a free-form category label (as entered by sellers) onto a category.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "clothing" | "clothes" => ProductCategory::Clothing,
            "shoes" | "footwear" => ProductCategory::Shoes,
            "accessories" => ProductCategory::Accessories,
            "bags" => ProductCategory::Bags,
            "beauty" => ProductCategory::Beauty,
            _ => ProductCategory::Other(label.trim().to_string()),
        }
    }
}

/// A product listing owned by a seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    /// Price in minor currency units (sen).
    pub price: u64,
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    pub seller: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// First image, used as the thumbnail in lists, wishlists and reports.
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Seller input for a new listing, before images are uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub price: u64,
    pub stock: u32,
}

impl NewProduct {
    /// Trim text fields and reject incomplete listings.
    pub fn validated(mut self, image_count: usize) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if self.description.is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if self.price == 0 {
            return Err(ValidationError::InvalidPrice);
        }
        if image_count == 0 {
            return Err(ValidationError::NoImages);
        }
        Ok(self)
    }
}

/// Partial edit of an existing listing. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ProductCategory>,
    pub price: Option<u64>,
    pub stock: Option<u32>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        *self == ProductPatch::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(ValidationError::MissingField("name"));
        }
        if matches!(&self.description, Some(d) if d.trim().is_empty()) {
            return Err(ValidationError::MissingField("description"));
        }
        if self.price == Some(0) {
            return Err(ValidationError::InvalidPrice);
        }
        Ok(())
    }
}
