use chrono::Utc;
use iloved_common::identity::UserId;
use iloved_common::product::{NewProduct, Product, ProductCategory, ProductId, ProductPatch};
use iloved_docstore::{
    auto_id, to_fields, BlobStore, Direction, Document, DocumentStore, Fields, Filter, Precondition, Query,
    StoreError, Write,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};
use crate::session::Session;

/// Attempts at a version-checked stock update before giving up.
const STOCK_RETRIES: usize = 5;

/// An image to attach, as picked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

/// Newest listings first, optionally limited to one category and to names
/// containing `search` (case-insensitive). A blank search matches everything.
pub async fn list_products<S: DocumentStore>(
    store: &S,
    category: Option<&ProductCategory>,
    search: Option<&str>,
) -> InboxResult<Vec<Product>> {
    let mut query = Query::all().order_by(field::CREATED_AT, Direction::Desc);
    if let Some(category) = category {
        query = query.filter(Filter::Eq(
            field::CATEGORY.into(),
            serde_json::to_value(category)?,
        ));
    }
    let products = decode_all(store.query(&schema::products()?, &query).await?)?;
    let needle = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
    Ok(match needle {
        Some(needle) => products
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect(),
        None => products,
    })
}

pub async fn products_by_seller<S: DocumentStore>(store: &S, seller: &UserId) -> InboxResult<Vec<Product>> {
    let query = Query::all()
        .filter(Filter::eq(field::SELLER, seller.as_str()))
        .order_by(field::CREATED_AT, Direction::Desc);
    decode_all(store.query(&schema::products()?, &query).await?)
}

fn decode_all(docs: Vec<Document>) -> InboxResult<Vec<Product>> {
    docs.iter().map(schema::decode).collect()
}

pub async fn get_product<S: DocumentStore>(store: &S, id: &ProductId) -> InboxResult<Product> {
    Ok(get_product_versioned(store, id).await?.0)
}

/// The product together with its document version, for optimistic edits.
pub async fn get_product_versioned<S: DocumentStore>(
    store: &S,
    id: &ProductId,
) -> InboxResult<(Product, u64)> {
    let doc = store
        .get(&schema::product_doc(id)?)
        .await?
        .ok_or_else(|| InboxError::ProductNotFound(id.clone()))?;
    Ok((schema::decode(&doc)?, doc.version))
}

fn require_owner(session: &Session, product: &Product) -> InboxResult<()> {
    if product.seller != session.user {
        return Err(InboxError::NotOwner {
            user: session.user.clone(),
            product: product.id.clone(),
        });
    }
    Ok(())
}

/// List a new product: upload its images, then create the listing.
pub async fn add_product<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
    session: &Session,
    draft: NewProduct,
    images: Vec<ImageUpload>,
) -> InboxResult<Product> {
    session.require_seller()?;
    let draft = draft.validated(images.len())?;

    let stamp = Utc::now().timestamp_millis();
    let mut urls = Vec::with_capacity(images.len());
    for (n, image) in images.into_iter().enumerate() {
        let path = format!(
            "{}/{}_{stamp}_{n}",
            schema::PRODUCT_IMAGES_PREFIX,
            session.user
        );
        match blobs.upload(&path, image.bytes, &image.content_type).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                discard_images(blobs, &urls).await;
                return Err(e.into());
            }
        }
    }

    let id = ProductId(auto_id());
    let now = Utc::now();
    let product = Product {
        id: id.clone(),
        name: draft.name,
        description: draft.description,
        category: draft.category,
        price: draft.price,
        stock: draft.stock,
        images: urls,
        seller: session.user.clone(),
        created_at: now,
        updated_at: now,
    };
    let write = Write::create(schema::product_doc(&id)?, to_fields(&product)?)
        .with_server_timestamp(field::CREATED_AT)
        .with_server_timestamp(field::UPDATED_AT);
    if let Err(e) = store.commit(write.into()).await {
        discard_images(blobs, &product.images).await;
        return Err(e.into());
    }
    tracing::info!(product = %id, seller = %session.user, "product listed");

    get_product(store, &id).await
}

/// Remove images uploaded for a listing that never got created.
async fn discard_images<B: BlobStore>(blobs: &B, urls: &[String]) {
    for url in urls {
        if let Err(e) = blobs.delete(url).await {
            tracing::warn!(%url, error = %e, "could not remove orphaned image");
        }
    }
}

/// Apply an edit made against `expected_version` of the listing. If anyone
/// changed the listing since, the edit is refused with `Conflict`.
pub async fn update_product<S: DocumentStore>(
    store: &S,
    session: &Session,
    id: &ProductId,
    patch: ProductPatch,
    expected_version: u64,
) -> InboxResult<Product> {
    session.require_seller()?;
    patch.validate()?;
    let (product, _) = get_product_versioned(store, id).await?;
    require_owner(session, &product)?;
    if patch.is_empty() {
        return Ok(product);
    }

    let mut fields = Fields::new();
    if let Some(name) = &patch.name {
        fields.insert("name".into(), Value::String(name.trim().to_string()));
    }
    if let Some(description) = &patch.description {
        fields.insert("description".into(), Value::String(description.trim().to_string()));
    }
    if let Some(category) = &patch.category {
        fields.insert(field::CATEGORY.into(), serde_json::to_value(category)?);
    }
    if let Some(price) = patch.price {
        fields.insert("price".into(), Value::from(price));
    }
    if let Some(stock) = patch.stock {
        fields.insert(field::STOCK.into(), Value::from(stock));
    }

    let path = schema::product_doc(id)?;
    let write = Write::patch(path.clone(), fields)
        .with_precondition(Precondition::Version(expected_version))
        .with_server_timestamp(field::UPDATED_AT);
    match store.commit(write.into()).await {
        Ok(_) => {}
        Err(e) if e.is_conflict() => {
            tracing::debug!(product = %id, expected_version, "stale product edit");
            return Err(InboxError::Conflict(path.to_string()));
        }
        Err(StoreError::NotFound(_)) => return Err(InboxError::ProductNotFound(id.clone())),
        Err(e) => return Err(e.into()),
    }
    get_product(store, id).await
}

/// Change stock by `delta`. Sellers restock their own listings; anyone may
/// take stock (a purchase). Stock never drops below zero.
pub async fn adjust_stock<S: DocumentStore>(
    store: &S,
    session: &Session,
    id: &ProductId,
    delta: i64,
) -> InboxResult<Product> {
    let path = schema::product_doc(id)?;
    for attempt in 1..=STOCK_RETRIES {
        let (mut product, version) = get_product_versioned(store, id).await?;
        if delta > 0 {
            require_owner(session, &product)?;
        }
        let next = i64::from(product.stock).saturating_add(delta);
        if next < 0 {
            return Err(InboxError::InsufficientStock {
                available: product.stock,
            });
        }
        let next = u32::try_from(next).unwrap_or(u32::MAX);

        let mut fields = Fields::new();
        fields.insert(field::STOCK.into(), Value::from(next));
        let write = Write::patch(path.clone(), fields)
            .with_precondition(Precondition::Version(version))
            .with_server_timestamp(field::UPDATED_AT);
        match store.commit(write.into()).await {
            Ok(committed) => {
                product.stock = next;
                product.updated_at = committed.commit_time;
                tracing::debug!(product = %id, stock = next, attempt, "stock adjusted");
                return Ok(product);
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(product = %id, attempt, "stock changed concurrently, retrying");
            }
            Err(StoreError::NotFound(_)) => return Err(InboxError::ProductNotFound(id.clone())),
            Err(e) => return Err(e.into()),
        }
    }
    tracing::warn!(product = %id, "giving up on stock adjustment");
    Err(InboxError::Conflict(path.to_string()))
}

pub async fn delete_product<S: DocumentStore>(store: &S, session: &Session, id: &ProductId) -> InboxResult<()> {
    session.require_seller()?;
    let (product, version) = get_product_versioned(store, id).await?;
    require_owner(session, &product)?;
    let write = Write::delete(schema::product_doc(id)?).with_precondition(Precondition::Version(version));
    match store.commit(write.into()).await {
        Ok(_) => {
            tracing::info!(product = %id, "product deleted");
            Ok(())
        }
        Err(e) if e.is_conflict() => Err(InboxError::Conflict(id.to_string())),
        Err(e) => Err(e.into()),
    }
}
