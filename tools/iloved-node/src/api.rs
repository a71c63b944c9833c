use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use iloved_common::conversation::ConversationId;
use iloved_common::currency::{format_price, parse_price};
use iloved_common::identity::UserId;
use iloved_common::message::Message;
use iloved_common::product::{NewProduct, Product, ProductCategory, ProductId, ProductPatch};
use iloved_common::profile::UserProfile;
use iloved_common::report::Report;
use iloved_common::wishlist::WishlistEntry;
use iloved_docstore::{BlobStore, MemoryBlobStore, MemoryStore, StoreError};
use iloved_inbox::{
    ChatView, ConversationSummary, ImageUpload, InboxError, Resolution, ResolveOptions, Session,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/users/{user}", get(get_profile_handler).put(put_profile_handler))
        .route("/conversations", get(list_conversations_handler))
        .route("/conversations/resolve", post(resolve_handler))
        .route(
            "/conversations/{id}/messages",
            get(list_messages_handler).post(send_handler),
        )
        .route("/conversations/{id}/live", get(live_handler))
        .route("/products", get(list_products_handler).post(add_product_handler))
        .route(
            "/products/{id}",
            get(get_product_handler)
                .patch(update_product_handler)
                .delete(delete_product_handler),
        )
        .route("/products/{id}/stock", post(adjust_stock_handler))
        .route("/products/{id}/report", post(report_handler))
        .route("/wishlist", get(wishlist_handler).post(add_wishlist_handler))
        .route("/wishlist/{product}", delete(remove_wishlist_handler))
        .route("/blobs/{*path}", get(blob_handler))
        .route("/migrate", post(migrate_handler))
        .layer(cors)
        .with_state(state)
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub enum ApiError {
    Inbox(InboxError),
    BadRequest(String),
    NotFound(String),
}

impl From<InboxError> for ApiError {
    fn from(e: InboxError) -> Self {
        ApiError::Inbox(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Inbox(e.into())
    }
}

fn inbox_status(e: &InboxError) -> StatusCode {
    match e {
        InboxError::EmptyMessage
        | InboxError::SelfConversation
        | InboxError::InvalidIdentity(_)
        | InboxError::Validation(_)
        | InboxError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
        InboxError::NotParticipant { .. } | InboxError::NotSeller(_) | InboxError::NotOwner { .. } => {
            StatusCode::FORBIDDEN
        }
        InboxError::ConversationNotFound(_)
        | InboxError::ProductNotFound(_)
        | InboxError::Store(StoreError::NotFound(_))
        | InboxError::Store(StoreError::BlobNotFound(_)) => StatusCode::NOT_FOUND,
        InboxError::AlreadyInWishlist(_)
        | InboxError::Conflict(_)
        | InboxError::ConversationKeyCollision(_) => StatusCode::CONFLICT,
        InboxError::Store(e) if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Inbox(e) => {
                let status = inbox_status(&e);
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                }
                (status, e.to_string())
            }
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, error),
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, error),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The acting user. Unknown users act as non-sellers.
async fn session_for(state: &AppState, user: &UserId) -> ApiResult<Session> {
    Ok(match iloved_inbox::get_profile(&*state.store, user).await? {
        Some(profile) => Session::from_profile(&profile),
        None => Session::new(user.clone(), "", false),
    })
}

// ─── Health ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    revision: u64,
    listeners: usize,
    blobs: usize,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        revision: state.store.revision(),
        listeners: state.store.active_listeners(),
        blobs: state.blobs.len(),
    })
}

// ─── Profiles ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProfileRequest {
    name: String,
    #[serde(default)]
    profile_picture: Option<String>,
    #[serde(default)]
    is_seller: bool,
}

async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(user): Path<UserId>,
) -> ApiResult<Json<UserProfile>> {
    match iloved_inbox::get_profile(&*state.store, &user).await? {
        Some(profile) => Ok(Json(profile)),
        None => Err(ApiError::NotFound(format!("no profile for '{user}'"))),
    }
}

async fn put_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(user): Path<UserId>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let profile = UserProfile {
        email: user,
        name,
        profile_picture: req.profile_picture,
        is_seller: req.is_seller,
        created_at: Utc::now(),
    };
    Ok(Json(iloved_inbox::upsert_profile(&*state.store, &profile).await?))
}

// ─── Conversations ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserParam {
    user: UserId,
}

#[derive(Deserialize)]
struct ViewerParam {
    viewer: UserId,
}

#[derive(Deserialize)]
struct ResolveRequest {
    buyer: UserId,
    product: ProductId,
    /// Taken from the product listing when absent.
    #[serde(default)]
    seller: Option<UserId>,
    /// First message sent on the buyer's behalf when the conversation is new.
    #[serde(default)]
    greeting: Option<String>,
}

#[derive(Serialize)]
struct ResolveResponse {
    conversation: iloved_common::conversation::Conversation,
    created: bool,
}

impl From<Resolution> for ResolveResponse {
    fn from(r: Resolution) -> Self {
        Self {
            conversation: r.conversation,
            created: r.created,
        }
    }
}

#[derive(Deserialize)]
struct SendRequest {
    sender: UserId,
    text: String,
}

async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParam>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(iloved_inbox::list_conversations(&*state.store, &params.user).await?))
}

async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    let options = ResolveOptions {
        greeting: req.greeting,
    };
    let resolution = match req.seller {
        Some(seller) => {
            iloved_inbox::resolve_conversation(&*state.store, &req.buyer, &seller, &req.product, &options)
                .await?
        }
        None => iloved_inbox::resolve_for_product(&*state.store, &req.buyer, &req.product, &options).await?,
    };
    tracing::info!(
        conversation = %resolution.conversation.id,
        created = resolution.created,
        "conversation resolved"
    );
    Ok(Json(resolution.into()))
}

async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
    Query(params): Query<ViewerParam>,
) -> ApiResult<Json<Vec<Message>>> {
    let view = ChatView::open(&*state.store, &id, &params.viewer).await?;
    let messages = view.messages();
    view.close();
    Ok(Json(messages))
}

async fn send_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
    Json(req): Json<SendRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let message = iloved_inbox::send_message(&*state.store, &id, &req.sender, &req.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn live_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ConversationId>,
    Query(params): Query<ViewerParam>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let view = ChatView::open(&*state.store, &id, &params.viewer).await?;
    Ok(ws.on_upgrade(move |socket| stream_messages(socket, view)))
}

/// Push the full message list on connect and after every change until
/// either side goes away.
async fn stream_messages(socket: WebSocket, mut view: ChatView) {
    let conversation = view.conversation().id.clone();
    let (mut outgoing, mut incoming) = socket.split();
    let mut current = view.messages();

    'stream: loop {
        let payload = match serde_json::to_string(&current) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(%conversation, error = %e, "failed to encode messages");
                break;
            }
        };
        if outgoing.send(WsMessage::Text(payload.into())).await.is_err() {
            break;
        }

        loop {
            tokio::select! {
                changed = view.changed() => match changed {
                    Ok(list) => {
                        current = list;
                        continue 'stream;
                    }
                    Err(_) => break 'stream,
                },
                frame = incoming.next() => match frame {
                    None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break 'stream,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    tracing::debug!(%conversation, "live feed closed");
    view.close();
}

// ─── Products ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ProductView {
    #[serde(flatten)]
    product: Product,
    /// Document version to send back as `expected_version` when editing.
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
    price_label: String,
}

impl ProductView {
    fn new(product: Product, version: Option<u64>) -> Self {
        let price_label = format_price(product.price);
        Self {
            product,
            version,
            price_label,
        }
    }
}

#[derive(Deserialize)]
struct ProductListParams {
    #[serde(default)]
    category: Option<String>,
    /// Case-insensitive name search.
    #[serde(default)]
    q: Option<String>,
}

#[derive(Deserialize)]
struct ImagePayload {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
struct AddProductRequest {
    seller: UserId,
    name: String,
    description: String,
    category: String,
    /// Ringgit amount as typed, e.g. "45.90".
    price: String,
    stock: u32,
    images: Vec<ImagePayload>,
}

#[derive(Deserialize)]
struct UpdateProductRequest {
    seller: UserId,
    expected_version: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    stock: Option<u32>,
}

#[derive(Deserialize)]
struct StockRequest {
    user: UserId,
    delta: i64,
}

#[derive(Deserialize)]
struct ReportRequest {
    reporter: UserId,
    reason: String,
    #[serde(default)]
    details: String,
}

fn price_from(raw: &str) -> ApiResult<u64> {
    parse_price(raw).map_err(|e| ApiError::Inbox(e.into()))
}

async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductListParams>,
) -> ApiResult<Json<Vec<ProductView>>> {
    let category = params.category.as_deref().map(ProductCategory::from_label);
    let products =
        iloved_inbox::list_products(&*state.store, category.as_ref(), params.q.as_deref()).await?;
    Ok(Json(products.into_iter().map(|p| ProductView::new(p, None)).collect()))
}

async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
) -> ApiResult<Json<ProductView>> {
    let (product, version) = iloved_inbox::get_product_versioned(&*state.store, &id).await?;
    Ok(Json(ProductView::new(product, Some(version))))
}

async fn add_product_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddProductRequest>,
) -> ApiResult<(StatusCode, Json<ProductView>)> {
    let session = session_for(&state, &req.seller).await?;
    let draft = NewProduct {
        name: req.name,
        description: req.description,
        category: ProductCategory::from_label(&req.category),
        price: price_from(&req.price)?,
        stock: req.stock,
    };
    let images = req
        .images
        .into_iter()
        .map(|image| ImageUpload::new(image.bytes, image.content_type))
        .collect();
    let product = iloved_inbox::add_product(&*state.store, &*state.blobs, &session, draft, images).await?;
    Ok((StatusCode::CREATED, Json(ProductView::new(product, Some(1)))))
}

async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
    Json(req): Json<UpdateProductRequest>,
) -> ApiResult<Json<ProductView>> {
    let session = session_for(&state, &req.seller).await?;
    let patch = ProductPatch {
        name: req.name,
        description: req.description,
        category: req.category.as_deref().map(ProductCategory::from_label),
        price: req.price.as_deref().map(price_from).transpose()?,
        stock: req.stock,
    };
    iloved_inbox::update_product(&*state.store, &session, &id, patch, req.expected_version).await?;
    let (product, version) = iloved_inbox::get_product_versioned(&*state.store, &id).await?;
    Ok(Json(ProductView::new(product, Some(version))))
}

async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
    Query(params): Query<UserParam>,
) -> ApiResult<StatusCode> {
    let session = session_for(&state, &params.user).await?;
    iloved_inbox::delete_product(&*state.store, &session, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn adjust_stock_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
    Json(req): Json<StockRequest>,
) -> ApiResult<Json<ProductView>> {
    let session = session_for(&state, &req.user).await?;
    iloved_inbox::adjust_stock(&*state.store, &session, &id, req.delta).await?;
    let (product, version) = iloved_inbox::get_product_versioned(&*state.store, &id).await?;
    Ok(Json(ProductView::new(product, Some(version))))
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
    Json(req): Json<ReportRequest>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let session = session_for(&state, &req.reporter).await?;
    let report = iloved_inbox::report_product(&*state.store, &session, &id, &req.reason, &req.details).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// ─── Wishlist ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct WishlistRequest {
    user: UserId,
    product: ProductId,
}

async fn wishlist_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserParam>,
) -> ApiResult<Json<Vec<WishlistEntry>>> {
    Ok(Json(iloved_inbox::wishlist(&*state.store, &params.user).await?))
}

async fn add_wishlist_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WishlistRequest>,
) -> ApiResult<(StatusCode, Json<WishlistEntry>)> {
    let session = session_for(&state, &req.user).await?;
    let entry = iloved_inbox::add_to_wishlist(&*state.store, &session, &req.product).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_wishlist_handler(
    State(state): State<Arc<AppState>>,
    Path(product): Path<ProductId>,
    Query(params): Query<UserParam>,
) -> ApiResult<StatusCode> {
    let session = session_for(&state, &params.user).await?;
    iloved_inbox::remove_from_wishlist(&*state.store, &session, &product).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Blobs ──────────────────────────────────────────────────────────────────

async fn blob_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let blob = state.blobs.download(&state.blobs.url_for(&path)).await?;
    Ok(([(header::CONTENT_TYPE, blob.content_type)], Body::from(blob.bytes)).into_response())
}

// ─── Maintenance ────────────────────────────────────────────────────────────

async fn migrate_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<iloved_inbox::MigrationReport>> {
    Ok(Json(iloved_inbox::migrate_legacy(&*state.store).await?))
}
