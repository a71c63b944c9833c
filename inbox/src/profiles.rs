use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use iloved_common::identity::UserId;
use iloved_common::profile::{ProfileSummary, UserProfile};
use iloved_docstore::{
    to_fields, BlobStore, DocumentStore, Fields, Filter, Precondition, Query, StoreError, Write,
};
use serde_json::Value;

use crate::catalog::ImageUpload;
use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};
use crate::session::Session;

/// Most values a single `IN` filter may carry.
const PROFILE_BATCH: usize = 30;

pub async fn get_profile<S: DocumentStore>(store: &S, user: &UserId) -> InboxResult<Option<UserProfile>> {
    match store.get(&schema::user_doc(user)?).await? {
        Some(doc) => Ok(Some(schema::decode(&doc)?)),
        None => Ok(None),
    }
}

/// Display name and avatar of one user, with fallbacks when the profile is missing.
pub async fn profile_summary<S: DocumentStore>(store: &S, user: &UserId) -> InboxResult<ProfileSummary> {
    Ok(match get_profile(store, user).await? {
        Some(profile) => ProfileSummary::from(&profile),
        None => ProfileSummary::unknown(user.clone()),
    })
}

/// Resolve many users with batched `IN` queries on the email field.
/// Every requested user gets an entry; missing profiles get the fallbacks.
pub async fn resolve_profiles<S: DocumentStore>(
    store: &S,
    users: BTreeSet<UserId>,
) -> InboxResult<HashMap<UserId, ProfileSummary>> {
    let collection = schema::users()?;
    let wanted: Vec<UserId> = users.into_iter().collect();
    let mut resolved = HashMap::with_capacity(wanted.len());

    for chunk in wanted.chunks(PROFILE_BATCH) {
        let query = Query::all().filter(Filter::one_of(
            field::EMAIL,
            chunk.iter().map(|u| u.as_str()),
        ));
        for doc in store.query(&collection, &query).await? {
            match schema::decode::<UserProfile>(&doc) {
                Ok(profile) => {
                    resolved.insert(profile.email.clone(), ProfileSummary::from(&profile));
                }
                Err(e) => tracing::warn!(id = %doc.id, error = %e, "skipping unreadable profile"),
            }
        }
    }

    for user in wanted {
        resolved
            .entry(user.clone())
            .or_insert_with(|| ProfileSummary::unknown(user));
    }
    Ok(resolved)
}

/// Create a profile, or update name, seller flag and picture of an existing
/// one. The original `created_at` is kept.
pub async fn upsert_profile<S: DocumentStore>(store: &S, profile: &UserProfile) -> InboxResult<UserProfile> {
    let path = schema::user_doc(&profile.email)?;
    let mut fields = to_fields(profile)?;
    let write = match store.get(&path).await? {
        Some(existing) => {
            fields.remove(field::CREATED_AT);
            if profile.profile_picture.is_none() {
                fields.remove(field::PROFILE_PICTURE);
            }
            Write::patch(path.clone(), fields)
                .with_precondition(Precondition::Version(existing.version))
        }
        None => Write::create(path.clone(), fields).with_server_timestamp(field::CREATED_AT),
    };
    match store.commit(write.into()).await {
        Ok(_) => {}
        Err(e) if e.is_conflict() => return Err(InboxError::Conflict(path.to_string())),
        Err(e) => return Err(e.into()),
    }
    tracing::info!(user = %profile.email, "profile saved");

    let doc = store
        .get(&path)
        .await?
        .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
    schema::decode(&doc)
}

/// Upload a new profile picture for the signed-in user and point the profile at it.
pub async fn set_profile_picture<S: DocumentStore, B: BlobStore>(
    store: &S,
    blobs: &B,
    session: &Session,
    image: ImageUpload,
) -> InboxResult<String> {
    let path = schema::user_doc(&session.user)?;
    if store.get(&path).await?.is_none() {
        return Err(StoreError::NotFound(path.to_string()).into());
    }

    let blob_path = format!(
        "{}/{}_{}",
        schema::PROFILE_PICTURES_PREFIX,
        session.user,
        Utc::now().timestamp_millis()
    );
    let url = blobs
        .upload(&blob_path, image.bytes, &image.content_type)
        .await?;

    let mut fields = Fields::new();
    fields.insert(field::PROFILE_PICTURE.into(), Value::String(url.clone()));
    store.patch(&path, fields).await?;
    tracing::info!(user = %session.user, "profile picture updated");
    Ok(url)
}
