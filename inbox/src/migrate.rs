//! One-off conversion of pre-migration conversation records.
//!
//! Older clients kept one top-level `messages/{id}` record per contact with
//! camelCase participant fields and the messages either embedded in a
//! `convert` array or stored in a `messages/{id}/messages` subcollection.
//! Each record is folded into the canonical conversation for its
//! (buyer, seller, product) triple and then tagged with `migratedTo`, which
//! makes the migration safe to re-run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use iloved_common::conversation::{check_participants, Conversation, ConversationId};
use iloved_common::identity::UserId;
use iloved_common::message::{normalize_text, Message};
use iloved_common::product::ProductId;
use iloved_docstore::{
    auto_id, to_fields, Document, DocumentStore, Fields, Precondition, Query, Write, WriteBatch,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InboxError, InboxResult};
use crate::schema::{self, field};

/// Marker written onto a legacy record once it has been folded in.
pub const MIGRATED_TO: &str = "migratedTo";

/// Attempts per legacy record when a concurrent writer touches the target.
const MIGRATION_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Legacy records folded into a canonical conversation.
    pub migrated: usize,
    /// Legacy records that could not be migrated.
    pub skipped: usize,
    pub messages_imported: usize,
    /// Legacy messages left out: duplicates, unknown senders, blank text.
    pub dropped: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyTimestamp {
    Parts {
        seconds: i64,
        #[serde(default)]
        nanoseconds: u32,
    },
    Text(DateTime<Utc>),
}

impl LegacyTimestamp {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            LegacyTimestamp::Parts {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(*seconds, *nanoseconds),
            LegacyTimestamp::Text(at) => Some(*at),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMessage {
    #[serde(default)]
    sender_id: String,
    #[serde(default)]
    text: String,
    created_at: Option<LegacyTimestamp>,
}

impl LegacyMessage {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_ref().and_then(LegacyTimestamp::to_utc)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConversation {
    #[serde(rename = "buyer_id")]
    buyer_id: Option<String>,
    #[serde(rename = "seller_id")]
    seller_id: Option<String>,
    product_id: Option<String>,
    #[serde(default)]
    last_message: Option<String>,
    created_at: Option<LegacyTimestamp>,
    #[serde(default)]
    convert: Vec<LegacyMessage>,
    migrated_to: Option<String>,
}

/// A legacy message that survived normalization.
struct Imported {
    sender: UserId,
    text: String,
    at: DateTime<Utc>,
}

type MessageKey = (UserId, String, DateTime<Utc>);

fn key_of(message: &Imported) -> MessageKey {
    (message.sender.clone(), message.text.clone(), message.at)
}

/// Fold every unmigrated legacy record into the canonical schema.
pub async fn migrate_legacy<S: DocumentStore>(store: &S) -> InboxResult<MigrationReport> {
    let legacy = schema::legacy_conversations()?;
    let mut report = MigrationReport::default();

    for doc in store.query(&legacy, &Query::all()).await? {
        let record: LegacyConversation = match doc.decode() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(legacy = %doc.id, error = %e, "unreadable legacy record");
                report.skipped += 1;
                continue;
            }
        };
        if record.migrated_to.is_some() {
            continue;
        }

        let Some((buyer, seller, product)) = participants(&record) else {
            tracing::warn!(legacy = %doc.id, "legacy record lacks a usable buyer, seller or product");
            report.skipped += 1;
            continue;
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match migrate_one(store, &doc, &record, &buyer, &seller, &product).await {
                Ok((imported, dropped)) => {
                    report.migrated += 1;
                    report.messages_imported += imported;
                    report.dropped += dropped;
                    break;
                }
                Err(InboxError::Store(e)) if e.is_conflict() && attempt < MIGRATION_RETRIES => {
                    tracing::debug!(legacy = %doc.id, attempt, "target changed during migration, retrying");
                }
                Err(e) => {
                    tracing::warn!(legacy = %doc.id, error = %e, "legacy record not migrated");
                    report.skipped += 1;
                    break;
                }
            }
        }
    }

    tracing::info!(
        migrated = report.migrated,
        skipped = report.skipped,
        messages = report.messages_imported,
        dropped = report.dropped,
        "legacy migration finished"
    );
    Ok(report)
}

fn participants(record: &LegacyConversation) -> Option<(UserId, UserId, ProductId)> {
    let buyer = UserId::parse(record.buyer_id.as_deref()?).ok()?;
    let seller = UserId::parse(record.seller_id.as_deref()?).ok()?;
    let product = ProductId::parse(record.product_id.as_deref()?).ok()?;
    check_participants(&buyer, &seller).ok()?;
    Some((buyer, seller, product))
}

/// Gather, order and filter a record's messages. Returns the survivors and
/// the number dropped.
async fn collect_messages<S: DocumentStore>(
    store: &S,
    doc: &Document,
    record: &LegacyConversation,
    buyer: &UserId,
    seller: &UserId,
    already: &HashSet<MessageKey>,
) -> InboxResult<(Vec<Imported>, usize)> {
    let nested = schema::legacy_conversations()?
        .doc(&doc.id)?
        .child(schema::MESSAGES)?;
    let mut dropped = 0;
    let mut raw: Vec<(String, String, Option<DateTime<Utc>>)> = record
        .convert
        .iter()
        .map(|m| (m.sender_id.clone(), m.text.clone(), m.timestamp()))
        .collect();
    for nested_doc in store.query(&nested, &Query::all().order_by_creation()).await? {
        match nested_doc.decode::<LegacyMessage>() {
            Ok(m) => {
                let at = m.timestamp();
                raw.push((m.sender_id, m.text, at));
            }
            Err(e) => {
                tracing::debug!(legacy = %doc.id, error = %e, "unreadable legacy message");
                dropped += 1;
            }
        }
    }

    let fallback = record
        .created_at
        .as_ref()
        .and_then(LegacyTimestamp::to_utc)
        .unwrap_or(doc.create_time);
    let mut candidates = Vec::with_capacity(raw.len());
    for (sender_id, text, at) in raw {
        let sender = UserId::parse(&sender_id).ok();
        let text = normalize_text(&text).ok();
        match (sender, text) {
            (Some(sender), Some(text)) if sender == *buyer || sender == *seller => {
                candidates.push(Imported {
                    sender,
                    text,
                    at: at.unwrap_or(fallback),
                });
            }
            _ => dropped += 1,
        }
    }
    // Stable: messages with equal timestamps keep their legacy order.
    candidates.sort_by_key(|m| m.at);

    let mut seen = already.clone();
    let mut kept = Vec::with_capacity(candidates.len());
    for message in candidates {
        if seen.insert(key_of(&message)) {
            kept.push(message);
        } else {
            dropped += 1;
        }
    }
    Ok((kept, dropped))
}

async fn migrate_one<S: DocumentStore>(
    store: &S,
    doc: &Document,
    record: &LegacyConversation,
    buyer: &UserId,
    seller: &UserId,
    product: &ProductId,
) -> InboxResult<(usize, usize)> {
    let id = ConversationId::compose(buyer, seller, product);
    let conversation_path = schema::conversation_doc(&id)?;
    let messages = schema::messages(&id)?;

    let existing = store.get(&conversation_path).await?;
    let mut already = HashSet::new();
    let current = match &existing {
        Some(found) => {
            let conversation: Conversation = schema::decode(found)?;
            if !conversation.matches(buyer, seller, product) {
                return Err(InboxError::ConversationKeyCollision(id));
            }
            for message_doc in store.query(&messages, &Query::all()).await? {
                let message: Message = schema::decode(&message_doc)?;
                already.insert((message.sender, message.text, message.created_at));
            }
            Some((conversation, found.version))
        }
        None => None,
    };

    let (imported, dropped) = collect_messages(store, doc, record, buyer, seller, &already).await?;
    let last = imported.last();

    let mut batch = WriteBatch::new();
    match &current {
        None => {
            let created_at = imported.first().map(|m| m.at).unwrap_or(doc.create_time);
            let updated_at = last.map(|m| m.at).unwrap_or(created_at);
            let conversation = Conversation {
                id: id.clone(),
                buyer: buyer.clone(),
                seller: seller.clone(),
                product: product.clone(),
                last_message: match last {
                    Some(m) => m.text.clone(),
                    None => record.last_message.clone().unwrap_or_default(),
                },
                last_sender: last.map(|m| m.sender.clone()),
                last_message_at: last.map(|m| m.at),
                created_at,
                updated_at,
            };
            batch = batch.push(Write::create(conversation_path.clone(), to_fields(&conversation)?));
        }
        Some((conversation, version)) => {
            let mut fields = Fields::new();
            if let Some(m) = last.filter(|m| conversation.last_message_at.map_or(true, |at| m.at > at)) {
                fields.insert(field::LAST_MESSAGE.into(), Value::String(m.text.clone()));
                fields.insert(field::LAST_SENDER.into(), Value::String(m.sender.to_string()));
                fields.insert(field::LAST_MESSAGE_AT.into(), serde_json::to_value(m.at)?);
                if m.at > conversation.updated_at {
                    fields.insert(field::UPDATED_AT.into(), serde_json::to_value(m.at)?);
                }
            }
            // Always written, so the version check covers the whole batch.
            batch = batch.push(
                Write::patch(conversation_path.clone(), fields)
                    .with_precondition(Precondition::Version(*version)),
            );
        }
    }

    for message in &imported {
        let mut fields = Fields::new();
        fields.insert(field::SENDER.into(), Value::String(message.sender.to_string()));
        fields.insert(field::TEXT.into(), Value::String(message.text.clone()));
        fields.insert(field::CREATED_AT.into(), serde_json::to_value(message.at)?);
        batch = batch.push(Write::create(messages.doc(&auto_id())?, fields));
    }

    let mut marker = Fields::new();
    marker.insert(MIGRATED_TO.into(), Value::String(id.to_string()));
    let legacy_path = schema::legacy_conversations()?.doc(&doc.id)?;
    batch = batch.push(
        Write::patch(legacy_path, marker).with_precondition(Precondition::Version(doc.version)),
    );

    store.commit(batch).await?;
    tracing::info!(
        legacy = %doc.id,
        conversation = %id,
        imported = imported.len(),
        dropped,
        "legacy record migrated"
    );
    Ok((imported.len(), dropped))
}
