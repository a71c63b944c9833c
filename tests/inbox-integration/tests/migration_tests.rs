//! Folding legacy conversation records into the canonical layout.

use iloved_common::conversation::ConversationId;
use iloved_docstore::MemoryStore;
use iloved_inbox::MigrationReport;
use serde_json::json;

use iloved_inbox_integration::harness::TestHarness;
use iloved_inbox_integration::{put_raw, user};

#[tokio::test]
async fn nested_history_is_imported_in_order() {
    let h = TestHarness::setup().await;
    let conversation = ConversationId(format!("{}_{}_p-legacy", h.alice.id(), h.gary.id()));

    put_raw(
        &h.store,
        "messages",
        "old-1",
        json!({
            "buyer_id": h.alice.id().as_str(),
            "seller_id": h.gary.id().as_str(),
            "productId": "p-legacy",
            "createdAt": "2023-05-01T09:00:00Z",
        }),
    )
    .await;
    put_raw(
        &h.store,
        "messages/old-1/messages",
        "m2",
        json!({ "senderId": h.gary.id().as_str(), "text": "Sure, RM 40?", "createdAt": "2023-05-01T09:05:00Z" }),
    )
    .await;
    put_raw(
        &h.store,
        "messages/old-1/messages",
        "m1",
        json!({ "senderId": h.alice.id().as_str(), "text": "Can you do a discount?", "createdAt": "2023-05-01T09:01:00Z" }),
    )
    .await;
    put_raw(
        &h.store,
        "messages/old-1/messages",
        "m3",
        json!({ "senderId": h.alice.id().as_str(), "text": "   " }),
    )
    .await;

    let report = iloved_inbox::migrate_legacy(&*h.store).await.unwrap();
    assert_eq!(
        report,
        MigrationReport {
            migrated: 1,
            skipped: 0,
            messages_imported: 2,
            dropped: 1,
        }
    );

    let view = h.chat(&h.alice, &conversation).await;
    let texts: Vec<_> = view.messages().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, ["Can you do a discount?", "Sure, RM 40?"]);

    let directory = iloved_inbox::list_conversations(&*h.store, h.gary.id()).await.unwrap();
    assert_eq!(directory.len(), 1);
    assert_eq!(directory[0].conversation, conversation);
    assert_eq!(directory[0].counterparty_name, "Alice");
    assert_eq!(directory[0].last_message, "Sure, RM 40?");

    // The migrated conversation behaves like any other.
    h.send(&h.alice, &conversation, "Deal").await.unwrap();
    assert_eq!(view.messages().last().map(|m| m.text.as_str()), Some("Deal"));

    let again = iloved_inbox::migrate_legacy(&*h.store).await.unwrap();
    assert_eq!(again, MigrationReport::default());
    assert_eq!(view.messages().len(), 3);
}

#[tokio::test]
async fn migrated_state_survives_a_snapshot() {
    let store = MemoryStore::new();
    put_raw(
        &store,
        "messages",
        "old-2",
        json!({
            "buyer_id": "a@x.com",
            "seller_id": "s@x.com",
            "productId": "p1",
            "convert": [
                { "senderId": "a@x.com", "text": "Hello", "createdAt": { "seconds": 1_680_000_000 } },
            ],
        }),
    )
    .await;
    put_raw(&store, "messages", "broken", json!({ "buyer_id": "a@x.com" })).await;

    let report = iloved_inbox::migrate_legacy(&store).await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(report.skipped, 1);

    let restored = MemoryStore::from_snapshot(store.export().unwrap()).unwrap();
    let again = iloved_inbox::migrate_legacy(&restored).await.unwrap();
    assert_eq!(again.migrated, 0);

    let id = ConversationId("a@x.com_s@x.com_p1".into());
    let view = iloved_inbox::ChatView::open(&restored, &id, &user("s@x.com"))
        .await
        .unwrap();
    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.messages()[0].text, "Hello");
}
