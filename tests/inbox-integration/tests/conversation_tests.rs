//! End-to-end conversation flows over one shared in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use iloved_common::conversation::{ConversationId, EMPTY_PREVIEW_LABEL};
use iloved_common::identity::Role;
use iloved_common::product::ProductId;
use iloved_inbox::{InboxError, ResolveOptions};

use iloved_inbox_integration::harness::TestHarness;
use iloved_inbox_integration::{user, wait_for_state};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn contact_seller_scenario() {
    tracing_subscriber::fmt::try_init().ok();
    let store = iloved_docstore::MemoryStore::new();
    let (buyer, seller) = (user("a@x.com"), user("s@x.com"));

    // ── Contact: a fresh conversation with nothing said ──
    let resolution = iloved_inbox::resolve_conversation(
        &store,
        &buyer,
        &seller,
        &ProductId("p1".into()),
        &ResolveOptions::default(),
    )
    .await
    .unwrap();
    assert!(resolution.created);
    let id = resolution.conversation.id.clone();
    assert_eq!(id, ConversationId("a@x.com_s@x.com_p1".into()));
    assert_eq!(resolution.conversation.last_message, "");
    assert_eq!(resolution.conversation.preview_label(), EMPTY_PREVIEW_LABEL);

    let view = iloved_inbox::ChatView::open(&store, &id, &buyer).await.unwrap();
    assert!(view.messages().is_empty());

    // ── Buyer asks ──
    iloved_inbox::send_message(&store, &id, &buyer, "Is this available?")
        .await
        .unwrap();
    let messages = view.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, buyer);
    assert_eq!(messages[0].text, "Is this available?");
    let conversation = iloved_inbox::load_conversation(&store, &id).await.unwrap();
    assert_eq!(conversation.last_message, "Is this available?");

    // ── Seller and buyer reply at the same time ──
    let (yes, great) = tokio::join!(
        iloved_inbox::send_message(&store, &id, &seller, "Yes!"),
        iloved_inbox::send_message(&store, &id, &buyer, "Great"),
    );
    yes.unwrap();
    great.unwrap();

    let texts: Vec<_> = view.messages().into_iter().map(|m| m.text).collect();
    assert_eq!(texts.len(), 3);
    assert!(texts.contains(&"Yes!".to_string()));
    assert!(texts.contains(&"Great".to_string()));
    let last = texts.last().cloned().unwrap();
    let conversation = iloved_inbox::load_conversation(&store, &id).await.unwrap();
    assert_eq!(conversation.last_message, last);
    view.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_all_survive() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.gary, "Denim Jacket", 8_000, 1).await;
    let id = h.open_conversation(&h.alice, &product.id).await.unwrap().conversation.id;

    let mut tasks = Vec::new();
    for n in 0..20 {
        let store = h.store.clone();
        let id = id.clone();
        let sender = if n % 2 == 0 { h.alice.id().clone() } else { h.gary.id().clone() };
        tasks.push(tokio::spawn(async move {
            iloved_inbox::send_message(&*store, &id, &sender, &format!("message {n}")).await
        }));
    }
    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }

    let view = h.chat(&h.gary, &id).await;
    let messages = view.messages();
    assert_eq!(messages.len(), 20);
    for n in 0..20 {
        assert!(messages.iter().any(|m| m.text == format!("message {n}")), "message {n} lost");
    }
    let conversation = iloved_inbox::load_conversation(&*h.store, &id).await.unwrap();
    let last = messages.last().unwrap();
    assert_eq!(conversation.last_message, last.text);
    assert_eq!(conversation.last_sender.as_ref(), Some(&last.sender));
}

#[tokio::test]
async fn every_message_comes_from_a_participant() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.emma, "Silk Scarf", 2_500, 3).await;
    let id = h.open_conversation(&h.bob, &product.id).await.unwrap().conversation.id;

    h.send(&h.bob, &id, "Hi Emma").await.unwrap();
    h.send(&h.emma, &id, "Hi Bob").await.unwrap();
    let err = h.send(&h.alice, &id, "Let me in").await.unwrap_err();
    assert!(matches!(err, InboxError::NotParticipant { .. }));

    let conversation = iloved_inbox::load_conversation(&*h.store, &id).await.unwrap();
    let view = h.chat(&h.bob, &id).await;
    assert!(view
        .messages()
        .iter()
        .all(|m| conversation.is_participant(&m.sender)));
    assert_eq!(view.messages().len(), 2);
}

#[tokio::test]
async fn blank_messages_change_nothing() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.gary, "Loafers", 6_000, 1).await;
    let id = h.open_conversation(&h.alice, &product.id).await.unwrap().conversation.id;
    h.send(&h.alice, &id, "Still for sale?").await.unwrap();
    let before = iloved_inbox::load_conversation(&*h.store, &id).await.unwrap();
    let revision = h.store.revision();

    for blank in ["", "   ", "\n\t"] {
        let err = h.send(&h.alice, &id, blank).await.unwrap_err();
        assert!(matches!(err, InboxError::EmptyMessage));
    }

    assert_eq!(h.store.revision(), revision);
    let after = iloved_inbox::load_conversation(&*h.store, &id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(h.chat(&h.alice, &id).await.messages().len(), 1);
}

#[tokio::test]
async fn sending_to_a_missing_conversation_fails() {
    let h = TestHarness::setup().await;
    let id = ConversationId("nobody@x.com_gary@iloved.test_p9".into());
    let err = h.send(&h.alice, &id, "hello?").await.unwrap_err();
    assert!(matches!(err, InboxError::ConversationNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_contact_reuses_the_conversation() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.gary, "Trench Coat", 12_000, 1).await;

    let first = h.open_conversation(&h.alice, &product.id).await.unwrap();
    let second = h.open_conversation(&h.alice, &product.id).await.unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.conversation.id, second.conversation.id);

    // Racing resolvers agree too, and exactly one of them creates it.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = h.store.clone();
        let buyer = h.bob.id().clone();
        let product = product.id.clone();
        tasks.push(tokio::spawn(async move {
            iloved_inbox::resolve_for_product(&*store, &buyer, &product, &ResolveOptions::default_greeting()).await
        }));
    }
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    assert!(results.windows(2).all(|w| w[0].conversation.id == w[1].conversation.id));

    // The greeting goes out once.
    let view = h.chat(&h.bob, &results[0].conversation.id).await;
    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.messages()[0].text, iloved_inbox::resolve::DEFAULT_GREETING);
}

#[tokio::test]
async fn sellers_cannot_message_themselves() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.gary, "Beret", 1_500, 1).await;
    let err = h.open_conversation(&h.gary, &product.id).await.unwrap_err();
    assert!(matches!(err, InboxError::SelfConversation));
}

#[tokio::test]
async fn unsubscribed_views_stop_hearing() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.emma, "Tote Bag", 3_000, 2).await;
    let id = h.open_conversation(&h.alice, &product.id).await.unwrap().conversation.id;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registration = iloved_inbox::subscribe_messages(&*h.store, &id, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    h.send(&h.alice, &id, "one").await.unwrap();
    let heard = calls.load(Ordering::SeqCst);
    assert_eq!(heard, 2);

    registration.remove();
    h.send(&h.emma, &id, "two").await.unwrap();
    h.send(&h.alice, &id, "three").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), heard);
    assert_eq!(h.store.active_listeners(), 0);
}

#[tokio::test]
async fn live_views_follow_each_other() {
    let h = TestHarness::setup().await;
    let product = h.list_product(&h.gary, "Sneakers", 9_900, 1).await;
    let id = h.open_conversation(&h.bob, &product.id).await.unwrap().conversation.id;

    let mut buyer = h.chat(&h.bob, &id).await;
    let seller = h.chat(&h.gary, &id).await;
    assert_eq!(buyer.counterparty().name, "Gary");
    assert_eq!(seller.counterparty().name, "Bob");

    let mut rx = buyer.subscribe();
    seller.send(&*h.store, "Still have them!").await.unwrap();
    let list = wait_for_state(&mut rx, TIMEOUT, |m| m.len() == 1).await.unwrap();
    assert!(!buyer.is_mine(&list[0]));

    buyer.send(&*h.store, "Great, I'll take them").await.unwrap();
    let list = tokio::time::timeout(TIMEOUT, buyer.wait_for_count(2))
        .await
        .unwrap()
        .unwrap();
    assert!(buyer.is_mine(&list[1]));
}

#[tokio::test]
async fn directory_shows_both_sides() {
    let h = TestHarness::setup().await;
    let avatar = h.upload_avatar(&h.gary).await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;
    let scarf = h.list_product(&h.emma, "Scarf", 1_000, 1).await;

    let with_gary = h.open_conversation(&h.alice, &jacket.id).await.unwrap().conversation.id;
    let with_emma = h.open_conversation(&h.alice, &scarf.id).await.unwrap().conversation.id;
    h.open_conversation(&h.bob, &jacket.id).await.unwrap();
    h.send(&h.gary, &with_gary, "Hi Alice").await.unwrap();

    let alice = iloved_inbox::list_conversations(&*h.store, h.alice.id()).await.unwrap();
    let ids: Vec<_> = alice.iter().map(|s| s.conversation.clone()).collect();
    assert_eq!(ids, vec![with_gary.clone(), with_emma]);
    assert_eq!(alice[0].counterparty_name, "Gary");
    assert_eq!(alice[0].counterparty_avatar, avatar);
    assert_eq!(alice[0].preview_label(), "Hi Alice");
    assert_eq!(alice[1].preview_label(), EMPTY_PREVIEW_LABEL);
    assert!(alice.iter().all(|s| s.role == Role::Buying));

    let gary = iloved_inbox::list_conversations(&*h.store, h.gary.id()).await.unwrap();
    assert_eq!(gary.len(), 2);
    assert!(gary.iter().all(|s| s.role == Role::Selling));
    assert!(iloved_inbox::list_conversations(&*h.store, &user("nobody@x.com"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn directory_watch_reorders_on_activity() {
    let h = TestHarness::setup().await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;
    let scarf = h.list_product(&h.emma, "Scarf", 1_000, 1).await;
    let older = h.open_conversation(&h.alice, &jacket.id).await.unwrap().conversation.id;
    let newer = h.open_conversation(&h.alice, &scarf.id).await.unwrap().conversation.id;

    let watch = iloved_inbox::watch_conversations(h.store.clone(), h.alice.id().clone()).unwrap();
    let mut rx = watch.subscribe();
    let first = wait_for_state(&mut rx, TIMEOUT, |s| s.loaded).await.unwrap();
    assert_eq!(first.conversations[0].conversation, newer);

    h.send(&h.gary, &older, "Price drop!").await.unwrap();
    let state = wait_for_state(&mut rx, TIMEOUT, |s| {
        s.conversations.first().map(|c| &c.conversation) == Some(&older)
    })
    .await
    .unwrap();
    assert_eq!(state.conversations[0].last_message, "Price drop!");
    assert!(state.last_error.is_none());

    drop(watch);
    assert_eq!(h.store.active_listeners(), 0);
}
