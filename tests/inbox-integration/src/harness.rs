use std::sync::Arc;

use chrono::Utc;
use iloved_common::conversation::ConversationId;
use iloved_common::identity::UserId;
use iloved_common::message::Message;
use iloved_common::product::{Product, ProductId};
use iloved_common::profile::UserProfile;
use iloved_docstore::{MemoryBlobStore, MemoryStore};
use iloved_inbox::{ChatView, ImageUpload, InboxResult, Resolution, ResolveOptions, Session};

use crate::{make_dummy_image, make_dummy_product, user};

/// A registered user of the shared test store.
pub struct Participant {
    pub name: String,
    pub session: Session,
}

impl Participant {
    pub fn id(&self) -> &UserId {
        &self.session.user
    }
}

/// One store shared by two buyers (Alice, Bob) and two sellers (Gary, Emma),
/// all with profiles.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub alice: Participant,
    pub bob: Participant,
    pub gary: Participant,
    pub emma: Participant,
}

impl TestHarness {
    pub async fn setup() -> Self {
        tracing_subscriber::fmt::try_init().ok();

        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new("http://blobs.test"));

        let alice = register(&store, "Alice", false).await;
        let bob = register(&store, "Bob", false).await;
        let gary = register(&store, "Gary", true).await;
        let emma = register(&store, "Emma", true).await;

        Self {
            store,
            blobs,
            alice,
            bob,
            gary,
            emma,
        }
    }

    /// List a product for `seller` with one photo.
    pub async fn list_product(&self, seller: &Participant, name: &str, price: u64, stock: u32) -> Product {
        iloved_inbox::add_product(
            &*self.store,
            &*self.blobs,
            &seller.session,
            make_dummy_product(name, price, stock),
            vec![make_dummy_image()],
        )
        .await
        .unwrap_or_else(|e| panic!("{} failed to list {name}: {e}", seller.name))
    }

    /// Resolve the conversation a buyer opens from a product page, without
    /// a greeting.
    pub async fn open_conversation(&self, buyer: &Participant, product: &ProductId) -> InboxResult<Resolution> {
        iloved_inbox::resolve_for_product(&*self.store, buyer.id(), product, &ResolveOptions::default()).await
    }

    pub async fn chat(&self, viewer: &Participant, conversation: &ConversationId) -> ChatView {
        ChatView::open(&*self.store, conversation, viewer.id())
            .await
            .unwrap_or_else(|e| panic!("{} could not open {conversation}: {e}", viewer.name))
    }

    pub async fn send(&self, sender: &Participant, conversation: &ConversationId, text: &str) -> InboxResult<Message> {
        iloved_inbox::send_message(&*self.store, conversation, sender.id(), text).await
    }

    pub async fn upload_avatar(&self, who: &Participant) -> String {
        iloved_inbox::set_profile_picture(
            &*self.store,
            &*self.blobs,
            &who.session,
            ImageUpload::new(vec![1, 2, 3], "image/jpeg"),
        )
        .await
        .unwrap_or_else(|e| panic!("{} avatar upload failed: {e}", who.name))
    }
}

async fn register(store: &MemoryStore, name: &str, is_seller: bool) -> Participant {
    let profile = UserProfile {
        email: user(&format!("{}@iloved.test", name.to_lowercase())),
        name: name.to_string(),
        profile_picture: None,
        is_seller,
        created_at: Utc::now(),
    };
    let saved = iloved_inbox::upsert_profile(store, &profile)
        .await
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"));
    Participant {
        name: name.to_string(),
        session: Session::from_profile(&saved),
    }
}
