//! A persisted session carries the user across restarts of the app.

use iloved_inbox::{Session, SessionFile};

use iloved_inbox_integration::harness::TestHarness;

#[tokio::test]
async fn restored_session_acts_as_the_same_user() {
    let h = TestHarness::setup().await;
    let dir = tempfile::tempdir().unwrap();
    let file = SessionFile::new(dir.path().join("iloved").join("session.json"));
    assert!(file.load().unwrap().is_none());

    file.save(&h.gary.session).unwrap();
    let restored = file.load().unwrap().unwrap();
    assert_eq!(restored, h.gary.session);

    // The restored session can still list, and its listings belong to Gary.
    let product = iloved_inbox::add_product(
        &*h.store,
        &*h.blobs,
        &restored,
        iloved_inbox_integration::make_dummy_product("Boots", 11_000, 1),
        vec![iloved_inbox_integration::make_dummy_image()],
    )
    .await
    .unwrap();
    assert_eq!(product.seller, *h.gary.id());

    file.clear().unwrap();
    assert!(file.load().unwrap().is_none());
    file.clear().unwrap();
}

#[tokio::test]
async fn session_follows_the_stored_profile() {
    let h = TestHarness::setup().await;
    let profile = iloved_inbox::get_profile(&*h.store, h.emma.id())
        .await
        .unwrap()
        .unwrap();
    let session = Session::from_profile(&profile);
    assert!(session.is_seller);
    assert_eq!(session.name, "Emma");
    assert!(Session::from_profile(
        &iloved_inbox::get_profile(&*h.store, h.bob.id()).await.unwrap().unwrap()
    )
    .require_seller()
    .is_err());
}
