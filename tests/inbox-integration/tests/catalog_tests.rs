//! Listings, stock, wishlist and reports across several users.

use iloved_common::product::{ProductCategory, ProductPatch};
use iloved_common::report::ReportStatus;
use iloved_docstore::BlobStore;
use iloved_inbox::InboxError;

use iloved_inbox_integration::harness::TestHarness;
use iloved_inbox_integration::make_dummy_product;

#[tokio::test]
async fn listings_are_browsable_and_images_resolve() {
    let h = TestHarness::setup().await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;
    let dress = h.list_product(&h.emma, "Dress", 7_000, 2).await;

    let all = iloved_inbox::list_products(&*h.store, None, None).await.unwrap();
    let ids: Vec<_> = all.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec![dress.id.clone(), jacket.id.clone()]);

    let gary = iloved_inbox::products_by_seller(&*h.store, h.gary.id()).await.unwrap();
    assert_eq!(gary, vec![jacket.clone()]);

    let cover = jacket.cover_image().unwrap();
    let blob = h.blobs.download(cover).await.unwrap();
    assert_eq!(blob.content_type, "image/png");

    let beauty = iloved_inbox::list_products(&*h.store, Some(&ProductCategory::Beauty), None)
        .await
        .unwrap();
    assert!(beauty.is_empty());

    let found = iloved_inbox::list_products(&*h.store, None, Some("jack"))
        .await
        .unwrap();
    assert_eq!(found, vec![jacket.clone()]);
    let none = iloved_inbox::list_products(&*h.store, None, Some("sofa"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn only_the_owner_edits_and_stale_edits_conflict() {
    let h = TestHarness::setup().await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;
    let (_, version) = iloved_inbox::get_product_versioned(&*h.store, &jacket.id).await.unwrap();

    let cheaper = ProductPatch {
        price: Some(4_000),
        ..ProductPatch::default()
    };
    let err = iloved_inbox::update_product(&*h.store, &h.emma.session, &jacket.id, cheaper.clone(), version)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotOwner { .. }));

    let updated = iloved_inbox::update_product(&*h.store, &h.gary.session, &jacket.id, cheaper, version)
        .await
        .unwrap();
    assert_eq!(updated.price, 4_000);

    // A second editor still holding the old version loses.
    let renamed = ProductPatch {
        name: Some("Vintage Jacket".into()),
        ..ProductPatch::default()
    };
    let err = iloved_inbox::update_product(&*h.store, &h.gary.session, &jacket.id, renamed, version)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Conflict(_)));
    let current = iloved_inbox::get_product(&*h.store, &jacket.id).await.unwrap();
    assert_eq!(current.name, "Jacket");
    assert_eq!(current.price, 4_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stock_never_goes_negative() {
    let h = TestHarness::setup().await;
    let dress = h.list_product(&h.emma, "Dress", 7_000, 3).await;

    let mut tasks = Vec::new();
    for n in 0..6 {
        let store = h.store.clone();
        let session = if n % 2 == 0 { h.alice.session.clone() } else { h.bob.session.clone() };
        let id = dress.id.clone();
        tasks.push(tokio::spawn(async move {
            iloved_inbox::adjust_stock(&*store, &session, &id, -1).await
        }));
    }
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|t| t.unwrap())
        .collect();

    let sold = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(sold, 3);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, InboxError::InsufficientStock { .. } | InboxError::Conflict(_))));

    let current = iloved_inbox::get_product(&*h.store, &dress.id).await.unwrap();
    assert_eq!(current.stock, 0);
    assert!(!current.in_stock());

    // Restocking is the seller's call.
    let err = iloved_inbox::adjust_stock(&*h.store, &h.alice.session, &dress.id, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotOwner { .. }));
    let restocked = iloved_inbox::adjust_stock(&*h.store, &h.emma.session, &dress.id, 5)
        .await
        .unwrap();
    assert_eq!(restocked.stock, 5);
}

#[tokio::test]
async fn buyers_cannot_list_or_delete() {
    let h = TestHarness::setup().await;
    let err = iloved_inbox::add_product(
        &*h.store,
        &*h.blobs,
        &h.alice.session,
        make_dummy_product("Hat", 1_000, 1),
        vec![iloved_inbox_integration::make_dummy_image()],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, InboxError::NotSeller(_)));

    let hat = h.list_product(&h.gary, "Hat", 1_000, 1).await;
    let err = iloved_inbox::delete_product(&*h.store, &h.emma.session, &hat.id)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotOwner { .. }));
    iloved_inbox::delete_product(&*h.store, &h.gary.session, &hat.id)
        .await
        .unwrap();
    let err = iloved_inbox::get_product(&*h.store, &hat.id).await.unwrap_err();
    assert!(matches!(err, InboxError::ProductNotFound(_)));
}

#[tokio::test]
async fn wishlist_is_per_user() {
    let h = TestHarness::setup().await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;
    let dress = h.list_product(&h.emma, "Dress", 7_000, 1).await;

    iloved_inbox::add_to_wishlist(&*h.store, &h.alice.session, &jacket.id).await.unwrap();
    iloved_inbox::add_to_wishlist(&*h.store, &h.alice.session, &dress.id).await.unwrap();
    iloved_inbox::add_to_wishlist(&*h.store, &h.bob.session, &dress.id).await.unwrap();
    let err = iloved_inbox::add_to_wishlist(&*h.store, &h.alice.session, &jacket.id)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::AlreadyInWishlist(_)));

    let alice = iloved_inbox::wishlist(&*h.store, h.alice.id()).await.unwrap();
    let names: Vec<_> = alice.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Dress", "Jacket"]);
    assert_eq!(alice[1].price, 5_000);

    iloved_inbox::remove_from_wishlist(&*h.store, &h.alice.session, &dress.id)
        .await
        .unwrap();
    assert_eq!(iloved_inbox::wishlist(&*h.store, h.alice.id()).await.unwrap().len(), 1);
    assert_eq!(iloved_inbox::wishlist(&*h.store, h.bob.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reports_capture_the_listing() {
    let h = TestHarness::setup().await;
    let jacket = h.list_product(&h.gary, "Jacket", 5_000, 1).await;

    let report = iloved_inbox::report_product(
        &*h.store,
        &h.bob.session,
        &jacket.id,
        "Counterfeit",
        "Logo is wrong",
    )
    .await
    .unwrap();
    assert_eq!(report.reporter, *h.bob.id());
    assert_eq!(report.product_name, "Jacket");
    assert_eq!(report.product_image.as_deref(), jacket.cover_image());
    assert_eq!(report.status, ReportStatus::Pending);

    let err = iloved_inbox::report_product(&*h.store, &h.bob.session, &jacket.id, "  ", "")
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Validation(_)));
}
