//! Integration tests for deleting catalog item images.

use std::time::Duration;

use shareapp_core::CatalogItem;
use shareapp_functions::handlers::{CatalogCleanup, HandlerError};
use shareapp_functions::storage::StorageError;
use shareapp_integration_tests::{BlobCall, TestHarness};

fn cleanup(harness: &TestHarness) -> CatalogCleanup {
    CatalogCleanup::new(harness.blobs.clone())
}

fn item(id: Option<&str>) -> Option<CatalogItem> {
    Some(CatalogItem {
        id: id.map(String::from),
    })
}

fn seed_images(harness: &TestHarness) {
    harness.blobs.insert("items/X/front.jpg");
    harness.blobs.insert("items/X/thumbs/front.jpg");
    harness.blobs.insert("items/XY/front.jpg");
    harness.blobs.insert("profile_pics/X");
}

// =============================================================================
// No-op Deletions
// =============================================================================

#[tokio::test]
async fn test_item_without_id_makes_no_blob_calls() {
    let harness = TestHarness::new();
    seed_images(&harness);

    assert!(cleanup(&harness).on_item_deleted(item(None)).is_none());
    assert!(cleanup(&harness).on_item_deleted(None).is_none());

    tokio::task::yield_now().await;
    assert!(harness.blobs.calls().is_empty());
}

#[tokio::test]
async fn test_item_with_unusable_id_makes_no_blob_calls() {
    let harness = TestHarness::new();

    assert!(cleanup(&harness).on_item_deleted(item(Some(""))).is_none());
    assert!(cleanup(&harness).on_item_deleted(item(Some("a/b"))).is_none());

    tokio::task::yield_now().await;
    assert!(harness.blobs.calls().is_empty());
}

// =============================================================================
// Prefix Deletion
// =============================================================================

#[tokio::test]
async fn test_deletes_item_prefix() {
    let harness = TestHarness::new();
    seed_images(&harness);

    let deletion = cleanup(&harness)
        .on_item_deleted(item(Some("X")))
        .expect("deletion started");
    assert_eq!(deletion.prefix(), "items/X/");

    let deleted = deletion.wait().await.expect("deletion succeeds");

    assert_eq!(deleted, 2);
    assert_eq!(
        harness.blobs.calls(),
        vec![BlobCall::DeletePrefix("items/X/".to_string())]
    );
    assert_eq!(
        harness.blobs.objects(),
        vec!["items/XY/front.jpg".to_string(), "profile_pics/X".to_string()]
    );
}

#[tokio::test]
async fn test_deletion_failure_is_reported_to_waiter() {
    let harness = TestHarness::new();
    seed_images(&harness);
    harness.blobs.fail_on("items/X/");

    let err = cleanup(&harness)
        .on_item_deleted(item(Some("X")))
        .expect("deletion started")
        .wait()
        .await
        .expect_err("deletion fails");

    assert!(matches!(err, HandlerError::Storage(StorageError::Api { .. })));
    assert!(harness.blobs.contains("items/X/front.jpg"));
}

#[tokio::test]
async fn test_detached_deletion_still_completes() {
    let harness = TestHarness::new();
    seed_images(&harness);

    cleanup(&harness)
        .on_item_deleted(item(Some("X")))
        .expect("deletion started")
        .detach();

    for _ in 0..100 {
        if !harness.blobs.contains("items/X/front.jpg") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(!harness.blobs.contains("items/X/front.jpg"));
    assert!(!harness.blobs.contains("items/X/thumbs/front.jpg"));
    assert!(harness.blobs.contains("items/XY/front.jpg"));
}
