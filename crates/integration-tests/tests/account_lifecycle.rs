//! Integration tests for account creation and deletion side effects.

use std::sync::Arc;

use serde_json::json;
use shareapp_core::{AccountId, DocumentPath, Email, profile_image};
use shareapp_functions::config::{DEFAULT_AVATAR_URL, DEFAULT_DISPLAY_NAME, ProfileDefaults};
use shareapp_functions::firestore::WriteMode;
use shareapp_functions::handlers::{AccountLifecycle, NewAccount, StepOutcome};
use shareapp_integration_tests::{BlobCall, DocCall, TestHarness};

const NOW: i64 = 1_700_000_000_000;

fn account_id() -> AccountId {
    AccountId::parse("uid-1").expect("valid account id")
}

fn lifecycle(harness: &TestHarness) -> AccountLifecycle {
    AccountLifecycle::new(
        harness.documents.clone(),
        harness.blobs.clone(),
        ProfileDefaults::default(),
    )
}

fn new_account(email: Option<&str>, name: Option<&str>, photo: Option<&str>) -> NewAccount {
    NewAccount {
        account_id: account_id(),
        email: email.map(|e| Email::parse(e).expect("valid email")),
        display_name: name.map(String::from),
        photo_url: photo.map(String::from),
    }
}

// =============================================================================
// Account Creation
// =============================================================================

#[tokio::test]
async fn test_creation_writes_pending_payment_profile() {
    let harness = TestHarness::new();
    let report = lifecycle(&harness)
        .on_created_at(new_account(Some("ada@example.com"), None, None), NOW)
        .await;

    assert_eq!(report.payment_profile, StepOutcome::Done);
    let profile = harness
        .documents
        .document(&DocumentPath::payment_profile(&account_id()))
        .expect("payment profile written");
    assert_eq!(
        serde_json::Value::Object(profile),
        json!({"custId": "new", "email": "ada@example.com"})
    );
}

#[tokio::test]
async fn test_creation_without_email_still_uses_sentinel() {
    let harness = TestHarness::new();
    lifecycle(&harness)
        .on_created_at(new_account(None, None, None), NOW)
        .await;

    let profile = harness
        .documents
        .document(&DocumentPath::payment_profile(&account_id()))
        .expect("payment profile written");
    assert_eq!(profile.get("custId"), Some(&json!("new")));
    assert!(!profile.contains_key("email"));
}

#[tokio::test]
async fn test_creation_without_photo_uses_default_avatar() {
    let harness = TestHarness::new();
    lifecycle(&harness)
        .on_created_at(new_account(Some("ada@example.com"), None, None), NOW)
        .await;

    let user = harness
        .documents
        .document(&DocumentPath::user(&account_id()))
        .expect("user profile written");
    assert_eq!(user.get("avatar"), Some(&json!(DEFAULT_AVATAR_URL)));
    assert_eq!(user.get("name"), Some(&json!(DEFAULT_DISPLAY_NAME)));
    assert_eq!(user.get("email"), Some(&json!("ada@example.com")));
}

#[tokio::test]
async fn test_creation_uses_supplied_profile_and_one_timestamp() {
    let harness = TestHarness::new();
    lifecycle(&harness)
        .on_created_at(
            new_account(None, Some("Ada"), Some("https://img.example.com/ada.png")),
            NOW,
        )
        .await;

    let user = harness
        .documents
        .document(&DocumentPath::user(&account_id()))
        .expect("user profile written");
    assert_eq!(
        serde_json::Value::Object(user),
        json!({
            "avatar": "https://img.example.com/ada.png",
            "name": "Ada",
            "lastActive": NOW,
            "creationDate": NOW,
        })
    );
}

#[tokio::test]
async fn test_creation_timestamps_match_with_real_clock() {
    let harness = TestHarness::new();
    lifecycle(&harness)
        .on_created(new_account(None, None, None))
        .await;

    let user = harness
        .documents
        .document(&DocumentPath::user(&account_id()))
        .expect("user profile written");
    assert_eq!(user.get("lastActive"), user.get("creationDate"));
}

#[tokio::test]
async fn test_creation_writes_replace_documents() {
    let harness = TestHarness::new();
    lifecycle(&harness)
        .on_created_at(new_account(None, None, None), NOW)
        .await;

    let calls = harness.documents.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| matches!(
        call,
        DocCall::Set {
            mode: WriteMode::Replace,
            ..
        }
    )));
}

#[tokio::test]
async fn test_creation_failure_does_not_block_other_write() {
    let harness = TestHarness::new();
    harness
        .documents
        .fail_on(&DocumentPath::payment_profile(&account_id()));

    let report = lifecycle(&harness)
        .on_created_at(new_account(None, None, None), NOW)
        .await;

    assert!(report.payment_profile.is_failed());
    assert_eq!(report.user_profile, StepOutcome::Done);
    assert_eq!(report.failures(), 1);
    assert!(
        harness
            .documents
            .document(&DocumentPath::user(&account_id()))
            .is_some()
    );
}

#[tokio::test]
async fn test_custom_profile_defaults() {
    let harness = TestHarness::new();
    let handler = AccountLifecycle::new(
        harness.documents.clone(),
        harness.blobs.clone(),
        ProfileDefaults {
            avatar_url: "https://cdn.example.com/blank.png".to_string(),
            display_name: "friend".to_string(),
        },
    );
    handler
        .on_created_at(new_account(None, None, None), NOW)
        .await;

    let user = harness
        .documents
        .document(&DocumentPath::user(&account_id()))
        .expect("user profile written");
    assert_eq!(user.get("avatar"), Some(&json!("https://cdn.example.com/blank.png")));
    assert_eq!(user.get("name"), Some(&json!("friend")));
}

// =============================================================================
// Account Deletion
// =============================================================================

fn seed_account(harness: &TestHarness) {
    harness
        .documents
        .insert(&DocumentPath::payment_profile(&account_id()), json!({"custId": "new"}));
    harness
        .documents
        .insert(&DocumentPath::user(&account_id()), json!({"name": "Ada"}));
    harness.blobs.insert(&profile_image(&account_id()));
}

#[tokio::test]
async fn test_deletion_removes_everything() {
    let harness = TestHarness::new();
    seed_account(&harness);

    let report = lifecycle(&harness).on_deleted(&account_id()).await;

    assert_eq!(report.failures(), 0);
    assert_eq!(report.profile_image, StepOutcome::Done);
    assert!(
        harness
            .documents
            .document(&DocumentPath::payment_profile(&account_id()))
            .is_none()
    );
    assert!(
        harness
            .documents
            .document(&DocumentPath::user(&account_id()))
            .is_none()
    );
    assert!(!harness.blobs.contains("profile_pics/uid-1"));
}

#[tokio::test]
async fn test_deletion_of_absent_resources_succeeds() {
    let harness = TestHarness::new();

    let report = lifecycle(&harness).on_deleted(&account_id()).await;

    assert_eq!(report.payment_profile, StepOutcome::Done);
    assert_eq!(report.profile_image, StepOutcome::AlreadyAbsent);
    assert_eq!(report.user_profile, StepOutcome::Done);
}

#[tokio::test]
async fn test_deletion_attempts_each_step_once_despite_failures() {
    let harness = TestHarness::new();
    seed_account(&harness);
    harness
        .documents
        .fail_on(&DocumentPath::payment_profile(&account_id()));
    harness.blobs.fail_on("profile_pics/uid-1");

    let report = lifecycle(&harness).on_deleted(&account_id()).await;

    assert!(report.payment_profile.is_failed());
    assert!(report.profile_image.is_failed());
    assert_eq!(report.user_profile, StepOutcome::Done);
    assert_eq!(report.failures(), 2);

    let doc_calls = harness.documents.calls();
    assert_eq!(doc_calls.len(), 2);
    assert_eq!(
        doc_calls
            .iter()
            .filter(|c| **c == DocCall::Delete("cards/uid-1".to_string()))
            .count(),
        1
    );
    assert_eq!(
        doc_calls
            .iter()
            .filter(|c| **c == DocCall::Delete("users/uid-1".to_string()))
            .count(),
        1
    );
    assert_eq!(
        harness.blobs.calls(),
        vec![BlobCall::Delete("profile_pics/uid-1".to_string())]
    );
}

#[tokio::test]
async fn test_deletion_with_every_step_failing_still_reports() {
    let harness = TestHarness::new();
    harness
        .documents
        .fail_on(&DocumentPath::payment_profile(&account_id()));
    harness.documents.fail_on(&DocumentPath::user(&account_id()));
    harness.blobs.fail_on("profile_pics/uid-1");

    let report = lifecycle(&harness).on_deleted(&account_id()).await;

    assert_eq!(report.failures(), 3);
    assert_eq!(harness.documents.calls().len(), 2);
    assert_eq!(harness.blobs.calls().len(), 1);
}

#[tokio::test]
async fn test_handlers_share_clients() {
    let harness = TestHarness::new();
    let handler = lifecycle(&harness);
    let clone = handler.clone();

    handler.on_created_at(new_account(None, None, None), NOW).await;
    clone.on_deleted(&account_id()).await;

    assert!(
        harness
            .documents
            .document(&DocumentPath::user(&account_id()))
            .is_none()
    );
    assert_eq!(Arc::strong_count(&harness.documents), 3);
}
