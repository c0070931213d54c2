//! Event delivery endpoints.
//!
//! Account and catalog triggers always answer `200` once the payload is
//! understood; their handlers log failures instead of asking for a retry.
//! Payment-source failures answer `5xx` so the event is redelivered.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use serde::Serialize;
use shareapp_core::{AccountId, CatalogItem, ItemId, PaymentToken, TokenId};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::events::{AuthUserCreated, AuthUserDeleted, DocumentChange};
use crate::handlers::{AccountCreated, AccountDeleted, PaymentSourceOutcome};
use crate::state::AppState;

/// Create trigger routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/triggers/auth/user-created", post(user_created))
        .route("/triggers/auth/user-deleted", post(user_deleted))
        .route(
            "/triggers/cards/{account_id}/tokens/{token_id}",
            post(token_written),
        )
        .route("/triggers/items/{item_id}", post(item_written))
}

/// Response of the item trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemCleanup {
    /// The write was not a deletion.
    Ignored,
    /// The deleted item had no usable `id`.
    NoItemId,
    /// Deletion ran to completion.
    Deleted { prefix: String, objects: usize },
    /// Deletion failed; details are in the logs.
    Failed { prefix: String },
    /// Deletion was started and left running.
    Started { prefix: String },
}

#[instrument(skip(state, event))]
async fn user_created(
    State(state): State<AppState>,
    Json(event): Json<AuthUserCreated>,
) -> Result<Json<AccountCreated>, AppError> {
    let account = event
        .into_new_account()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(state.accounts().on_created(account).await))
}

#[instrument(skip(state, event))]
async fn user_deleted(
    State(state): State<AppState>,
    Json(event): Json<AuthUserDeleted>,
) -> Result<Json<AccountDeleted>, AppError> {
    let account_id = parse_segment::<AccountId>(event.uid)?;

    Ok(Json(state.accounts().on_deleted(&account_id).await))
}

#[instrument(skip(state, change))]
async fn token_written(
    State(state): State<AppState>,
    Path((account_id, token_id)): Path<(String, String)>,
    Json(change): Json<DocumentChange>,
) -> Result<Json<PaymentSourceOutcome>, AppError> {
    let account_id = parse_segment::<AccountId>(account_id)?;
    let token_id = parse_segment::<TokenId>(token_id)?;

    let outcome = state
        .payment_sources()
        .on_token_written(&account_id, &token_id, change.after_as::<PaymentToken>())
        .await?;

    Ok(Json(outcome))
}

#[instrument(skip(state, change))]
async fn item_written(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(change): Json<DocumentChange>,
) -> Result<Json<ItemCleanup>, AppError> {
    let item_id = parse_segment::<ItemId>(item_id)?;

    if !change.is_deletion() {
        debug!(item_id = %item_id, "Item written, not deleted");
        return Ok(Json(ItemCleanup::Ignored));
    }

    let Some(deletion) = state
        .catalog()
        .on_item_deleted(change.before_as::<CatalogItem>())
    else {
        return Ok(Json(ItemCleanup::NoItemId));
    };

    let prefix = deletion.prefix().to_string();
    if !state.await_bulk_deletes() {
        deletion.detach();
        return Ok(Json(ItemCleanup::Started { prefix }));
    }

    // The task has already logged a failure
    Ok(Json(match deletion.wait().await {
        Ok(objects) => ItemCleanup::Deleted { prefix, objects },
        Err(_) => ItemCleanup::Failed { prefix },
    }))
}

fn parse_segment<T>(raw: String) -> Result<T, AppError>
where
    T: TryFrom<String>,
    T::Error: std::fmt::Display,
{
    T::try_from(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}
