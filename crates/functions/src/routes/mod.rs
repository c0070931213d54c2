//! HTTP routes.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                       - Liveness check
//!
//! # Auth triggers
//! POST /triggers/auth/user-created                   - Seed profile documents
//! POST /triggers/auth/user-deleted                   - Remove profile documents and image
//!
//! # Firestore triggers ({before?, after?} bodies)
//! POST /triggers/cards/{accountId}/tokens/{tokenId}  - Sync payment source
//! POST /triggers/items/{itemId}                      - Delete item images
//! ```

use axum::{Router, routing::get};

use crate::state::AppState;

pub mod triggers;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(triggers::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
