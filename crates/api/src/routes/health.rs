//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use booking_store::BookingStore;
use notifications::JobQueue;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `"disabled"` when no webhook signing secret is configured.
    pub webhook_signatures: &'static str,
}

/// GET /health — returns system health status.
pub async fn check<S, Q>(State(state): State<Arc<AppState<S, Q>>>) -> Json<HealthResponse>
where
    S: BookingStore + Clone + 'static,
    Q: JobQueue + 'static,
{
    let webhook_signatures = if state.reconciler.signatures_disabled() {
        "disabled"
    } else {
        "enforced"
    };
    Json(HealthResponse {
        status: "ok",
        webhook_signatures,
    })
}
