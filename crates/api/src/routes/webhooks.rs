//! Payment gateway webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use booking_store::BookingStore;
use notifications::JobQueue;
use reconciler::SIGNATURE_HEADER;
use serde_json::Value;

use crate::AppState;
use crate::error::ApiError;

/// POST /webhooks/payments — verifies and reconciles one gateway delivery.
///
/// The raw body is passed through untouched; the signature covers the
/// exact bytes the gateway sent. 200 acknowledges the delivery, 400
/// rejects it permanently and 500 asks the gateway to retry.
pub async fn receive<S, Q>(
    State(state): State<Arc<AppState<S, Q>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError>
where
    S: BookingStore + Clone + 'static,
    Q: JobQueue + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state.reconciler.handle_event(&body, signature).await;
    let response = ack.body();
    ack.result.map(|_| Json(response)).map_err(ApiError::from)
}
