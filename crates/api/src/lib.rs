//! HTTP API server for payment webhook reconciliation and price quotes.
//!
//! Exposes the gateway webhook endpoint and the quote call used by checkout,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use booking_store::BookingStore;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::JobQueue;
use reconciler::WebhookReconciler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: BookingStore, Q: JobQueue> {
    pub reconciler: WebhookReconciler<S, Q>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, Q>(state: Arc<AppState<S, Q>>, metrics_handle: PrometheusHandle) -> Router
where
    S: BookingStore + Clone + 'static,
    Q: JobQueue + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, Q>))
        .route("/quotes", post(routes::quotes::create))
        .route("/webhooks/payments", post(routes::webhooks::receive::<S, Q>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over the given store and job queue.
pub fn create_default_state<S, Q>(store: S, queue: Q, config: &Config) -> Arc<AppState<S, Q>>
where
    S: BookingStore + Clone + 'static,
    Q: JobQueue + 'static,
{
    Arc::new(AppState {
        reconciler: WebhookReconciler::new(store, queue, config.reconciler_config()),
    })
}
