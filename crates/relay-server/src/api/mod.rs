pub mod health;
pub mod relay;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderName;
use axum::routing::{get, options, post};
use relay_dispatcher::Dispatcher;
use relay_state::ConfigStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn ConfigStore>,
}

/// Build the Axum router: the inbound surface of spec §6 plus the
/// middleware the corpus applies uniformly (tracing, permissive CORS
/// exposing the `X-Proxy-*` diagnostic headers).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static("x-proxy-account"),
            HeaderName::from_static("x-proxy-strategy"),
            HeaderName::from_static("x-proxy-tenant"),
        ]);

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/models", get(health::list_models))
        .route("/v1/messages", post(relay::dispatch))
        .route("/v1/messages/count_tokens", post(relay::dispatch))
        .route("/v1/chat/completions", post(relay::dispatch))
        .route("/{*wildcard}", options(relay::options_ok))
        .route("/", options(relay::options_ok))
        .fallback(|| async { (axum::http::StatusCode::NOT_FOUND, "not found") })
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
