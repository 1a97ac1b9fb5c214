pub mod error;
pub mod extract;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use ballot_core::AppState;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/polls",
            get(routes::polls::list_polls).post(routes::polls::create_poll),
        )
        .route(
            "/api/polls/{poll_id}",
            get(routes::polls::get_poll)
                .put(routes::polls::update_poll)
                .delete(routes::polls::delete_poll),
        )
        .route("/api/polls/{poll_id}/vote", post(routes::polls::vote))
        .route("/api/polls/{poll_id}/unvote", post(routes::polls::unvote))
        .route("/api/polls/{poll_id}/reset", post(routes::polls::reset))
}

/// CORS policy for the configured client origin. `*` allows any origin.
pub fn cors_layer(client_origin: &str) -> CorsLayer {
    let origin = client_origin.trim();
    let allow_origin = if origin == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("invalid client origin {origin:?}; cross-origin requests will be refused");
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}
