mod handler;
pub mod protocol;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use ballot_core::AppState;

const MAX_FRAME_BYTES: usize = 1024 * 1024;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn is_origin_allowed(headers: &HeaderMap, client_origin: &str) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        // Native clients and non-browser callers typically omit Origin.
        return true;
    };

    let allowed = normalize_origin(client_origin);
    if allowed == "*" || allowed == normalize_origin(origin) {
        return true;
    }

    // Same-origin upgrades are fine even when the client origin points elsewhere.
    if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        let origin_no_scheme = origin
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        return origin_no_scheme == host.trim().to_ascii_lowercase();
    }

    false
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !is_origin_allowed(&headers, &state.config.client_origin) {
        tracing::debug!("gateway: rejected upgrade from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.max_message_size(MAX_FRAME_BYTES)
        .max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handler::handle_connection(socket, state))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(origin: Option<&str>, host: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(origin) = origin {
            map.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        if let Some(host) = host {
            map.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        }
        map
    }

    #[test]
    fn missing_origin_is_allowed() {
        assert!(is_origin_allowed(&headers(None, None), "http://localhost:3000"));
    }

    #[test]
    fn configured_origin_is_allowed_case_and_slash_insensitive() {
        let h = headers(Some("HTTP://LocalHost:3000/"), Some("api.example.com"));
        assert!(is_origin_allowed(&h, "http://localhost:3000"));
    }

    #[test]
    fn wildcard_allows_any_origin() {
        let h = headers(Some("https://elsewhere.example"), Some("api.example.com"));
        assert!(is_origin_allowed(&h, "*"));
    }

    #[test]
    fn same_host_origin_is_allowed() {
        let h = headers(Some("https://polls.example.com"), Some("polls.example.com"));
        assert!(is_origin_allowed(&h, "http://localhost:3000"));
    }

    #[test]
    fn foreign_origin_is_rejected() {
        let h = headers(Some("https://evil.example"), Some("polls.example.com"));
        assert!(!is_origin_allowed(&h, "http://localhost:3000"));
    }
}
