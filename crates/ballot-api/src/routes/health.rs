use axum::{extract::State, Json};
use ballot_core::{observability, AppState};
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "realtime": {
            "sessions": state.event_bus.session_count(),
            "metrics": observability::relay_metrics_snapshot(),
        },
    }))
}
