use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ballot_core::poll::{CreatePollInput, UpdatePollInput, VoteInput};
use ballot_core::AppState;
use ballot_models::poll::Poll;
use ballot_models::realtime::{self, PollDeleted, VoteUpdate};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::extract::JsonBody;

// Relayed state normally comes from the client that made the change. With
// `authoritative_broadcasts` the handlers also publish the stored poll.

fn announce_global(state: &AppState, event_type: &str, payload: Value) {
    if state.config.authoritative_broadcasts {
        state.event_bus.broadcast(event_type, payload);
    }
}

fn announce_vote(state: &AppState, poll: &Poll) {
    if state.config.authoritative_broadcasts {
        state.event_bus.broadcast_to_channel(
            &poll.id,
            realtime::VOTE_UPDATE,
            json!(VoteUpdate {
                poll_id: poll.id.clone(),
                updated_poll: json!(poll),
            }),
        );
    }
}

pub async fn list_polls(State(state): State<AppState>) -> Result<Json<Vec<Poll>>, ApiError> {
    let polls = ballot_core::poll::list_polls(&state.db).await?;
    Ok(Json(polls))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ballot_core::poll::get_poll(&state.db, &poll_id).await?;
    Ok(Json(poll))
}

pub async fn create_poll(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreatePollInput>,
) -> Result<(StatusCode, Json<Poll>), ApiError> {
    let poll = ballot_core::poll::create_poll(&state.db, &body).await?;
    announce_global(&state, realtime::POLL_CREATED, json!(poll));
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn update_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    JsonBody(body): JsonBody<UpdatePollInput>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ballot_core::poll::update_poll(&state.db, &poll_id, &body).await?;
    announce_global(&state, realtime::POLL_UPDATED, json!(poll));
    Ok(Json(poll))
}

pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    JsonBody(body): JsonBody<VoteInput>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ballot_core::poll::cast_vote(&state.db, &poll_id, &body).await?;
    announce_vote(&state, &poll);
    Ok(Json(poll))
}

pub async fn unvote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    JsonBody(body): JsonBody<VoteInput>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ballot_core::poll::retract_vote(&state.db, &poll_id, &body).await?;
    announce_vote(&state, &poll);
    Ok(Json(poll))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<Poll>, ApiError> {
    let poll = ballot_core::poll::reset_poll(&state.db, &poll_id).await?;
    announce_global(&state, realtime::POLL_UPDATED, json!(poll));
    Ok(Json(poll))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ballot_core::poll::delete_poll(&state.db, &poll_id).await?;
    announce_global(
        &state,
        realtime::POLL_DELETED,
        json!(PollDeleted {
            poll_id: poll_id.clone(),
        }),
    );
    Ok(Json(json!({ "ok": true, "id": poll_id })))
}
