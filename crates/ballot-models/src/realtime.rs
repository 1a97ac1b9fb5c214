use serde::{Deserialize, Serialize};
use serde_json::Value;

// Client -> server
pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const VOTE_CAST: &str = "vote_cast";

// Both directions
pub const POLL_CREATED: &str = "poll_created";
pub const POLL_UPDATED: &str = "poll_updated";
pub const POLL_DELETED: &str = "poll_deleted";

// Server -> client
pub const VOTE_UPDATE: &str = "vote_update";

/// A single gateway frame: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDeleted {
    pub poll_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdate {
    pub poll_id: String,
    #[serde(default)]
    pub updated_poll: Value,
}
