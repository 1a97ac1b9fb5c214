use ballot_core::events::RelayEvent;
use ballot_models::realtime::{self, Frame};
use serde_json::Value;

/// A client frame the relay acts on. Anything else is dropped unparsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Subscribe {
        poll_id: String,
    },
    Unsubscribe {
        poll_id: String,
    },
    PollCreated(Value),
    PollUpdated(Value),
    PollDeleted {
        poll_id: String,
    },
    VoteCast {
        poll_id: String,
        option_id: Option<String>,
        updated_poll: Value,
    },
}

fn id_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a text frame. Malformed JSON, unknown events and a missing `pollId`
/// all yield `None`.
pub fn parse_client_event(text: &str) -> Option<ClientEvent> {
    let frame: Frame = serde_json::from_str(text).ok()?;
    let data = frame.data;

    let event = match frame.event.as_str() {
        realtime::SUBSCRIBE => ClientEvent::Subscribe {
            poll_id: id_field(&data, "pollId")?,
        },
        realtime::UNSUBSCRIBE => ClientEvent::Unsubscribe {
            poll_id: id_field(&data, "pollId")?,
        },
        realtime::POLL_CREATED => ClientEvent::PollCreated(data),
        realtime::POLL_UPDATED => ClientEvent::PollUpdated(data),
        realtime::POLL_DELETED => ClientEvent::PollDeleted {
            poll_id: id_field(&data, "pollId")?,
        },
        realtime::VOTE_CAST => ClientEvent::VoteCast {
            poll_id: id_field(&data, "pollId")?,
            option_id: id_field(&data, "optionId"),
            updated_poll: data.get("updatedPoll").cloned().unwrap_or(Value::Null),
        },
        _ => return None,
    };
    Some(event)
}

pub fn encode_event(event: &RelayEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame {
        event: event.event_type.clone(),
        data: event.payload.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_subscription_frames() {
        assert_eq!(
            parse_client_event(r#"{"event":"subscribe","data":{"pollId":"P1"}}"#),
            Some(ClientEvent::Subscribe {
                poll_id: "P1".into()
            })
        );
        assert_eq!(
            parse_client_event(r#"{"event":"unsubscribe","data":{"pollId":"P1"}}"#),
            Some(ClientEvent::Unsubscribe {
                poll_id: "P1".into()
            })
        );
    }

    #[test]
    fn parses_vote_cast_with_snapshot() {
        let text = json!({
            "event": "vote_cast",
            "data": { "pollId": "P1", "optionId": "o1", "updatedPoll": { "totalVotes": 3 } }
        })
        .to_string();
        assert_eq!(
            parse_client_event(&text),
            Some(ClientEvent::VoteCast {
                poll_id: "P1".into(),
                option_id: Some("o1".into()),
                updated_poll: json!({ "totalVotes": 3 }),
            })
        );
    }

    #[test]
    fn poll_payloads_pass_through_untouched() {
        let text = json!({ "event": "poll_updated", "data": { "id": "P1", "anything": [1, 2] } })
            .to_string();
        assert_eq!(
            parse_client_event(&text),
            Some(ClientEvent::PollUpdated(json!({ "id": "P1", "anything": [1, 2] })))
        );
    }

    #[test]
    fn malformed_frames_are_ignored() {
        for text in [
            "not json",
            r#"{"data":{"pollId":"P1"}}"#,
            r#"{"event":"subscribe","data":{}}"#,
            r#"{"event":"subscribe","data":{"pollId":""}}"#,
            r#"{"event":"subscribe"}"#,
            r#"{"event":"poll_deleted","data":{"pollId":null}}"#,
            r#"{"event":"vote_cast","data":{"optionId":"o1"}}"#,
            r#"{"event":"shutdown","data":{}}"#,
        ] {
            assert_eq!(parse_client_event(text), None, "{text}");
        }
    }

    #[test]
    fn encodes_relay_events_as_frames() {
        let event = RelayEvent {
            event_type: "poll_deleted".into(),
            payload: json!({ "pollId": "P1" }),
            channel: None,
        };
        let text = encode_event(&event).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "event": "poll_deleted", "data": { "pollId": "P1" } }));
    }
}
