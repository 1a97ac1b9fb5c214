use axum::extract::ws::{Message, WebSocket};
use ballot_core::events::{EventBus, RelayEvent};
use ballot_core::{observability, AppState};
use ballot_models::realtime::{self, PollDeleted, VoteUpdate};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{self, ClientEvent};

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let events = state.event_bus.register_session(session_id.clone());
    observability::relay_connection_open();
    tracing::info!(session_id = %session_id, "gateway: client connected");

    let (sink, mut stream) = socket.split();

    let forward_session = session_id.clone();
    let forward = tokio::spawn(async move { forward_events(events, sink, &forward_session).await });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match protocol::parse_client_event(text.as_str()) {
                Some(event) => handle_client_event(&state.event_bus, &session_id, event),
                None => tracing::debug!(session_id = %session_id, "gateway: ignored frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = %session_id, "gateway: read error: {e}");
                break;
            }
        }
    }

    state.event_bus.unregister_session(&session_id);
    forward.abort();
    observability::relay_connection_close();
    tracing::info!(session_id = %session_id, "gateway: client disconnected");
}

/// Write relayed events to the client until the session is unregistered or
/// the sink fails. A lagging receiver skips the events it lost and carries on.
pub(crate) async fn forward_events<S>(
    mut events: broadcast::Receiver<RelayEvent>,
    mut sink: S,
    session_id: &str,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        match events.recv().await {
            Ok(event) => {
                let text = match protocol::encode_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("gateway: failed to encode {}: {e}", event.event_type);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    session_id = %session_id,
                    skipped,
                    "gateway: client fell behind, events dropped"
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Apply one client frame to the relay. Payloads are re-emitted as received.
pub(crate) fn handle_client_event(bus: &EventBus, session_id: &str, event: ClientEvent) {
    match event {
        ClientEvent::Subscribe { poll_id } => bus.join_channel(session_id, &poll_id),
        ClientEvent::Unsubscribe { poll_id } => bus.leave_channel(session_id, &poll_id),
        ClientEvent::PollCreated(poll) => bus.broadcast(realtime::POLL_CREATED, poll),
        ClientEvent::PollUpdated(poll) => bus.broadcast(realtime::POLL_UPDATED, poll),
        ClientEvent::PollDeleted { poll_id } => {
            bus.broadcast(realtime::POLL_DELETED, json!(PollDeleted { poll_id }))
        }
        ClientEvent::VoteCast {
            poll_id,
            option_id,
            updated_poll,
        } => {
            tracing::debug!(
                session_id = %session_id,
                poll_id = %poll_id,
                option_id = option_id.as_deref().unwrap_or("-"),
                "gateway: relaying vote"
            );
            bus.broadcast_to_channel(
                &poll_id,
                realtime::VOTE_UPDATE,
                json!(VoteUpdate {
                    poll_id: poll_id.clone(),
                    updated_poll,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::mpsc;

    fn frame(text: Value) -> ClientEvent {
        protocol::parse_client_event(&text.to_string()).expect("valid frame")
    }

    #[test]
    fn vote_update_reaches_only_the_poll_channel() {
        let bus = EventBus::default();
        let mut watcher_p1 = bus.register_session("watcher-p1");
        let mut watcher_p2 = bus.register_session("watcher-p2");
        let _voter = bus.register_session("voter");

        handle_client_event(
            &bus,
            "watcher-p1",
            frame(json!({ "event": "subscribe", "data": { "pollId": "P1" } })),
        );
        handle_client_event(
            &bus,
            "watcher-p2",
            frame(json!({ "event": "subscribe", "data": { "pollId": "P2" } })),
        );
        handle_client_event(
            &bus,
            "voter",
            frame(json!({
                "event": "vote_cast",
                "data": { "pollId": "P1", "optionId": "o1", "updatedPoll": { "totalVotes": 4 } }
            })),
        );

        let got = watcher_p1.try_recv().unwrap();
        assert_eq!(got.event_type, "vote_update");
        assert_eq!(
            got.payload,
            json!({ "pollId": "P1", "updatedPoll": { "totalVotes": 4 } })
        );
        assert!(matches!(watcher_p2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn unsubscribed_clients_still_get_global_events() {
        let bus = EventBus::default();
        let mut idle = bus.register_session("idle");
        let mut reporter = bus.register_session("reporter");

        handle_client_event(
            &bus,
            "reporter",
            frame(json!({ "event": "poll_created", "data": { "id": "P1" } })),
        );
        handle_client_event(
            &bus,
            "reporter",
            frame(json!({ "event": "poll_updated", "data": { "id": "P1", "question": "Q" } })),
        );
        handle_client_event(
            &bus,
            "reporter",
            frame(json!({ "event": "poll_deleted", "data": { "pollId": "P1" } })),
        );

        for rx in [&mut idle, &mut reporter] {
            assert_eq!(rx.try_recv().unwrap().payload, json!({ "id": "P1" }));
            assert_eq!(rx.try_recv().unwrap().event_type, "poll_updated");
            let deleted = rx.try_recv().unwrap();
            assert_eq!(deleted.event_type, "poll_deleted");
            assert_eq!(deleted.payload, json!({ "pollId": "P1" }));
        }
    }

    #[test]
    fn unsubscribe_leaves_the_channel() {
        let bus = EventBus::default();
        let mut rx = bus.register_session("s1");
        handle_client_event(
            &bus,
            "s1",
            frame(json!({ "event": "subscribe", "data": { "pollId": "P1" } })),
        );
        handle_client_event(
            &bus,
            "s1",
            frame(json!({ "event": "unsubscribe", "data": { "pollId": "P1" } })),
        );
        handle_client_event(
            &bus,
            "s1",
            frame(json!({ "event": "vote_cast", "data": { "pollId": "P1" } })),
        );
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn vote_cast_without_snapshot_relays_null() {
        let bus = EventBus::default();
        let mut rx = bus.register_session("s1");
        bus.join_channel("s1", "P1");
        handle_client_event(
            &bus,
            "s1",
            frame(json!({ "event": "vote_cast", "data": { "pollId": "P1" } })),
        );
        let got = rx.try_recv().unwrap();
        assert_eq!(got.payload["updatedPoll"], Value::Null);
    }

    async fn next_seq(rx: &mut mpsc::UnboundedReceiver<Message>) -> i64 {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("forwarder stalled");
        match message {
            Some(Message::Text(text)) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                frame["data"]["seq"].as_i64().unwrap()
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_session_skips_lost_events_and_keeps_forwarding() {
        let bus = EventBus::new(16);
        let events = bus.register_session("slow");
        for seq in 0..40 {
            bus.broadcast(realtime::POLL_UPDATED, json!({ "seq": seq }));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let sink = futures_util::sink::unfold(tx, |tx, message: Message| async move {
            tx.send(message).map(|_| tx)
        });
        let forward = tokio::spawn(async move { forward_events(events, Box::pin(sink), "slow").await });

        // The queue holds 16 events, so the first 24 are gone.
        for expected in 24..40 {
            assert_eq!(next_seq(&mut rx).await, expected);
        }

        bus.broadcast(realtime::POLL_UPDATED, json!({ "seq": 40 }));
        assert_eq!(next_seq(&mut rx).await, 40);

        bus.unregister_session("slow");
        tokio::time::timeout(Duration::from_secs(5), forward)
            .await
            .expect("forwarder did not stop")
            .unwrap();
    }
}
