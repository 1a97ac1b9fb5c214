use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::observability;

#[derive(Debug, Clone)]
pub struct RelayEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Poll channel this event is scoped to. `None` reaches every session.
    pub channel: Option<String>,
}

/// Registry of connected sessions and the poll channels each one joined.
///
/// Each session owns a bounded broadcast queue; publishing never blocks on a
/// slow reader, which instead observes a lag and skips ahead.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    sessions: Arc<RwLock<HashMap<String, SessionSubscription>>>,
}

#[derive(Clone)]
struct SessionSubscription {
    channels: HashSet<String>,
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn write_sessions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionSubscription>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionSubscription>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register_session(
        &self,
        session_id: impl Into<String>,
    ) -> broadcast::Receiver<RelayEvent> {
        let (sender, receiver) = broadcast::channel(self.capacity.max(16));
        let subscription = SessionSubscription {
            channels: HashSet::new(),
            sender,
        };
        self.write_sessions().insert(session_id.into(), subscription);
        receiver
    }

    /// Drop a session and, with it, every channel membership it held.
    pub fn unregister_session(&self, session_id: &str) {
        self.write_sessions().remove(session_id);
    }

    pub fn join_channel(&self, session_id: &str, channel: &str) {
        if let Some(subscription) = self.write_sessions().get_mut(session_id) {
            subscription.channels.insert(channel.to_string());
        }
    }

    pub fn leave_channel(&self, session_id: &str, channel: &str) {
        if let Some(subscription) = self.write_sessions().get_mut(session_id) {
            subscription.channels.remove(channel);
        }
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    pub fn channel_member_count(&self, channel: &str) -> usize {
        self.read_sessions()
            .values()
            .filter(|s| s.channels.contains(channel))
            .count()
    }

    pub fn session_channels(&self, session_id: &str) -> Vec<String> {
        let mut channels: Vec<String> = self
            .read_sessions()
            .get(session_id)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    fn subscription_matches(subscription: &SessionSubscription, event: &RelayEvent) -> bool {
        match event.channel.as_deref() {
            Some(channel) => subscription.channels.contains(channel),
            None => true,
        }
    }

    pub fn publish(&self, event: RelayEvent) {
        let senders: Vec<broadcast::Sender<RelayEvent>> = self
            .read_sessions()
            .values()
            .filter(|subscription| Self::subscription_matches(subscription, &event))
            .map(|subscription| subscription.sender.clone())
            .collect();

        observability::relay_event_published(&event.event_type);
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    /// Publish to every connected session regardless of channel membership.
    pub fn broadcast(&self, event_type: &str, payload: serde_json::Value) {
        self.publish(RelayEvent {
            event_type: event_type.to_string(),
            payload,
            channel: None,
        });
    }

    /// Publish only to sessions that joined `channel`.
    pub fn broadcast_to_channel(&self, channel: &str, event_type: &str, payload: serde_json::Value) {
        self.publish(RelayEvent {
            event_type: event_type.to_string(),
            payload,
            channel: Some(channel.to_string()),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn channel_events_reach_only_members() {
        let bus = EventBus::default();
        let mut p1 = bus.register_session("s1");
        let mut p2 = bus.register_session("s2");
        bus.join_channel("s1", "P1");
        bus.join_channel("s2", "P2");

        bus.broadcast_to_channel("P1", "vote_update", json!({"pollId": "P1"}));

        let got = p1.try_recv().expect("P1 member receives");
        assert_eq!(got.event_type, "vote_update");
        assert_eq!(got.payload["pollId"], "P1");
        assert!(matches!(p2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn global_events_reach_sessions_without_channels() {
        let bus = EventBus::default();
        let mut idle = bus.register_session("idle");
        let mut member = bus.register_session("member");
        bus.join_channel("member", "P1");

        for event in ["poll_created", "poll_updated", "poll_deleted"] {
            bus.broadcast(event, json!({}));
        }

        for rx in [&mut idle, &mut member] {
            let kinds: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap().event_type).collect();
            assert_eq!(kinds, vec!["poll_created", "poll_updated", "poll_deleted"]);
        }
    }

    #[test]
    fn leaving_a_channel_stops_delivery() {
        let bus = EventBus::default();
        let mut rx = bus.register_session("s1");
        bus.join_channel("s1", "P1");
        bus.leave_channel("s1", "P1");

        bus.broadcast_to_channel("P1", "vote_update", json!({}));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn unregister_removes_all_memberships() {
        let bus = EventBus::default();
        let _rx = bus.register_session("s1");
        bus.join_channel("s1", "P1");
        bus.join_channel("s1", "P2");
        assert_eq!(bus.session_channels("s1"), vec!["P1", "P2"]);

        bus.unregister_session("s1");
        assert_eq!(bus.session_count(), 0);
        assert_eq!(bus.channel_member_count("P1"), 0);
        assert!(bus.session_channels("s1").is_empty());
    }

    #[test]
    fn one_session_may_join_many_channels() {
        let bus = EventBus::default();
        let mut rx = bus.register_session("s1");
        bus.join_channel("s1", "P1");
        bus.join_channel("s1", "P1");
        bus.join_channel("s1", "P2");
        assert_eq!(bus.channel_member_count("P1"), 1);

        bus.broadcast_to_channel("P2", "vote_update", json!({"pollId": "P2"}));
        assert_eq!(rx.try_recv().unwrap().payload["pollId"], "P2");
    }

    #[test]
    fn join_for_unknown_session_is_ignored() {
        let bus = EventBus::default();
        bus.join_channel("ghost", "P1");
        assert_eq!(bus.channel_member_count("P1"), 0);
    }
}
