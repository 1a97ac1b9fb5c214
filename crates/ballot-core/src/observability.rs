use ballot_models::realtime;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

const EVENT_TYPE_OTHER: &str = "other";
const RELAYED_EVENT_TYPES: [&str; 4] = [
    realtime::POLL_CREATED,
    realtime::POLL_UPDATED,
    realtime::POLL_DELETED,
    realtime::VOTE_UPDATE,
];

static RELAY_CONNECTIONS_ACTIVE: AtomicU64 = AtomicU64::new(0);
static RELAY_EVENTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RELAY_EVENTS_BY_TYPE: OnceLock<Mutex<HashMap<&'static str, u64>>> = OnceLock::new();

fn lock_events_by_type() -> std::sync::MutexGuard<'static, HashMap<&'static str, u64>> {
    let map = RELAY_EVENTS_BY_TYPE.get_or_init(|| Mutex::new(HashMap::new()));
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn event_type_key(raw: &str) -> &'static str {
    RELAYED_EVENT_TYPES
        .iter()
        .copied()
        .find(|known| *known == raw)
        .unwrap_or(EVENT_TYPE_OTHER)
}

pub fn relay_connection_open() {
    RELAY_CONNECTIONS_ACTIVE.fetch_add(1, Ordering::Relaxed);
}

pub fn relay_connection_close() {
    let _ = RELAY_CONNECTIONS_ACTIVE.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(1))
    });
}

pub fn relay_event_published(event_type: &str) {
    RELAY_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);

    let mut by_type = lock_events_by_type();
    let entry = by_type.entry(event_type_key(event_type)).or_insert(0);
    *entry = entry.saturating_add(1);
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMetricsSnapshot {
    pub active_connections: u64,
    pub total_events: u64,
    pub events_by_type: Vec<(&'static str, u64)>,
}

pub fn relay_metrics_snapshot() -> RelayMetricsSnapshot {
    let mut events_by_type: Vec<(&'static str, u64)> = lock_events_by_type()
        .iter()
        .map(|(event_type, count)| (*event_type, *count))
        .collect();
    events_by_type.sort_unstable();

    RelayMetricsSnapshot {
        active_connections: RELAY_CONNECTIONS_ACTIVE.load(Ordering::Relaxed),
        total_events: RELAY_EVENTS_TOTAL.load(Ordering::Relaxed),
        events_by_type,
    }
}
