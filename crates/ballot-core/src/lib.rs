pub mod error;
pub mod events;
pub mod observability;
pub mod poll;

use ballot_db::DbPool;

/// Default per-connection queue depth for relayed events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Connected gateway sessions and their poll channel memberships.
    pub event_bus: events::EventBus,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            event_bus: events::EventBus::new(config.channel_capacity),
            config,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Browser origin allowed by CORS and the gateway origin check. `*` allows any.
    pub client_origin: String,
    pub channel_capacity: usize,
    /// When set, REST mutations also publish events built from the stored poll.
    /// Off by default: relayed state otherwise comes from the reporting client.
    pub authoritative_broadcasts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_origin: "http://localhost:3000".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            authoritative_broadcasts: false,
        }
    }
}
