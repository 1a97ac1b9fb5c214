use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Browser origin allowed by CORS and the gateway. `*` allows any.
    pub client_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub channel_capacity: usize,
    pub authoritative_broadcasts: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            client_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/ballot.db".to_string(),
            max_connections: 8,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: ballot_core::DEFAULT_CHANNEL_CAPACITY,
            authoritative_broadcasts: false,
        }
    }
}

impl Config {
    /// Read `path` if it exists, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!("config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// `PORT`, `CLIENT_ORIGIN` and `DATABASE_URL` take precedence over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .server
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind_address = format!("{host}:{port}");
        }
        if let Some(origin) = lookup("CLIENT_ORIGIN").filter(|v| !v.trim().is_empty()) {
            self.server.client_origin = origin;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.database.url = url;
        }
    }

    pub fn app_config(&self) -> ballot_core::AppConfig {
        ballot_core::AppConfig {
            client_origin: self.server.client_origin.clone(),
            channel_capacity: self.realtime.channel_capacity,
            authoritative_broadcasts: self.realtime.authoritative_broadcasts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [server]
            client_origin = "*"

            [realtime]
            authoritative_broadcasts = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.client_origin, "*");
        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
        assert_eq!(config.database.max_connections, 8);
        assert!(config.realtime.authoritative_broadcasts);
        assert_eq!(config.realtime.channel_capacity, 256);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("CLIENT_ORIGIN", "https://polls.example.com"),
            ("DATABASE_URL", "sqlite::memory:"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.bind_address, "0.0.0.0:8081");
        assert_eq!(config.server.client_origin, "https://polls.example.com");
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| (key == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.realtime.channel_capacity, 256);
        assert!(!config.realtime.authoritative_broadcasts);
    }

    #[test]
    fn unreadable_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ballot.toml");
        std::fs::write(&path, "[server\nbind_address = 1").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
