use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete rostersync configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterSyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// HTTP / WebSocket listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// When set, socket connections must pass `?token=<value>`
    #[serde(default)]
    pub socket_token: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:4080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            socket_token: None,
        }
    }
}

/// Topic names both sides agree on
#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_roster_topic")]
    pub roster: String,
    #[serde(default = "default_lobby_topic")]
    pub lobby: String,
}

fn default_roster_topic() -> String {
    "superheroes:lobby".to_string()
}

fn default_lobby_topic() -> String {
    "notifications:lobby".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            roster: default_roster_topic(),
            lobby: default_lobby_topic(),
        }
    }
}

/// Broadcast channel capacities. A connection that falls further behind
/// than this is re-synced.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_roster_capacity")]
    pub roster_capacity: usize,
    #[serde(default = "default_lobby_capacity")]
    pub lobby_capacity: usize,
}

fn default_roster_capacity() -> usize {
    1000
}

fn default_lobby_capacity() -> usize {
    100
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            roster_capacity: default_roster_capacity(),
            lobby_capacity: default_lobby_capacity(),
        }
    }
}

/// Client-side tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_feed_window")]
    pub feed_window: usize,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Mutations held while waiting for the snapshot
    #[serde(default = "default_max_pending_mutations")]
    pub max_pending_mutations: usize,
}

fn default_feed_window() -> usize {
    crate::notification::DEFAULT_FEED_WINDOW
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_max_pending_mutations() -> usize {
    crate::sync::DEFAULT_MAX_PENDING
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            feed_window: default_feed_window(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            max_pending_mutations: default_max_pending_mutations(),
        }
    }
}

impl ClientConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }
}

impl RosterSyncConfig {
    /// Load from `ROSTERSYNC_CONFIG` if set (defaults otherwise), then apply
    /// env overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("ROSTERSYNC_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override individual settings from a variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ROSTERSYNC_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(token) = lookup("ROSTERSYNC_SOCKET_TOKEN") {
            self.server.socket_token = if token.is_empty() { None } else { Some(token) };
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<RosterSyncConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: RosterSyncConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RosterSyncConfig::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:4080");
        assert!(config.server.socket_token.is_none());
        assert_eq!(config.topics.roster, "superheroes:lobby");
        assert_eq!(config.topics.lobby, "notifications:lobby");
        assert_eq!(config.client.feed_window, 5);
        assert_eq!(config.client.max_pending_mutations, 256);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "0.0.0.0:9000"
            socket_token = "secret"

            [topics]
            roster = "heroes:all"
            lobby = "chat:all"

            [broadcast]
            roster_capacity = 10
            lobby_capacity = 20

            [client]
            feed_window = 3
            heartbeat_interval_seconds = 5
            max_pending_mutations = 8
        "#;

        let config: RosterSyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.server.socket_token.as_deref(), Some("secret"));
        assert_eq!(config.topics.roster, "heroes:all");
        assert_eq!(config.broadcast.lobby_capacity, 20);
        assert_eq!(config.client.feed_window, 3);
        assert_eq!(config.client.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and keys use defaults
        let toml = r#"
            [client]
            feed_window = 10
        "#;

        let config: RosterSyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.client.feed_window, 10);
        assert_eq!(config.client.heartbeat_interval_seconds, 30);
        assert_eq!(config.broadcast.roster_capacity, 1000);
        assert_eq!(config.topics.lobby, "notifications:lobby");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_addr = \"127.0.0.1:5000\"").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:5000");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/rostersync.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROSTERSYNC_BIND_ADDR", "0.0.0.0:1234"),
            ("ROSTERSYNC_SOCKET_TOKEN", "abc"),
        ]
        .into_iter()
        .collect();

        let mut config = RosterSyncConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.bind_addr, "0.0.0.0:1234");
        assert_eq!(config.server.socket_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_token_disables_check() {
        let mut config = RosterSyncConfig::default();
        config.server.socket_token = Some("old".to_string());
        config.apply_env_overrides(|key| {
            (key == "ROSTERSYNC_SOCKET_TOKEN").then(String::new)
        });
        assert!(config.server.socket_token.is_none());
    }
}
