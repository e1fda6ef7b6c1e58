//! Configuration file support for bgpvpn-ovnd
//!
//! Loads and validates the driver configuration from a TOML file.
//! Default location: /etc/bgpvpn/bgpvpn-ovnd.toml

use std::fs;
use std::path::Path;
use std::time::Duration;

use bgpvpn_common::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};

use crate::tables::{EVENT_QUEUE_KEY, LOGICAL_SWITCH_PREFIX, LOGICAL_SWITCH_TABLE_NAME};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bgpvpn/bgpvpn-ovnd.toml";

/// Upper bound of `events.poll_timeout_secs`
pub const MAX_POLL_TIMEOUT_SECS: f64 = 3600.0;

/// Metadata store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number holding logical switches
    #[serde(default = "default_store_db_number")]
    pub db_number: u32,

    /// Logical switch table name
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Prefix prepended to a network id to form a logical switch name
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

/// Topology mirror configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number holding the topology mirror
    #[serde(default = "default_topology_db_number")]
    pub db_number: u32,
}

/// Event delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Redis list the events are popped from
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Blocking pop timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Complete bgpvpn-ovnd configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub metadata_store: StoreConfig,

    #[serde(default)]
    pub topology: TopologyConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_store_db_number() -> u32 {
    0
}

fn default_topology_db_number() -> u32 {
    4
}

fn default_table_name() -> String {
    LOGICAL_SWITCH_TABLE_NAME.to_string()
}

fn default_name_prefix() -> String {
    LOGICAL_SWITCH_PREFIX.to_string()
}

fn default_queue_key() -> String {
    EVENT_QUEUE_KEY.to_string()
}

fn default_poll_timeout() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            db_number: default_store_db_number(),
            table_name: default_table_name(),
            name_prefix: default_name_prefix(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            db_number: default_topology_db_number(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Returns the Redis connection URI
    pub fn uri(&self) -> String {
        redis_uri(&self.redis_host, self.redis_port, self.db_number)
    }
}

impl TopologyConfig {
    /// Returns the Redis connection URI
    pub fn uri(&self) -> String {
        redis_uri(&self.redis_host, self.redis_port, self.db_number)
    }
}

fn redis_uri(host: &str, port: u16, db: u32) -> String {
    format!("redis://{}:{}/{}", host, port, db)
}

impl DriverConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> DriverResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DriverError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "bgpvpn-ovnd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(DriverError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> DriverResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Get event poll timeout as Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.events.poll_timeout_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_poll_timeout()))
    }

    /// Validate configuration
    pub fn validate(&self) -> DriverResult<()> {
        if self.metadata_store.redis_port == 0 || self.topology.redis_port == 0 {
            return Err(DriverError::Config("redis_port must be > 0".to_string()));
        }

        if self.metadata_store.table_name.is_empty() {
            return Err(DriverError::Config(
                "metadata_store.table_name must not be empty".to_string(),
            ));
        }

        if self.events.queue_key.is_empty() {
            return Err(DriverError::Config(
                "events.queue_key must not be empty".to_string(),
            ));
        }

        let timeout = self.events.poll_timeout_secs;
        if !(timeout.is_finite() && timeout > 0.0 && timeout <= MAX_POLL_TIMEOUT_SECS) {
            return Err(DriverError::Config(format!(
                "events.poll_timeout_secs must be in (0, {}], got {}",
                MAX_POLL_TIMEOUT_SECS, timeout
            )));
        }

        Ok(())
    }
}

/// Data-plane agent settings this driver's metadata is meant for.
const RECOMMENDED_AGENT_CONFIG: &str = r#"# Recommended ovn-bgp-agent.conf for BGPVPN integration

[DEFAULT]
driver = ovn_evpn_driver
exposing_method = vrf
evpn_local_ip = <VTEP_IP>
bgp_AS = <YOUR_AS>
bgp_router_id = <ROUTER_ID>

[ovn]
ovn_nb_connection = tcp:<NB_IP>:6641
ovn_sb_connection = tcp:<SB_IP>:6642
"#;

/// Returns the recommended configuration of the agent consuming the metadata
pub fn recommended_agent_config() -> &'static str {
    RECOMMENDED_AGENT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!(config.metadata_store.redis_host, "127.0.0.1");
        assert_eq!(config.metadata_store.redis_port, 6379);
        assert_eq!(config.metadata_store.db_number, 0);
        assert_eq!(config.metadata_store.name_prefix, "neutron-");
        assert_eq!(config.topology.db_number, 4);
        assert_eq!(config.events.queue_key, "BGPVPN_EVENTS");
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uri() {
        let config = DriverConfig::default();
        assert_eq!(config.metadata_store.uri(), "redis://127.0.0.1:6379/0");
        assert_eq!(config.topology.uri(), "redis://127.0.0.1:6379/4");
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[metadata_store]\nredis_host = \"10.0.0.5\"\nname_prefix = \"ls-\"\n\n[events]\npoll_timeout_secs = 0.5"
        )
        .unwrap();

        let config = DriverConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.metadata_store.redis_host, "10.0.0.5");
        assert_eq!(config.metadata_store.name_prefix, "ls-");
        assert_eq!(config.metadata_store.redis_port, 6379);
        assert_eq!(config.poll_timeout(), Duration::from_millis(500));
        assert_eq!(config.topology, TopologyConfig::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DriverConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[metadata_store\nredis_port = 1").unwrap();
        assert!(matches!(
            DriverConfig::load_or_default(file.path()),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = DriverConfig::default();
        config.metadata_store.redis_port = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.events.poll_timeout_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.events.queue_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_poll_timeout_upper_bound() {
        let mut config = DriverConfig::default();
        config.events.poll_timeout_secs = 1e300;
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));
        assert_eq!(
            config.poll_timeout(),
            Duration::from_secs_f64(default_poll_timeout())
        );

        config.events.poll_timeout_secs = MAX_POLL_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recommended_agent_config() {
        let text = recommended_agent_config();
        assert!(text.contains("driver = ovn_evpn_driver"));
        assert!(text.contains("[ovn]"));
    }
}
