/// Configuration management for shardwire

use crate::core::{ConnectOptions, Endpoint, ShardDescriptor};
use crate::hashing::HashingStrategy;
use crate::pool::{ConnectionPools, PoolConfig};
use crate::protocol::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub use crate::error::ConfigError;

/// Main shardwire configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shards for client-side consistent hashing
    #[serde(default)]
    pub shards: Vec<ShardConfig>,
    /// Ring flavour
    #[serde(default)]
    pub hashing: HashingConfig,
    /// Connection pool sizing
    #[serde(default)]
    pub pool: PoolSettings,
    /// Cluster mode seeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterConfig>,
    /// Replicated group with master election
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One shard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashingConfig {
    /// plain, ketama, md5 or mixing64
    #[serde(default)]
    pub algorithm: HashingStrategy,
}

/// Pool sizing, shared by every per-endpoint pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections per endpoint
    pub resources_number: usize,
    /// Background repair workers per endpoint
    pub repair_threads_number: usize,
    /// Idle connections are revalidated after this long
    pub check_interval_millis: u64,
    /// Wait for a free connection when none is given explicitly
    pub default_wait_millis: u64,
    pub connect_timeout_millis: u64,
    /// Codec buffer size in bytes
    pub buffer_size: usize,
    /// Log pool counters this often; unset disables the report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval_millis: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// `host:port` of the nodes asked for the topology, in order
    pub seeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    pub group: String,
    /// `host:port` of every member, in election order
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Master check period
    #[serde(default = "default_failover_check_millis")]
    pub check_interval_millis: u64,
    /// Wait for a probe connection
    #[serde(default = "default_probe_wait_millis")]
    pub probe_wait_millis: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

fn default_weight() -> u32 {
    1
}

fn default_failover_check_millis() -> u64 {
    1000
}

fn default_probe_wait_millis() -> u64 {
    200
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            resources_number: 10,
            repair_threads_number: 3,
            check_interval_millis: 150_000,
            default_wait_millis: 50,
            connect_timeout_millis: 2000,
            buffer_size: DEFAULT_BUFFER_SIZE,
            report_interval_millis: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl ShardConfig {
    pub fn endpoint(&self) -> Endpoint {
        let endpoint = Endpoint::new(self.host.clone(), self.port);
        match &self.password {
            Some(password) => endpoint.with_password(password.clone()),
            None => endpoint,
        }
    }

    pub fn descriptor(&self) -> ShardDescriptor {
        let descriptor = ShardDescriptor::new(self.endpoint()).with_weight(self.weight);
        match &self.name {
            Some(name) => descriptor.with_name(name.clone()),
            None => descriptor,
        }
    }
}

fn parse_endpoints(addresses: &[String], password: Option<&str>, what: &str) -> Result<Vec<Endpoint>, ConfigError> {
    addresses
        .iter()
        .map(|address| {
            let endpoint: Endpoint = address
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("Invalid {}: {}", what, address)))?;
            Ok(match password {
                Some(password) => endpoint.with_password(password),
                None => endpoint,
            })
        })
        .collect()
}

impl ClusterConfig {
    pub fn seed_endpoints(&self) -> Result<Vec<Endpoint>, ConfigError> {
        parse_endpoints(&self.seeds, self.password.as_deref(), "cluster seed")
    }
}

impl FailoverConfig {
    pub fn member_endpoints(&self) -> Result<Vec<Endpoint>, ConfigError> {
        parse_endpoints(&self.members, self.password.as_deref(), "failover member")
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_millis)
    }

    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_millis)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() && self.cluster.is_none() && self.failover.is_none() {
            return Err(ConfigError::ValidationError(
                "at least one of shards, cluster or failover must be configured".to_string(),
            ));
        }

        for shard in &self.shards {
            if shard.host.is_empty() || shard.port == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid shard address: {}:{}",
                    shard.host, shard.port
                )));
            }
            if shard.weight == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Shard {}:{} weight must be greater than 0",
                    shard.host, shard.port
                )));
            }
        }

        // Validate pool config
        if self.pool.resources_number == 0 {
            return Err(ConfigError::ValidationError(
                "resources_number must be greater than 0".to_string(),
            ));
        }
        if self.pool.repair_threads_number == 0 {
            return Err(ConfigError::ValidationError(
                "repair_threads_number must be greater than 0".to_string(),
            ));
        }
        if self.pool.check_interval_millis == 0 {
            return Err(ConfigError::ValidationError(
                "check_interval_millis must be greater than 0".to_string(),
            ));
        }
        if self.pool.connect_timeout_millis == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_millis must be greater than 0".to_string(),
            ));
        }
        if self.pool.report_interval_millis == Some(0) {
            return Err(ConfigError::ValidationError(
                "report_interval_millis must be greater than 0 when set".to_string(),
            ));
        }
        if self.pool.buffer_size < 64 {
            return Err(ConfigError::ValidationError(
                "buffer_size must be at least 64 bytes".to_string(),
            ));
        }

        if let Some(cluster) = &self.cluster {
            if cluster.seeds.is_empty() {
                return Err(ConfigError::ValidationError(
                    "cluster seeds cannot be empty".to_string(),
                ));
            }
            cluster.seed_endpoints()?;
        }

        if let Some(failover) = &self.failover {
            if failover.group.is_empty() {
                return Err(ConfigError::ValidationError(
                    "failover group name cannot be empty".to_string(),
                ));
            }
            if failover.members.is_empty() {
                return Err(ConfigError::ValidationError(
                    "failover members cannot be empty".to_string(),
                ));
            }
            if failover.check_interval_millis == 0 {
                return Err(ConfigError::ValidationError(
                    "failover check_interval_millis must be greater than 0".to_string(),
                ));
            }
            failover.member_endpoints()?;
        }

        // Validate logging config
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log format: {}", self.logging.format)
            )),
        }

        Ok(())
    }

    pub fn shard_descriptors(&self) -> Vec<ShardDescriptor> {
        self.shards.iter().map(ShardConfig::descriptor).collect()
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            name: "shardwire".to_string(),
            resources_number: self.pool.resources_number,
            repair_threads_number: self.pool.repair_threads_number,
            check_interval: Duration::from_millis(self.pool.check_interval_millis),
            default_wait: Duration::from_millis(self.pool.default_wait_millis),
            report_interval: self.pool.report_interval_millis.map(Duration::from_millis),
            ..Default::default()
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.pool.connect_timeout_millis),
            buffer_size: self.pool.buffer_size,
        }
    }

    /// Per-endpoint pools sized by this configuration
    pub fn connection_pools(&self) -> ConnectionPools {
        ConnectionPools::new(self.pool_config(), self.connect_options())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P, mode: &str) -> Result<(), ConfigError> {
        let config = match mode {
            "sharded" => Config {
                shards: vec![
                    ShardConfig {
                        host: "10.0.1.10".to_string(),
                        port: 6379,
                        weight: 1,
                        name: Some("cache-a".to_string()),
                        password: None,
                    },
                    ShardConfig {
                        host: "10.0.1.11".to_string(),
                        port: 6379,
                        weight: 1,
                        name: Some("cache-b".to_string()),
                        password: None,
                    },
                    ShardConfig {
                        host: "10.0.1.12".to_string(),
                        port: 6379,
                        weight: 2,
                        name: Some("cache-c".to_string()),
                        password: None,
                    },
                ],
                hashing: HashingConfig {
                    algorithm: HashingStrategy::Ketama,
                },
                ..Default::default()
            },
            "cluster" => Config {
                cluster: Some(ClusterConfig {
                    seeds: vec![
                        "10.0.1.20:7000".to_string(),
                        "10.0.1.21:7000".to_string(),
                        "10.0.1.22:7000".to_string(),
                    ],
                    password: None,
                }),
                ..Default::default()
            },
            "failover" => Config {
                failover: Some(FailoverConfig {
                    group: "primary".to_string(),
                    members: vec![
                        "10.0.1.30:6379".to_string(),
                        "10.0.1.31:6379".to_string(),
                    ],
                    password: None,
                    check_interval_millis: default_failover_check_millis(),
                    probe_wait_millis: default_probe_wait_millis(),
                }),
                ..Default::default()
            },
            _ => return Err(ConfigError::ValidationError(
                "Mode must be 'sharded', 'cluster' or 'failover'".to_string(),
            )),
        };

        config.save_to_file(path)
    }
}
