//! # Client Configuration
//!
//! Purpose: Describe the endpoint, pool sizing, and cluster retry budget a
//! client is built from. Values are plain data so they can be loaded from
//! JSON; durations are expressed in milliseconds on the wire.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rbloom_common::{ClientError, ClientResult};

use crate::pool::PoolConfig;

/// Default number of attempts a cluster command may spend.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Configuration for a single-endpoint client and its pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional password sent with `AUTH` on every new connection.
    pub password: Option<String>,
    /// Optional name sent with `CLIENT SETNAME` on every new connection.
    pub client_name: Option<String>,
    /// TCP connect timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Read/write timeout on established connections.
    #[serde(with = "duration_ms")]
    pub socket_timeout: Duration,
    /// Maximum total connections (idle + in-use).
    pub pool_size: usize,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// How long `acquire` waits for a connection before failing.
    #[serde(with = "duration_ms")]
    pub wait_timeout: Duration,
    /// Idle connections unused for this long are closed. Zero disables eviction.
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Period of the idle eviction sweep. Zero disables the sweep.
    #[serde(with = "duration_ms")]
    pub eviction_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            client_name: None,
            connect_timeout: Duration::from_millis(500),
            socket_timeout: Duration::from_millis(500),
            pool_size: 100,
            max_idle: 100,
            wait_timeout: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(60),
            eviction_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `host:port`.
    pub fn for_addr(addr: &str) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.set_addr(addr)?;
        Ok(config)
    }

    /// Replaces host and port from a `host:port` string.
    pub fn set_addr(&mut self, addr: &str) -> ClientResult<()> {
        let (host, port) = split_addr(addr)?;
        self.host = host;
        self.port = port;
        Ok(())
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            serde_json::from_str(json).map_err(|err| ClientError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Endpoint address in `host:port` form.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects configurations that cannot produce a working pool.
    pub fn validate(&self) -> ClientResult<()> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must not be zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ClientError::Config("pool_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        let timeout = (!self.socket_timeout.is_zero()).then_some(self.socket_timeout);
        PoolConfig {
            addr: self.addr(),
            password: self.password.clone(),
            client_name: self.client_name.clone(),
            max_idle: self.max_idle.min(self.pool_size),
            max_total: self.pool_size,
            read_timeout: timeout,
            write_timeout: timeout,
            connect_timeout: (!self.connect_timeout.is_zero()).then_some(self.connect_timeout),
            wait_timeout: self.wait_timeout,
            idle_timeout: (!self.idle_timeout.is_zero()).then_some(self.idle_timeout),
        }
    }
}

/// Configuration for a cluster client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Seed nodes in `host:port` form, used to discover the slot table.
    pub seeds: Vec<String>,
    /// Attempts a command may spend on redirects and transient failures.
    pub max_attempts: usize,
    /// Template for every per-node pool; host and port are replaced.
    pub node: ClientConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            seeds: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            node: ClientConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Default configuration with the given seed nodes.
    pub fn with_seeds<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClusterConfig {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..ClusterConfig::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let config: ClusterConfig =
            serde_json::from_str(json).map_err(|err| ClientError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the cluster executor cannot run with.
    pub fn validate(&self) -> ClientResult<()> {
        if self.seeds.is_empty() {
            return Err(ClientError::Config("at least one seed node is required".to_string()));
        }
        for seed in &self.seeds {
            split_addr(seed)?;
        }
        if self.max_attempts == 0 {
            return Err(ClientError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.node.pool_size == 0 {
            return Err(ClientError::Config("pool_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Per-node configuration for `addr`.
    pub(crate) fn node_config(&self, addr: &str) -> ClientResult<ClientConfig> {
        let mut config = self.node.clone();
        config.set_addr(addr)?;
        Ok(config)
    }
}

fn split_addr(addr: &str) -> ClientResult<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ClientError::InvalidAddress(addr.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?;
    if host.is_empty() || port == 0 {
        return Err(ClientError::InvalidAddress(addr.to_string()));
    }
    Ok((host.to_string(), port))
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
