/// Core abstractions shared by the routers, the pools and the failover coordinator
pub mod connection;

pub use connection::{ConnectOptions, Connection, ConnectionFactory};

use crate::error::{ConfigError, ShardwireError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A server endpoint. Identity is host and port; the credential rides along.
#[derive(Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    password: Option<String>,
}

impl Endpoint {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl FromStr for Endpoint {
    type Err = ShardwireError;

    /// Parse `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            ConfigError::ValidationError(format!("Endpoint '{}' must be host:port", s))
        })?;
        if host.is_empty() {
            return Err(ConfigError::ValidationError(format!("Endpoint '{}' has no host", s)).into());
        }
        let port = port.parse::<u16>().map_err(|e| {
            ConfigError::ValidationError(format!("Endpoint '{}' has an invalid port: {}", s, e))
        })?;
        Ok(Endpoint::new(host, port))
    }
}

/// One shard of a client-side sharded deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardDescriptor {
    pub endpoint: Endpoint,
    pub weight: u32,
    pub name: Option<String>,
}

impl ShardDescriptor {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            weight: 1,
            name: None,
        }
    }

    /// Weights are positive; zero is raised to one.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for ShardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})*{}", name, self.endpoint, self.weight),
            None => write!(f, "{}*{}", self.endpoint, self.weight),
        }
    }
}
