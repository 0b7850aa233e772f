/// Unified error handling for shardwire
///
/// This module provides the error type system shared by the codec, the
/// resource pool, the routers, the topology parser and the failover
/// coordinator. Every fatal error can be wrapped with the endpoint and the
/// operation that produced it.

use std::io;
use thiserror::Error;

/// Main error type for shardwire operations
#[derive(Debug, Error)]
pub enum ShardwireError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Wire framing errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Resource pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Cluster topology errors
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Master election errors
    #[error("Failover error: {0}")]
    Failover(#[from] FailoverError),

    /// Key routing errors
    #[error("Routing error: {message}")]
    Routing { message: String },

    /// Timeout while connecting or exchanging frames
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// An error annotated with the endpoint and operation that produced it
    #[error("{operation} on {endpoint} failed: {source}")]
    Endpoint {
        endpoint: String,
        operation: String,
        #[source]
        source: Box<ShardwireError>,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Framing violations on the byte stream. All of them are fatal for the
/// connection that produced them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Line terminator expected, found byte 0x{found:02x}")]
    MissingTerminator { found: u8 },

    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    #[error("Invalid length: {0}")]
    InvalidLength(i64),

    #[error("Bulk length {0} exceeds the 512 MiB limit")]
    BulkTooLarge(usize),

    #[error("Unknown reply type: 0x{0:02x}")]
    UnknownReplyType(u8),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: String, reply: String },
}

/// Resource pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool [{pool}] timed out after {waited_ms}ms waiting for a resource")]
    Timeout { pool: String, waited_ms: u128 },

    #[error("Resource {id} belongs to another pool than [{pool}]")]
    ForeignResource { pool: String, id: u64 },

    #[error("Pool [{pool}] is shutting down")]
    ShuttingDown { pool: String },
}

/// Cluster topology parse errors. A topology update carrying any of them is
/// rejected as a whole.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Line {line}: node description has {fields} fields, at least 8 expected")]
    TooFewFields { line: usize, fields: usize },

    #[error("Line {line}: invalid node address '{address}'")]
    InvalidAddress { line: usize, address: String },

    #[error("Line {line}: invalid slot descriptor '{descriptor}'")]
    InvalidSlot { line: usize, descriptor: String },

    #[error("No seed node returned a usable topology")]
    NoReachableSeed,

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),
}

/// Master election errors
#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("No master available in group [{group}]")]
    NoMaster { group: String },

    #[error("{endpoint} isn't a member of group [{group}]")]
    UnknownMember { group: String, endpoint: String },

    #[error("Cannot determine the role of {endpoint}")]
    UnknownRole { endpoint: String },

    #[error("Failed to reconfigure replication on {endpoint}: {message}")]
    Reconfigure { endpoint: String, message: String },
}

/// Result type alias for shardwire operations
pub type ShardwireResult<T> = Result<T, ShardwireError>;

/// Convenience methods for creating and classifying errors
impl ShardwireError {
    /// Create a routing error
    pub fn routing<S: Into<String>>(message: S) -> Self {
        ShardwireError::Routing {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        ShardwireError::Timeout {
            operation: operation.into(),
        }
    }

    /// Annotate this error with the endpoint and operation it came from
    pub fn with_endpoint<E: ToString, S: Into<String>>(self, endpoint: E, operation: S) -> Self {
        ShardwireError::Endpoint {
            endpoint: endpoint.to_string(),
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with endpoint annotations stripped
    pub fn root(&self) -> &ShardwireError {
        match self {
            ShardwireError::Endpoint { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error means the connection it happened on is unusable
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.root(),
            ShardwireError::Network(_) | ShardwireError::Protocol(_) | ShardwireError::Timeout { .. }
        )
    }

    /// Check if this error is recoverable (a fresh attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self.root() {
            ShardwireError::Network(_) => true,
            ShardwireError::Protocol(_) => true,
            ShardwireError::Timeout { .. } => true,
            ShardwireError::Pool(PoolError::Timeout { .. }) => true,
            ShardwireError::Topology(TopologyError::NoReachableSeed) => true,
            _ => false,
        }
    }
}
