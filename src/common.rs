use crate::error::Error::ArgumentError;
use crate::error::Result;

use std::time::Duration;

/// How a read operation chooses among topology candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

#[derive(Debug, Clone)]
pub struct ReadPreference {
    pub mode: ReadMode,
}

impl ReadPreference {
    pub fn new(mode: ReadMode) -> ReadPreference {
        ReadPreference { mode }
    }

    pub fn primary() -> ReadPreference {
        ReadPreference::new(ReadMode::Primary)
    }

    pub fn nearest() -> ReadPreference {
        ReadPreference::new(ReadMode::Nearest)
    }
}

/// Cluster configuration, validated once at construction.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Maximum number of concurrent connections per server. Defaults to 5.
    pub pool_size: usize,
    /// Deadline for establishing a connection and for waiting on a pool
    /// checkout. Defaults to 500 ms.
    pub connect_timeout: Duration,
    /// Interval between two probes of the same server. Defaults to 500 ms.
    pub heartbeat_frequency: Duration,
    /// Bound on how long server selection may block waiting for a matching
    /// candidate. Defaults to 30 seconds.
    pub server_selection_timeout: Duration,
    /// Replica set name. When set, replica-set classification only admits
    /// members reporting this set name.
    pub replica_set: Option<String>,
}

impl Default for ClusterOptions {
    fn default() -> ClusterOptions {
        ClusterOptions {
            pool_size: 5,
            connect_timeout: Duration::from_millis(500),
            heartbeat_frequency: Duration::from_millis(500),
            server_selection_timeout: Duration::from_secs(30),
            replica_set: None,
        }
    }
}

impl ClusterOptions {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size < 1 {
            return Err(ArgumentError(
                "The connection pool size must be greater than zero.".to_owned(),
            ));
        }
        if self.connect_timeout == Duration::from_secs(0) {
            return Err(ArgumentError(
                "connect_timeout must be non-zero.".to_owned(),
            ));
        }
        if self.heartbeat_frequency == Duration::from_secs(0) {
            return Err(ArgumentError(
                "heartbeat_frequency must be non-zero.".to_owned(),
            ));
        }
        if self.server_selection_timeout == Duration::from_secs(0) {
            return Err(ArgumentError(
                "server_selection_timeout must be non-zero.".to_owned(),
            ));
        }
        if let Some(ref name) = self.replica_set {
            if name.is_empty() {
                return Err(ArgumentError(
                    "replica_set must not be an empty string.".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
