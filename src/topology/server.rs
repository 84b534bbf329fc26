use crate::cluster::ClusterInner;
use crate::common::ClusterOptions;
use crate::connstring::Host;
use crate::error::{Error, Result};
use crate::pool::{Connection, ConnectionPool, PooledStream};
use crate::stream::StreamConnector;
use crate::wire::CommandExecutor;

use chrono::{DateTime, Utc};

use std::collections::HashSet;
use std::sync::{Arc, RwLock, Weak};

use super::monitor::{IsMasterResult, Monitor};

/// Describes the server role within a server set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerType {
    /// Standalone server.
    Standalone,
    /// Shard router.
    Mongos,
    /// Replica set primary.
    RSPrimary,
    /// Replica set secondary.
    RSSecondary,
    /// Replica set arbiter.
    RSArbiter,
    /// Replica set member of some other type.
    RSOther,
    /// Replica set ghost member.
    RSGhost,
    /// Server type is currently unknown.
    Unknown,
}

impl ServerType {
    /// Whether servers of this type participate in replica set data
    /// membership.
    pub fn is_replica_set_member(self) -> bool {
        match self {
            ServerType::RSPrimary
            | ServerType::RSSecondary
            | ServerType::RSArbiter
            | ServerType::RSOther => true,
            _ => false,
        }
    }
}

/// An immutable snapshot of one server's observed state.
///
/// A probe always produces a brand-new description; existing values are
/// never mutated in place.
#[derive(Clone, Debug)]
pub struct ServerDescription {
    /// The probed address.
    pub host: Host,
    /// The server type.
    pub server_type: ServerType,
    /// Any error encountered while probing this server.
    pub err: Arc<Option<Error>>,
    /// The smoothed round-trip time to this server, in milliseconds.
    pub round_trip_time: Option<f64>,
    /// The server's own host information, if it is part of a replica set.
    pub me: Option<Host>,
    /// All hosts in the replica set known by this server.
    pub hosts: Vec<Host>,
    /// All passive members of the replica set known by this server.
    pub passives: Vec<Host>,
    /// All arbiters in the replica set known by this server.
    pub arbiters: Vec<Host>,
    /// The replica set name.
    pub set_name: String,
    /// The server's opinion of who the primary is.
    pub primary: Option<Host>,
    /// When this snapshot was taken.
    pub last_update: DateTime<Utc>,
}

impl ServerDescription {
    /// Returns a default, unknown server description.
    pub fn new(host: Host) -> ServerDescription {
        ServerDescription {
            host,
            server_type: ServerType::Unknown,
            err: Arc::new(None),
            round_trip_time: None,
            me: None,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            set_name: String::new(),
            primary: None,
            last_update: Utc::now(),
        }
    }

    /// Builds a description from a successful probe response.
    pub fn from_is_master(
        host: Host,
        ismaster: IsMasterResult,
        round_trip_time: f64,
    ) -> ServerDescription {
        if !ismaster.ok {
            return ServerDescription::from_error(
                host,
                Error::ResponseError("ismaster returned a not-ok response.".to_owned()),
            );
        }

        let set_name_empty = ismaster.set_name.is_empty();
        let msg_empty = ismaster.msg.is_empty();

        let server_type = if msg_empty && set_name_empty && !ismaster.is_replica_set {
            ServerType::Standalone
        } else if !msg_empty {
            ServerType::Mongos
        } else if ismaster.is_master && !set_name_empty {
            ServerType::RSPrimary
        } else if ismaster.is_secondary && !set_name_empty {
            ServerType::RSSecondary
        } else if ismaster.arbiter_only && !set_name_empty {
            ServerType::RSArbiter
        } else if !set_name_empty {
            ServerType::RSOther
        } else if ismaster.is_replica_set {
            ServerType::RSGhost
        } else {
            ServerType::Unknown
        };

        ServerDescription {
            host,
            server_type,
            err: Arc::new(None),
            round_trip_time: Some(round_trip_time),
            me: ismaster.me,
            hosts: ismaster.hosts,
            passives: ismaster.passives,
            arbiters: ismaster.arbiters,
            set_name: ismaster.set_name,
            primary: ismaster.primary,
            last_update: Utc::now(),
        }
    }

    /// Builds an unknown description carrying the probe error.
    pub fn from_error(host: Host, err: Error) -> ServerDescription {
        let mut description = ServerDescription::new(host);
        description.err = Arc::new(Some(err));
        description
    }

    /// The union of all member addresses this server reports.
    pub fn all_hosts(&self) -> HashSet<Host> {
        self.hosts
            .iter()
            .chain(self.passives.iter())
            .chain(self.arbiters.iter())
            .cloned()
            .collect()
    }

    pub fn is_replica_set_member(&self) -> bool {
        self.server_type.is_replica_set_member()
    }
}

/// Holds status and connection information about a single server.
#[derive(Clone)]
pub struct Server {
    /// Host connection details.
    pub host: Host,
    /// The last observed description of this server.
    pub description: Arc<RwLock<ServerDescription>>,
    /// The connection pool for this server.
    pool: Arc<ConnectionPool>,
    // The monitor that keeps the description up to date.
    monitor: Arc<Monitor>,
}

impl Server {
    /// Returns a new server with the given host, wiring up its monitor.
    /// The monitor thread is only spawned when `run_monitor` is set.
    pub(crate) fn new(
        host: Host,
        pool: Arc<ConnectionPool>,
        connector: StreamConnector,
        executor: Arc<dyn CommandExecutor>,
        options: &ClusterOptions,
        cluster: Weak<ClusterInner>,
        run_monitor: bool,
    ) -> Server {
        let description = Arc::new(RwLock::new(ServerDescription::new(host.clone())));

        let monitor = Arc::new(Monitor::new(
            host.clone(),
            connector,
            executor,
            options,
            pool.clone(),
            description.clone(),
            cluster,
        ));

        if run_monitor {
            Monitor::run(monitor.clone());
        }

        Server {
            host,
            description,
            pool,
            monitor,
        }
    }

    /// Returns a server stream from the connection pool.
    pub fn acquire_stream(&self) -> Result<PooledStream> {
        self.pool.checkout()
    }

    /// Runs `f` with a pooled connection, checking the connection back in on
    /// every exit path.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        self.pool.with_connection(f)
    }

    /// Forces an immediate probe, returning the resulting description.
    pub fn scan(&self) -> ServerDescription {
        self.monitor.scan()
    }

    /// Asks the monitor to cut its current sleep short and probe soon.
    pub fn request_update(&self) {
        self.monitor.request_update();
    }

    /// Stops the background monitor, synchronizing on its termination.
    pub(crate) fn stop(&self) {
        self.monitor.stop();
    }
}
