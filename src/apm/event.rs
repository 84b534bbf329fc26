use std::fmt::{Display, Error, Formatter};

use crate::connstring::Host;
use crate::topology::server::ServerDescription;
use crate::topology::TopologyDescription;

/// A server address appeared in the topology.
pub struct ServerAdded {
    pub host: Host,
}

impl Display for ServerAdded {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        fmt.write_fmt(format_args!("SERVER.{} ADDED", self.host))
    }
}

/// A server address left the topology.
pub struct ServerRemoved {
    pub host: Host,
}

impl Display for ServerRemoved {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        fmt.write_fmt(format_args!("SERVER.{} REMOVED", self.host))
    }
}

/// A probe produced a new description for a known server.
pub struct ServerDescriptionChanged {
    pub host: Host,
    pub previous: ServerDescription,
    pub new: ServerDescription,
}

impl Display for ServerDescriptionChanged {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        fmt.write_fmt(format_args!(
            "SERVER.{} CHANGED: {:?} -> {:?}",
            self.host, self.previous.server_type, self.new.server_type
        ))
    }
}

/// The topology's classification or membership changed.
pub struct TopologyChanged {
    pub previous: TopologyDescription,
    pub new: TopologyDescription,
}

impl Display for TopologyChanged {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        fmt.write_fmt(format_args!(
            "TOPOLOGY CHANGED: {:?} ({} servers) -> {:?} ({} servers)",
            self.previous.topology_type,
            self.previous.servers.len(),
            self.new.topology_type,
            self.new.servers.len()
        ))
    }
}
