//! Topology Monitoring
//!
//! The APM module provides an interface for monitoring and responding to
//! runtime changes in the cluster's view of its servers. Every applied
//! description update can trigger hooks registered on the cluster's
//! listener: servers being added to or removed from the topology, a single
//! server's description changing, and the overall topology reclassifying.
mod event;
mod listener;

pub use self::event::{
    ServerAdded, ServerDescriptionChanged, ServerRemoved, TopologyChanged,
};
pub use self::listener::{EventHandler, Listener};
