//! Cluster orchestration: owns the monitors, pools, and the authoritative
//! topology, and reconciles them as probe results arrive.
use crate::apm::{
    Listener, ServerAdded, ServerDescriptionChanged, ServerRemoved, TopologyChanged,
};
use crate::common::{ClusterOptions, ReadPreference};
use crate::connstring::{self, Host};
use crate::error::Error::{ArgumentError, NoServerAvailableError};
use crate::error::Result;
use crate::pool::{Connection, PoolRegistry};
use crate::stream::StreamConnector;
use crate::topology::server::{Server, ServerDescription};
use crate::topology::TopologyDescription;
use crate::wire::CommandExecutor;

use log::debug;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Interfaces with a server deployment: a standalone server, a replica set,
/// or a group of shard routers.
///
/// Cheap to clone; all clones share the same underlying state.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

struct ClusterState {
    topology: TopologyDescription,
    servers: HashMap<Host, Server>,
}

pub(crate) struct ClusterInner {
    options: ClusterOptions,
    connector: StreamConnector,
    executor: Arc<dyn CommandExecutor>,
    listener: Listener,
    pools: PoolRegistry,
    // Serializes every description application: the topology has exactly
    // one writer at a time.
    update_lock: Mutex<()>,
    state: RwLock<ClusterState>,
    // Bumped after each applied update so blocked selections re-evaluate.
    selection_epoch: Mutex<u64>,
    selection_signal: Condvar,
    monitoring: bool,
}

impl Cluster {
    /// Connects to the deployment at the given seeds, starting a background
    /// monitor per server.
    pub fn connect(
        seeds: &[&str],
        options: ClusterOptions,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Cluster> {
        Cluster::with_monitoring(seeds, options, executor, true)
    }

    /// Builds a cluster whose topology is driven only by explicitly applied
    /// description updates; no background monitors are started.
    pub fn unmonitored(
        seeds: &[&str],
        options: ClusterOptions,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Cluster> {
        Cluster::with_monitoring(seeds, options, executor, false)
    }

    fn with_monitoring(
        seeds: &[&str],
        options: ClusterOptions,
        executor: Arc<dyn CommandExecutor>,
        monitoring: bool,
    ) -> Result<Cluster> {
        options.validate()?;

        if seeds.is_empty() {
            return Err(ArgumentError(
                "At least one seed address is required.".to_owned(),
            ));
        }

        let mut hosts = Vec::new();
        for seed in seeds {
            hosts.push(connstring::parse_host(seed)?);
        }

        let connector = StreamConnector::default();

        let inner = Arc::new(ClusterInner {
            connector: connector.clone(),
            executor,
            listener: Listener::new(),
            pools: PoolRegistry::new(connector, &options),
            update_lock: Mutex::new(()),
            state: RwLock::new(ClusterState {
                topology: TopologyDescription::new(options.replica_set.clone()),
                servers: HashMap::new(),
            }),
            selection_epoch: Mutex::new(0),
            selection_signal: Condvar::new(),
            monitoring,
            options,
        });

        {
            let mut state = inner.state.write()?;
            for host in hosts {
                if state.topology.servers.contains_key(&host) {
                    continue;
                }
                state
                    .topology
                    .servers
                    .insert(host.clone(), ServerDescription::new(host.clone()));
                let server = ClusterInner::start_server(&inner, host.clone());
                state.servers.insert(host, server);
            }
        }

        Ok(Cluster { inner })
    }

    /// The current topology snapshot.
    pub fn topology(&self) -> TopologyDescription {
        self.inner.state.read().unwrap().topology.clone()
    }

    /// The configured or discovered replica set name.
    pub fn replica_set_name(&self) -> Option<String> {
        self.inner.state.read().unwrap().topology.set_name.clone()
    }

    /// The addresses currently being monitored.
    pub fn addresses(&self) -> Vec<Host> {
        let state = self.inner.state.read().unwrap();
        state.servers.keys().cloned().collect()
    }

    /// Registers a handler for topology events.
    pub fn add_event_handler(&self, handler: Arc<dyn crate::apm::EventHandler>) {
        self.inner.listener.add_handler(handler);
    }

    /// Applies a new description for a known server: the single-writer entry
    /// point behind which every topology mutation happens.
    ///
    /// Monitors feed their probe results through here; unmonitored clusters
    /// are driven by calling it directly.
    pub fn on_server_description_changed(&self, description: ServerDescription) {
        ClusterInner::apply_description(&self.inner, description);
    }

    /// Forces an immediate probe of every monitored server, returning once
    /// all of them have reported.
    pub fn scan(&self) {
        let servers: Vec<Server> = {
            let state = self.inner.state.read().unwrap();
            state.servers.values().cloned().collect()
        };

        for server in servers {
            server.scan();
        }
    }

    /// Selects a server satisfying the read preference, waiting up to the
    /// configured selection timeout for one to appear.
    pub fn select_server(&self, read_preference: &ReadPreference) -> Result<Server> {
        self.select_server_with_timeout(read_preference, self.inner.options.server_selection_timeout)
    }

    /// Selects a server satisfying the read preference, waiting up to
    /// `timeout`. Fails with `NoServerAvailableError` once the timeout
    /// elapses without a matching candidate.
    pub fn select_server_with_timeout(
        &self,
        read_preference: &ReadPreference,
        timeout: Duration,
    ) -> Result<Server> {
        let deadline = Instant::now() + timeout;
        let mut epoch = self.inner.selection_epoch.lock()?;

        loop {
            let picked = {
                let state = self.inner.state.read()?;
                state
                    .topology
                    .select(read_preference)
                    .map(|description| description.host.clone())
                    .and_then(|host| state.servers.get(&host).cloned())
            };

            if let Some(server) = picked {
                return Ok(server);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(NoServerAvailableError(format!(
                    "No server available for read preference {:?} within {:?}.",
                    read_preference.mode, timeout
                )));
            }

            let (guard, _) = self
                .inner
                .selection_signal
                .wait_timeout(epoch, deadline - now)?;
            epoch = guard;
        }
    }

    /// Selects a server and runs `f` with one of its pooled connections,
    /// checking the connection back in on every exit path.
    pub fn with_connection<T, F>(&self, read_preference: &ReadPreference, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let server = self.select_server(read_preference)?;
        server.with_connection(f)
    }
}

impl ClusterInner {
    fn start_server(inner: &Arc<ClusterInner>, host: Host) -> Server {
        Server::new(
            host.clone(),
            inner.pools.get(&host),
            inner.connector.clone(),
            inner.executor.clone(),
            &inner.options,
            Arc::downgrade(inner),
            inner.monitoring,
        )
    }

    /// Recomputes the topology from one updated description, reconciling the
    /// monitored server set and emitting events for every observed change.
    pub(crate) fn apply_description(inner: &Arc<ClusterInner>, description: ServerDescription) {
        let writer = inner.update_lock.lock().unwrap();

        let host = description.host.clone();
        let mut removed_servers = Vec::new();

        let emitted = {
            let mut state = inner.state.write().unwrap();

            if !state.topology.servers.contains_key(&host) {
                debug!("Discarding description update for unknown server {}.", host);
                return;
            }

            let old_topology = state.topology.clone();
            let previous = old_topology.servers[&host].clone();

            let mut descriptions = old_topology.servers.clone();
            descriptions.insert(host.clone(), description.clone());

            // Membership reconciliation: a replica set member's view of the
            // set defines which addresses should be monitored.
            let mut added = Vec::new();
            let mut removed = Vec::new();
            if description.is_replica_set_member() && !description.all_hosts().is_empty() {
                let mut desired: HashSet<Host> = description.all_hosts();
                desired.insert(host.clone());

                for known in descriptions.keys() {
                    if !desired.contains(known) {
                        removed.push(known.clone());
                    }
                }
                for member in desired {
                    if !descriptions.contains_key(&member) {
                        added.push(member);
                    }
                }
            }

            for member in &added {
                debug!("{}", ServerAdded { host: member.clone() });
                descriptions.insert(member.clone(), ServerDescription::new(member.clone()));
                let server = ClusterInner::start_server(inner, member.clone());
                state.servers.insert(member.clone(), server);
            }

            for member in &removed {
                debug!("{}", ServerRemoved { host: member.clone() });
                descriptions.remove(member);
                if let Some(server) = state.servers.remove(member) {
                    removed_servers.push(server);
                }
                inner.pools.remove(member);
            }

            let new_topology = TopologyDescription::with_descriptions(&old_topology, descriptions);
            state.topology = new_topology.clone();

            // Keep the server handle's shared description in sync for
            // updates that did not come from its own monitor.
            if let Some(server) = state.servers.get(&host) {
                *server.description.write().unwrap() = description.clone();
            }

            (previous, added, removed, old_topology, new_topology)
        };

        let (previous, added, removed, old_topology, new_topology) = emitted;

        inner.listener.server_description_changed(&ServerDescriptionChanged {
            host: host.clone(),
            previous,
            new: description,
        });
        for member in added {
            inner.listener.server_added(&ServerAdded { host: member });
        }
        for member in removed {
            inner.listener.server_removed(&ServerRemoved { host: member });
        }
        if topology_changed(&old_topology, &new_topology) {
            inner.listener.topology_changed(&TopologyChanged {
                previous: old_topology,
                new: new_topology,
            });
        }

        // Wake any selection blocked on a topology change.
        {
            let mut epoch = inner.selection_epoch.lock().unwrap();
            *epoch += 1;
            inner.selection_signal.notify_all();
        }

        drop(writer);

        // Stopping joins the monitor threads, so it must happen outside the
        // update lock: a removed monitor may be blocked on it mid-report.
        for server in removed_servers {
            server.stop();
        }
    }
}

fn topology_changed(old: &TopologyDescription, new: &TopologyDescription) -> bool {
    if old.topology_type != new.topology_type || old.set_name != new.set_name {
        return true;
    }
    if old.servers.len() != new.servers.len() {
        return true;
    }
    new.servers.keys().any(|host| !old.servers.contains_key(host))
}

impl Drop for ClusterInner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for server in state.servers.values() {
            server.stop();
        }
    }
}
