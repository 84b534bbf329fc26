//! Background server probing using isMaster results.
use crate::cluster::ClusterInner;
use crate::common::ClusterOptions;
use crate::connstring::{self, Host};
use crate::error::Error::ResponseError;
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::stream::{Stream, StreamConnector};
use crate::wire::CommandExecutor;

use super::server::ServerDescription;

use bson::{Bson, Document};
use bufstream::BufStream;
use log::debug;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// The weighting factor (alpha) for the moving round-trip time average.
const RTT_WEIGHT_FACTOR: f64 = 0.2;

/// Folds a new round-trip sample into the moving average. The first sample
/// seeds the estimate.
pub fn smooth_round_trip_time(previous: Option<f64>, sample_ms: f64) -> f64 {
    match previous {
        Some(prev) => RTT_WEIGHT_FACTOR * sample_ms + (1.0 - RTT_WEIGHT_FACTOR) * prev,
        None => sample_ms,
    }
}

/// The result of an isMaster probe.
#[derive(Clone, Debug, PartialEq)]
pub struct IsMasterResult {
    pub ok: bool,
    pub is_master: bool,

    /// Shard-specific. mongos instances will add this field to the
    /// isMaster reply, and it will contain the value "isdbgrid".
    pub msg: String,

    // Replica set specific
    pub is_replica_set: bool,
    pub is_secondary: bool,
    pub arbiter_only: bool,
    pub hidden: bool,
    pub me: Option<Host>,
    pub hosts: Vec<Host>,
    pub passives: Vec<Host>,
    pub arbiters: Vec<Host>,
    pub set_name: String,
    pub primary: Option<Host>,
}

impl IsMasterResult {
    /// Parses an isMaster response document from the server.
    pub fn new(doc: Document) -> Result<IsMasterResult> {
        let ok = match doc.get("ok") {
            Some(&Bson::I32(v)) => v != 0,
            Some(&Bson::I64(v)) => v != 0,
            Some(&Bson::FloatingPoint(v)) => v != 0.0,
            _ => return Err(ResponseError("Result does not contain `ok`.".to_owned())),
        };

        let mut result = IsMasterResult {
            ok,
            is_master: false,
            msg: String::new(),
            is_secondary: false,
            is_replica_set: false,
            arbiter_only: false,
            hidden: false,
            me: None,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            set_name: String::new(),
            primary: None,
        };

        if let Some(&Bson::Boolean(b)) = doc.get("ismaster") {
            result.is_master = b;
        }

        if let Some(&Bson::String(ref s)) = doc.get("msg") {
            result.msg = s.to_owned();
        }

        if let Some(&Bson::Boolean(b)) = doc.get("secondary") {
            result.is_secondary = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("isreplicaset") {
            result.is_replica_set = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("arbiterOnly") {
            result.arbiter_only = b;
        }

        if let Some(&Bson::Boolean(b)) = doc.get("hidden") {
            result.hidden = b;
        }

        if let Some(&Bson::String(ref s)) = doc.get("setName") {
            result.set_name = s.to_owned();
        }

        if let Some(&Bson::String(ref s)) = doc.get("me") {
            result.me = Some(connstring::parse_host(s)?);
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("hosts") {
            result.hosts = parse_host_array(arr);
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("passives") {
            result.passives = parse_host_array(arr);
        }

        if let Some(&Bson::Array(ref arr)) = doc.get("arbiters") {
            result.arbiters = parse_host_array(arr);
        }

        if let Some(&Bson::String(ref s)) = doc.get("primary") {
            result.primary = Some(connstring::parse_host(s)?);
        }

        Ok(result)
    }
}

fn parse_host_array(arr: &[Bson]) -> Vec<Host> {
    arr.iter()
        .filter_map(|bson| match *bson {
            Bson::String(ref s) => connstring::parse_host(s).ok(),
            _ => None,
        })
        .collect()
}

/// Monitors a single server with a periodic probe on its own thread.
pub struct Monitor {
    // Host being monitored.
    host: Host,
    connector: StreamConnector,
    executor: Arc<dyn CommandExecutor>,
    heartbeat_frequency: Duration,
    connect_timeout: Duration,
    // The server's operational pool, cleared when a probe fails so stale
    // sockets are discarded.
    server_pool: Arc<ConnectionPool>,
    // Server description to update.
    server_description: Arc<RwLock<ServerDescription>>,
    // Cluster to report new descriptions to.
    cluster: Weak<ClusterInner>,
    // The dedicated probe connection. The mutex doubles as the in-flight
    // probe lock: at most one scan per monitor at a time.
    probe_connection: Mutex<Option<BufStream<Stream>>>,
    // The last smoothed round-trip estimate, in milliseconds. Failed probes
    // leave it untouched.
    last_round_trip_time: Mutex<Option<f64>>,
    // Used for condvar functionality.
    dummy_lock: Mutex<()>,
    // To allow an immediate update to be requested, this condvar can be
    // notified to wake up the monitor.
    condvar: Condvar,
    // While true, the monitor probes at the heartbeat frequency.
    running: AtomicBool,
    // Join handle of the probe thread; stop() synchronizes on it.
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub(crate) fn new(
        host: Host,
        connector: StreamConnector,
        executor: Arc<dyn CommandExecutor>,
        options: &ClusterOptions,
        server_pool: Arc<ConnectionPool>,
        server_description: Arc<RwLock<ServerDescription>>,
        cluster: Weak<ClusterInner>,
    ) -> Monitor {
        Monitor {
            host,
            connector,
            executor,
            heartbeat_frequency: options.heartbeat_frequency,
            connect_timeout: options.connect_timeout,
            server_pool,
            server_description,
            cluster,
            probe_connection: Mutex::new(None),
            last_round_trip_time: Mutex::new(None),
            dummy_lock: Mutex::new(()),
            condvar: Condvar::new(),
            running: AtomicBool::new(false),
            thread_handle: Mutex::new(None),
        }
    }

    /// Probes the server once and publishes the resulting description.
    ///
    /// Failures never escape: a failed probe produces an Unknown description
    /// carrying the error, clears the server's operational pool, and is
    /// logged at debug level.
    pub fn scan(&self) -> ServerDescription {
        let mut conn = self.probe_connection.lock().unwrap();

        let start = time::precise_time_ns();
        let result = self.is_master(&mut *conn);

        let description = match result {
            Ok(doc) => {
                let sample_ms = (time::precise_time_ns() - start) as f64 / 1_000_000.0;
                let rtt = self.average_round_trip_time(sample_ms);
                match IsMasterResult::new(doc) {
                    Ok(ismaster) => ServerDescription::from_is_master(
                        self.host.clone(),
                        ismaster,
                        rtt,
                    ),
                    Err(err) => {
                        debug!("Failed to parse ismaster reply from {}: {}", self.host, err);
                        ServerDescription::from_error(self.host.clone(), err)
                    }
                }
            }
            Err(err) => {
                debug!("Probe of {} failed: {}", self.host, err);
                // Drop the probe connection and refresh the operational pool.
                *conn = None;
                self.server_pool.clear();
                ServerDescription::from_error(self.host.clone(), err)
            }
        };

        *self.server_description.write().unwrap() = description.clone();

        if let Some(cluster) = self.cluster.upgrade() {
            ClusterInner::apply_description(&cluster, description.clone());
        }

        description
    }

    // Issues the isMaster command over the dedicated probe connection,
    // opening one if needed.
    fn is_master(&self, conn: &mut Option<BufStream<Stream>>) -> Result<Document> {
        if conn.is_none() {
            let stream = self.connector.connect(&self.host, self.connect_timeout)?;
            *conn = Some(BufStream::new(stream));
        }

        let mut command = Document::new();
        command.insert("isMaster".to_owned(), Bson::I32(1));

        self.executor
            .execute_command(conn.as_mut().unwrap(), &command)
    }

    // Folds a new sample into the moving round-trip average.
    fn average_round_trip_time(&self, sample_ms: f64) -> f64 {
        let mut last = self.last_round_trip_time.lock().unwrap();
        let avg = smooth_round_trip_time(*last, sample_ms);
        *last = Some(avg);
        avg
    }

    /// The current round-trip estimate, if any sample has been taken.
    pub fn round_trip_time(&self) -> Option<f64> {
        *self.last_round_trip_time.lock().unwrap()
    }

    /// Wakes the monitor out of its heartbeat sleep for an immediate probe.
    pub fn request_update(&self) {
        self.condvar.notify_one();
    }

    /// Starts the periodic probe thread. Idempotent.
    pub fn run(monitor: Arc<Monitor>) {
        if monitor.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let worker = monitor.clone();
        let handle = thread::spawn(move || worker.execute_loop());
        *monitor.thread_handle.lock().unwrap() = Some(handle);
    }

    fn execute_loop(&self) {
        let mut guard = self.dummy_lock.lock().unwrap();

        while self.running.load(Ordering::SeqCst) {
            self.scan();

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let (new_guard, _) = self
                .condvar
                .wait_timeout(guard, self.heartbeat_frequency)
                .unwrap();
            guard = new_guard;
        }
    }

    /// Stops the probe thread, joining it before returning, and releases
    /// the dedicated probe connection.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.condvar.notify_one();

        let handle = self.thread_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Stopped from the probe thread itself: the last cluster
                // handle was released during a report. The loop exits on the
                // cleared flag; the connection goes away with the monitor.
                return;
            }
            // The probe deadline bounds how long a scan in flight can last.
            let _ = handle.join();
        }

        *self.probe_connection.lock().unwrap() = None;
    }
}
