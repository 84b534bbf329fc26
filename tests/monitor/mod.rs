use approx::assert_relative_eq;
use bson::{bson, doc, Document};

use mongodb_cluster::common::ClusterOptions;
use mongodb_cluster::connstring::Host;
use mongodb_cluster::topology::monitor::smooth_round_trip_time;
use mongodb_cluster::topology::TopologyType;
use mongodb_cluster::{Cluster, ReadPreference};

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::framework::{ScriptedExecutor, ScriptedReply};

fn loopback() -> (TcpListener, Host, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let seed = format!("127.0.0.1:{}", port);
    let host = mongodb_cluster::connstring::parse_host(&seed).unwrap();
    (listener, host, seed)
}

fn standalone_reply() -> Document {
    doc! { "ok": 1, "ismaster": true }
}

fn fast_options() -> ClusterOptions {
    let mut options = ClusterOptions::default();
    options.heartbeat_frequency = Duration::from_millis(50);
    options
}

// Polls until the condition holds, or panics after the timeout.
fn wait_until<F: Fn() -> bool>(what: &str, timeout: Duration, condition: F) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("timed out waiting for {}", what);
}

#[test]
fn monitors_probe_periodically() {
    let (_listener, _host, seed) = loopback();
    let executor = Arc::new(ScriptedExecutor::constant(standalone_reply()));

    let cluster = Cluster::connect(&[seed.as_str()], fast_options(), executor.clone()).unwrap();

    wait_until("the topology to classify", Duration::from_secs(5), || {
        cluster.topology().topology_type == TopologyType::Single
    });

    // The heartbeat loop keeps probing after the initial scan.
    wait_until("repeated probes", Duration::from_secs(5), || {
        executor.calls() >= 3
    });

    let start = Instant::now();
    drop(cluster);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "dropping the cluster should stop monitors promptly"
    );
}

#[test]
fn probe_failures_are_absorbed() {
    let (listener, host, seed) = loopback();
    // Nothing is listening on the port anymore.
    drop(listener);

    let executor = Arc::new(ScriptedExecutor::constant(standalone_reply()));
    let cluster = Cluster::connect(&[seed.as_str()], fast_options(), executor).unwrap();

    wait_until("the probe error to surface", Duration::from_secs(5), || {
        let topology = cluster.topology();
        match topology.servers.get(&host) {
            Some(description) => description.err.is_some(),
            None => false,
        }
    });

    // Failures classify the server Unknown and never kill the loop.
    assert_eq!(TopologyType::Unknown, cluster.topology().topology_type);

    let start = Instant::now();
    drop(cluster);
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn scan_probes_synchronously() {
    let (_listener, host, seed) = loopback();
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ScriptedReply::Reply(Duration::from_millis(300), standalone_reply()),
        ScriptedReply::Reply(Duration::from_millis(0), standalone_reply()),
    ]));

    let cluster = Cluster::unmonitored(&[seed.as_str()], ClusterOptions::default(), executor).unwrap();

    // Before any scan, nothing is known.
    assert_eq!(TopologyType::Unknown, cluster.topology().topology_type);

    cluster.scan();

    // scan() only returns once every server has reported.
    let topology = cluster.topology();
    assert_eq!(TopologyType::Single, topology.topology_type);

    let rtt1 = topology.servers[&host].round_trip_time.unwrap();
    assert!(rtt1 >= 300.0, "first sample seeds the estimate, got {}", rtt1);

    cluster.scan();
    let rtt2 = cluster.topology().servers[&host].round_trip_time.unwrap();

    // One fast sample moves the estimate by its 0.2 weight.
    assert!(rtt2 >= 0.8 * rtt1, "estimate fell too far: {} -> {}", rtt1, rtt2);
    assert!(
        rtt2 <= 0.8 * rtt1 + 0.2 * 2000.0,
        "estimate rose too far: {} -> {}",
        rtt1,
        rtt2
    );
    assert!(rtt2 < rtt1, "a fast sample should lower the estimate");
}

#[test]
fn failed_probes_leave_the_estimate_untouched() {
    let (_listener, host, seed) = loopback();
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ScriptedReply::Reply(Duration::from_millis(200), standalone_reply()),
        ScriptedReply::Fail,
        ScriptedReply::Reply(Duration::from_millis(0), standalone_reply()),
    ]));

    let cluster = Cluster::unmonitored(&[seed.as_str()], ClusterOptions::default(), executor).unwrap();

    cluster.scan();
    let rtt1 = cluster.topology().servers[&host].round_trip_time.unwrap();

    cluster.scan();
    let failed = cluster.topology().servers[&host].clone();
    assert!(failed.err.is_some());
    assert!(failed.round_trip_time.is_none());

    cluster.scan();
    let rtt3 = cluster.topology().servers[&host].round_trip_time.unwrap();

    // The failing probe fed nothing into the average: one recovery sample
    // lands within the 0.2-weighted window of the pre-failure estimate.
    assert!(rtt3 >= 0.8 * rtt1);
    assert!(rtt3 <= 0.8 * rtt1 + 0.2 * 2000.0);
}

#[test]
fn request_update_cuts_the_heartbeat_sleep_short() {
    let (_listener, _host, seed) = loopback();
    let executor = Arc::new(ScriptedExecutor::constant(standalone_reply()));

    let mut options = ClusterOptions::default();
    options.heartbeat_frequency = Duration::from_secs(600);

    let cluster = Cluster::connect(&[seed.as_str()], options, executor.clone()).unwrap();

    wait_until("the initial probe", Duration::from_secs(5), || {
        executor.calls() >= 1 && cluster.topology().topology_type == TopologyType::Single
    });

    let calls_before = executor.calls();
    let server = cluster.select_server(&ReadPreference::primary()).unwrap();

    wait_until("the requested probe", Duration::from_secs(5), || {
        server.request_update();
        executor.calls() > calls_before
    });

    // Despite the long heartbeat, stop() interrupts the sleeping monitor.
    let start = Instant::now();
    drop(server);
    drop(cluster);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "stop must interrupt a sleeping monitor"
    );
}

#[test]
fn with_connection_borrows_from_the_selected_server() {
    let (_listener, _host, seed) = loopback();
    let executor = Arc::new(ScriptedExecutor::constant(standalone_reply()));

    let cluster = Cluster::unmonitored(&[seed.as_str()], ClusterOptions::default(), executor).unwrap();
    cluster.scan();

    let value = cluster
        .with_connection(&ReadPreference::nearest(), |_conn| Ok(11))
        .unwrap();
    assert_eq!(11, value);
}

#[test]
fn smoothing_weights_new_samples_at_one_fifth() {
    assert_relative_eq!(10.0, smooth_round_trip_time(None, 10.0));
    assert_relative_eq!(12.0, smooth_round_trip_time(Some(10.0), 20.0));
    assert_relative_eq!(8.4, smooth_round_trip_time(Some(9.0), 6.0));
}
