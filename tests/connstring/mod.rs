use mongodb_cluster::connstring::{self, AddressFamily, DEFAULT_PORT};

use std::collections::HashSet;

#[test]
fn parse_host_with_port() {
    let host = connstring::parse_host("db.example.com:27018").unwrap();
    assert_eq!(AddressFamily::Ipv4, host.family);
    assert_eq!("db.example.com", host.host_name);
    assert_eq!(27018, host.port);
    assert_eq!("db.example.com:27018", host.seed());
}

#[test]
fn parse_host_without_port() {
    let host = connstring::parse_host("db.example.com").unwrap();
    assert_eq!("db.example.com", host.host_name);
    assert_eq!(DEFAULT_PORT, host.port);
}

#[test]
fn parse_lowercases_host_names() {
    let host = connstring::parse_host("LocalHost:27017").unwrap();
    assert_eq!("localhost", host.host_name);
}

#[test]
fn parse_bracketed_ipv6_with_port() {
    let host = connstring::parse_host("[::1]:28011").unwrap();
    assert_eq!(AddressFamily::Ipv6, host.family);
    assert_eq!("::1", host.host_name);
    assert_eq!(28011, host.port);
}

#[test]
fn parse_bracketed_ipv6_without_port() {
    let host = connstring::parse_host("[2001:db8::ff00:42]").unwrap();
    assert_eq!(AddressFamily::Ipv6, host.family);
    assert_eq!("2001:db8::ff00:42", host.host_name);
    assert_eq!(DEFAULT_PORT, host.port);
}

#[test]
fn parse_bare_ipv6_literal() {
    let host = connstring::parse_host("::1").unwrap();
    assert_eq!(AddressFamily::Ipv6, host.family);
    assert_eq!("::1", host.host_name);
    assert_eq!(DEFAULT_PORT, host.port);
}

#[test]
fn parse_unix_socket_path() {
    let host = connstring::parse_host("/tmp/mongodb-27017.sock").unwrap();
    assert_eq!(AddressFamily::UnixSocket, host.family);
    assert!(host.has_ipc());
    assert_eq!("/tmp/mongodb-27017.sock", host.host_name);
    assert_eq!("/tmp/mongodb-27017.sock", format!("{}", host));
}

#[test]
fn parse_rejects_malformed_entities() {
    let invalid = vec![
        "",
        "host:notaport",
        "host:70000",
        "host:27017:27018",
        ":27017",
        "[::1",
        "[::1]junk",
        "[::1]:notaport",
    ];

    for entity in invalid {
        assert!(
            connstring::parse_host(entity).is_err(),
            "expected '{}' to be rejected",
            entity
        );
    }
}

#[test]
fn equality_is_by_host_and_port() {
    let explicit = connstring::parse_host("h:27017").unwrap();
    let defaulted = connstring::parse_host("h").unwrap();
    let other_port = connstring::parse_host("h:27018").unwrap();

    assert_eq!(explicit, defaulted);
    assert_ne!(explicit, other_port);

    let mut set = HashSet::new();
    set.insert(explicit);
    assert!(set.contains(&defaulted));
    assert!(!set.contains(&other_port));
}

#[test]
fn display_round_trips_host_and_port() {
    for seed in &["db.example.com:27018", "localhost", "[::1]:28011", "::1"] {
        let host = connstring::parse_host(seed).unwrap();
        let reparsed = connstring::parse_host(&format!("{}", host)).unwrap();
        assert_eq!(host.host_name, reparsed.host_name);
        assert_eq!(host.port, reparsed.port);
    }
}

#[test]
fn split_hosts_parses_each_entity() {
    let hosts = connstring::split_hosts("a.example.com,b.example.com:27018").unwrap();
    assert_eq!(2, hosts.len());
    assert_eq!(DEFAULT_PORT, hosts[0].port);
    assert_eq!(27018, hosts[1].port);
}

#[test]
fn split_hosts_rejects_empty_entities() {
    assert!(connstring::split_hosts("a.example.com,,b.example.com").is_err());
    assert!(connstring::split_hosts("a.example.com,").is_err());
}
