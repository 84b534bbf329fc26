//! Server address parsing.
use crate::error::Error::AddressParseError;
use crate::error::Result;

use std::fmt;
use std::hash::{Hash, Hasher};

pub const DEFAULT_PORT: u16 = 27017;

/// The address family a seed string resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    UnixSocket,
}

/// Encapsulates the hostname and port of a server endpoint, or the
/// filesystem path of a local socket.
///
/// Two hosts are equal iff their hostname and port match, regardless of the
/// literal form they were parsed from.
#[derive(Debug, Clone)]
pub struct Host {
    pub family: AddressFamily,
    pub host_name: String,
    pub port: u16,
    seed: String,
}

impl Host {
    fn new(family: AddressFamily, host_name: String, port: u16, seed: &str) -> Host {
        Host {
            family,
            host_name,
            port,
            seed: seed.to_owned(),
        }
    }

    fn with_ipc(path: String) -> Host {
        Host {
            family: AddressFamily::UnixSocket,
            seed: path.clone(),
            host_name: path,
            port: DEFAULT_PORT,
        }
    }

    /// The original seed string this host was parsed from.
    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn has_ipc(&self) -> bool {
        self.family == AddressFamily::UnixSocket
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Host) -> bool {
        self.host_name == other.host_name && self.port == other.port
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host_name.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.family {
            AddressFamily::UnixSocket => write!(fmt, "{}", self.host_name),
            AddressFamily::Ipv6 => write!(fmt, "[{}]:{}", self.host_name, self.port),
            AddressFamily::Ipv4 => write!(fmt, "{}:{}", self.host_name, self.port),
        }
    }
}

// Parses a literal IPv6 host entity of the form [host], [host]:port, or a
// bare ::-containing literal with the default port.
fn parse_ipv6_literal_host(entity: &str) -> Result<Host> {
    if !entity.starts_with('[') {
        return Ok(Host::new(
            AddressFamily::Ipv6,
            entity.to_ascii_lowercase(),
            DEFAULT_PORT,
            entity,
        ));
    }

    match entity.find("]:") {
        Some(idx) => {
            let port = &entity[idx + 2..];
            match port.parse::<u16>() {
                Ok(val) => Ok(Host::new(
                    AddressFamily::Ipv6,
                    entity[1..idx].to_ascii_lowercase(),
                    val,
                    entity,
                )),
                Err(_) => Err(AddressParseError(format!(
                    "Port must be an unsigned 16-bit integer in '{}'.",
                    entity
                ))),
            }
        }
        None => match entity.find(']') {
            Some(idx) if idx == entity.len() - 1 => Ok(Host::new(
                AddressFamily::Ipv6,
                entity[1..idx].to_ascii_lowercase(),
                DEFAULT_PORT,
                entity,
            )),
            Some(_) => Err(AddressParseError(format!(
                "Unexpected characters after ']' in '{}'.",
                entity
            ))),
            None => Err(AddressParseError(
                "An IPv6 address literal must be enclosed in '[' and ']' \
                 according to RFC 2732."
                    .to_owned(),
            )),
        },
    }
}

/// Parses a host entity of the form host, host:port, [ipv6]:port, or an
/// absolute filesystem path for a local socket. Host names are lowercased.
pub fn parse_host(entity: &str) -> Result<Host> {
    if entity.is_empty() {
        return Err(AddressParseError("Empty host entity.".to_owned()));
    }

    if entity.contains("::") || entity.starts_with('[') {
        // IPv6 host
        parse_ipv6_literal_host(entity)
    } else if entity.starts_with('/') {
        // IPC socket
        Ok(Host::with_ipc(entity.to_ascii_lowercase()))
    } else if entity.contains(':') {
        // Common host:port format
        let (host, port) = partition(entity, ":");
        if host.is_empty() {
            return Err(AddressParseError(format!(
                "Empty hostname in '{}'.",
                entity
            )));
        }
        if port.contains(':') {
            return Err(AddressParseError(
                "An IPv6 address literal must be enclosed in '[' and ']' \
                 according to RFC 2732."
                    .to_owned(),
            ));
        }
        match port.parse::<u16>() {
            Ok(val) => Ok(Host::new(
                AddressFamily::Ipv4,
                host.to_ascii_lowercase(),
                val,
                entity,
            )),
            Err(_) => Err(AddressParseError(format!(
                "Port must be an unsigned 16-bit integer in '{}'.",
                entity
            ))),
        }
    } else {
        // Host with no port specified
        Ok(Host::new(
            AddressFamily::Ipv4,
            entity.to_ascii_lowercase(),
            DEFAULT_PORT,
            entity,
        ))
    }
}

/// Splits and parses comma-separated host seeds.
pub fn split_hosts(host_str: &str) -> Result<Vec<Host>> {
    let mut hosts = Vec::new();
    for entity in host_str.split(',') {
        if entity.is_empty() {
            return Err(AddressParseError(
                "Empty host, or extra comma in host list.".to_owned(),
            ));
        }
        hosts.push(parse_host(entity)?);
    }
    Ok(hosts)
}

// Partitions a string around the left-most occurrence of the separator, if it exists.
fn partition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.find(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => (string, ""),
    }
}
