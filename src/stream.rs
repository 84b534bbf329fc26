//! Transport streams and the connector that establishes them.
use crate::connstring::{AddressFamily, Host};
use crate::error::Error::ConnectionError;
use crate::error::Result;

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Encapsulates the functionality for how to connect to the server.
#[derive(Clone, Debug)]
pub enum StreamConnector {
    /// Connect to the server through a TCP stream, or a Unix domain socket
    /// for filesystem-path addresses.
    Tcp,
}

impl Default for StreamConnector {
    fn default() -> Self {
        StreamConnector::Tcp
    }
}

impl StreamConnector {
    /// Establishes a stream to the host, bounded by the given deadline.
    ///
    /// The deadline also becomes the read and write timeout of the returned
    /// stream, so operations on it cannot block indefinitely.
    pub fn connect(&self, host: &Host, timeout: Duration) -> Result<Stream> {
        match *self {
            StreamConnector::Tcp => {
                let stream = match host.family {
                    AddressFamily::UnixSocket => connect_ipc(host)?,
                    _ => connect_tcp(host, timeout)?,
                };
                stream.set_timeouts(Some(timeout))?;
                Ok(stream)
            }
        }
    }
}

fn connect_tcp(host: &Host, timeout: Duration) -> Result<Stream> {
    let addrs = (&host.host_name[..], host.port)
        .to_socket_addrs()
        .map_err(|e| ConnectionError(format!("Failed to resolve '{}': {}", host, e)))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(Stream::Tcp(stream)),
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(e) => Err(ConnectionError(format!(
            "Failed to connect to '{}': {}",
            host, e
        ))),
        None => Err(ConnectionError(format!(
            "'{}' resolved to no addresses.",
            host
        ))),
    }
}

#[cfg(unix)]
fn connect_ipc(host: &Host) -> Result<Stream> {
    match UnixStream::connect(&host.host_name) {
        Ok(stream) => Ok(Stream::Unix(stream)),
        Err(e) => Err(ConnectionError(format!(
            "Failed to connect to '{}': {}",
            host, e
        ))),
    }
}

#[cfg(not(unix))]
fn connect_ipc(host: &Host) -> Result<Stream> {
    Err(ConnectionError(format!(
        "Unix domain sockets are not supported on this platform ('{}').",
        host
    )))
}

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match *self {
            Stream::Tcp(ref s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Stream::Unix(ref s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Stream::Tcp(ref mut s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(ref mut s) => s.flush(),
        }
    }
}
