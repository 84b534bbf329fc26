//! Connection pooling for a single server.
use crate::common::ClusterOptions;
use crate::connstring::Host;
use crate::error::Error::{ArgumentError, PoolTimeoutError};
use crate::error::Result;
use crate::stream::{Stream, StreamConnector};

use bufstream::BufStream;
use chrono::{DateTime, Utc};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_POOL_SIZE: usize = 5;
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_millis(500);

/// A pooled transport connection and its bookkeeping.
pub struct Connection {
    stream: BufStream<Stream>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Connection {
    fn new(stream: BufStream<Stream>) -> Connection {
        let now = Utc::now();
        Connection {
            stream,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn stream(&mut self) -> &mut BufStream<Stream> {
        &mut self.stream
    }
}

/// Handles threaded connections to a single server.
#[derive(Clone)]
pub struct ConnectionPool {
    /// The connection host.
    pub host: Host,
    // The socket pool.
    inner: Arc<Mutex<Pool>>,
    // A condition variable used for threads waiting for the pool
    // to be repopulated with available connections.
    wait_lock: Arc<Condvar>,
    stream_connector: StreamConnector,
    checkout_timeout: Duration,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("host", &self.host)
            .finish()
    }
}

struct Pool {
    // The maximum number of concurrent connections allowed.
    size: usize,
    // The current number of open connections, idle or checked out.
    len: usize,
    // The idle connection set.
    sockets: Vec<Connection>,
    // The pool iteration. When a server monitor fails its probe, the pool is
    // cleared and the iteration is incremented; streams checked out under an
    // older iteration are discarded instead of returned.
    iteration: usize,
}

/// Holds a checked-out connection, with logic to return it to the pool
/// when dropped.
pub struct PooledStream {
    // This option will always be Some(connection) until the stream is
    // returned to the pool using take().
    conn: Option<Connection>,
    // A reference to the pool that the stream was taken from.
    pool: Arc<Mutex<Pool>>,
    // A reference to the waiting condvar associated with the pool.
    wait_lock: Arc<Condvar>,
    // The pool iteration at the moment of checkout.
    iteration: usize,
}

impl PooledStream {
    /// Returns a reference to the socket.
    pub fn get_socket(&mut self) -> &mut BufStream<Stream> {
        self.conn.as_mut().unwrap().stream()
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap()
    }
}

impl Drop for PooledStream {
    fn drop(&mut self) {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        // Attempt to lock and return the connection to the pool,
        // or give up if the pool lock has been poisoned.
        if let Ok(mut locked) = self.pool.lock() {
            if self.iteration == locked.iteration {
                conn.last_used_at = Utc::now();
                locked.sockets.push(conn);
                // Notify waiting threads that the pool has been repopulated.
                self.wait_lock.notify_one();
            }
            // Streams from an older iteration are discarded; clear() already
            // reset the open-connection count for them.
        }
    }
}

impl ConnectionPool {
    /// Returns a connection pool with a default size and checkout timeout.
    pub fn new(host: Host, connector: StreamConnector) -> ConnectionPool {
        ConnectionPool::with_options(
            host,
            connector,
            DEFAULT_POOL_SIZE,
            DEFAULT_CHECKOUT_TIMEOUT,
        )
    }

    /// Returns a connection pool with a specified capped size and checkout
    /// timeout.
    pub fn with_options(
        host: Host,
        connector: StreamConnector,
        size: usize,
        checkout_timeout: Duration,
    ) -> ConnectionPool {
        ConnectionPool {
            host,
            wait_lock: Arc::new(Condvar::new()),
            inner: Arc::new(Mutex::new(Pool {
                len: 0,
                size,
                sockets: Vec::with_capacity(size),
                iteration: 0,
            })),
            stream_connector: connector,
            checkout_timeout,
        }
    }

    /// Sets the maximum number of open connections.
    pub fn set_size(&self, size: usize) -> Result<()> {
        if size < 1 {
            Err(ArgumentError(String::from(
                "The connection pool size must be greater than zero.",
            )))
        } else {
            let mut locked = self.inner.lock()?;
            locked.size = size;
            Ok(())
        }
    }

    /// Discards all idle connections and starts a new pool iteration, so
    /// that connections checked out before the call are dropped on return.
    pub fn clear(&self) {
        if let Ok(mut locked) = self.inner.lock() {
            locked.iteration += 1;
            locked.sockets.clear();
            locked.len = 0;
        }
    }

    /// Checks a connection out of the pool with the configured timeout.
    pub fn checkout(&self) -> Result<PooledStream> {
        self.checkout_with_timeout(self.checkout_timeout)
    }

    /// Checks a connection out of the pool.
    ///
    /// If an idle connection is available it is returned directly. Otherwise,
    /// a new connection is established when the pool is below capacity, or
    /// the call blocks until a connection is checked back in. When no
    /// connection becomes available within `timeout`, the checkout fails
    /// with `PoolTimeoutError`.
    pub fn checkout_with_timeout(&self, timeout: Duration) -> Result<PooledStream> {
        let deadline = Instant::now() + timeout;
        let mut locked = self.inner.lock()?;
        if locked.size == 0 {
            return Err(ArgumentError(String::from(
                "The connection pool does not allow connections; increase the size of the pool.",
            )));
        }

        loop {
            // Acquire an available existing connection
            if let Some(conn) = locked.sockets.pop() {
                return Ok(PooledStream {
                    conn: Some(conn),
                    pool: self.inner.clone(),
                    wait_lock: self.wait_lock.clone(),
                    iteration: locked.iteration,
                });
            }

            // Attempt to make a new connection
            if locked.len < locked.size {
                let socket = self.connect()?;
                locked.len += 1;
                return Ok(PooledStream {
                    conn: Some(Connection::new(socket)),
                    pool: self.inner.clone(),
                    wait_lock: self.wait_lock.clone(),
                    iteration: locked.iteration,
                });
            }

            // Release the lock and wait for the pool to be repopulated
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolTimeoutError(format!(
                    "No connection to '{}' became available within {:?}.",
                    self.host, timeout
                )));
            }
            let (guard, _) = self.wait_lock.wait_timeout(locked, deadline - now)?;
            locked = guard;
        }
    }

    /// Returns a connection to the idle set, waking one waiter if present.
    ///
    /// Equivalent to dropping the stream; provided for callers that want the
    /// checkin to be explicit.
    pub fn checkin(&self, stream: PooledStream) {
        drop(stream);
    }

    /// Scoped checkout: runs `f` with a connection and checks the connection
    /// back in on every exit path, including failure inside `f`.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut stream = self.checkout()?;
        f(stream.connection())
    }

    // Connects to the pooled server.
    fn connect(&self) -> Result<BufStream<Stream>> {
        let stream = self
            .stream_connector
            .connect(&self.host, self.checkout_timeout)?;
        Ok(BufStream::new(stream))
    }
}

/// Lazily builds and caches one connection pool per server address.
///
/// Created with the cluster and torn down with it. Pool creation is guarded
/// by a single coarse lock; checkout and checkin never take that lock.
pub struct PoolRegistry {
    connector: StreamConnector,
    pool_size: usize,
    checkout_timeout: Duration,
    pools: Mutex<HashMap<Host, Arc<ConnectionPool>>>,
}

impl PoolRegistry {
    pub fn new(connector: StreamConnector, options: &ClusterOptions) -> PoolRegistry {
        PoolRegistry {
            connector,
            pool_size: options.pool_size,
            checkout_timeout: options.connect_timeout,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pool for the host, creating it on first use.
    pub fn get(&self, host: &Host) -> Arc<ConnectionPool> {
        let mut pools = self.pools.lock().unwrap();
        match pools.get(host) {
            Some(pool) => pool.clone(),
            None => {
                let pool = Arc::new(ConnectionPool::with_options(
                    host.clone(),
                    self.connector.clone(),
                    self.pool_size,
                    self.checkout_timeout,
                ));
                pools.insert(host.clone(), pool.clone());
                pool
            }
        }
    }

    /// Discards the pool for a host that left the topology.
    pub fn remove(&self, host: &Host) {
        if let Ok(mut pools) = self.pools.lock() {
            pools.remove(host);
        }
    }
}
