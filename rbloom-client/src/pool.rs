//! # Connection Pool
//!
//! Purpose: Reuse TCP connections to one endpoint so concurrent callers each
//! get an exclusive connection without paying a handshake per command.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections;
//!    connects and command round trips run outside it.
//! 3. **Bounded Waiting**: A caller at capacity waits on a condition variable
//!    until a connection is returned or `wait_timeout` elapses.
//! 4. **RAII Return**: `PooledConnection` returns itself on drop, on every
//!    exit path; a connection that saw an error is destroyed instead.
//! 5. **Idle Eviction**: A background sweep closes connections idle longer
//!    than `idle_timeout`, never touching a borrowed one.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use rbloom_common::{ClientError, ClientResult};

use crate::command::Command;
use crate::resp::{expect_ok, read_response, RespValue};

/// Pool configuration for the sync client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Password sent with `AUTH` after connecting.
    pub password: Option<String>,
    /// Name sent with `CLIENT SETNAME` after connecting.
    pub client_name: Option<String>,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// How long `acquire` waits at capacity.
    pub wait_timeout: Duration,
    /// Idle age after which the sweep closes a connection.
    pub idle_timeout: Option<Duration>,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections waiting in the idle set.
    pub idle: usize,
    /// Connections alive (idle + borrowed).
    pub total: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
    closed: bool,
    /// Tickets of blocked callers, oldest first.
    waiters: VecDeque<u64>,
    next_ticket: u64,
}

impl PoolState {
    /// A caller may take a connection only when nobody queued ahead of it.
    fn is_next(&self, ticket: Option<u64>) -> bool {
        match ticket {
            Some(ticket) => self.waiters.front() == Some(&ticket),
            None => self.waiters.is_empty(),
        }
    }

    fn enqueue(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiters.push_back(ticket);
        ticket
    }

    fn leave(&mut self, ticket: Option<u64>) {
        if let Some(ticket) = ticket {
            self.waiters.retain(|queued| *queued != ticket);
        }
    }
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_all();
    }

    /// Waiters wake together; only the head of the queue proceeds.
    fn wake_waiters(&self, state: &PoolState) {
        if !state.waiters.is_empty() {
            self.available.notify_all();
        }
    }

    fn return_connection(&self, mut conn: Connection) {
        conn.last_used = Instant::now();
        let mut state = self.state.lock();
        if !state.closed && state.idle.len() < self.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
        drop(state);
        self.available.notify_all();
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    ///
    /// No connection is opened until the first `acquire`.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        if config.max_total == 0 {
            return Err(ClientError::Config("pool capacity must be at least 1".to_string()));
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
            closed: false,
            waiters: VecDeque::new(),
            next_ticket: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        })
    }

    /// Endpoint address this pool connects to.
    pub fn addr(&self) -> &str {
        &self.inner.config.addr
    }

    /// Acquires a connection from the pool.
    ///
    /// Reuses the most recently returned idle connection, otherwise opens a
    /// new one while below capacity, otherwise waits up to `wait_timeout`.
    /// Blocked callers are served in arrival order; a newcomer never takes a
    /// connection while someone is queued.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let deadline = Instant::now() + self.inner.config.wait_timeout;
        let mut ticket = None;
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                state.leave(ticket);
                return Err(ClientError::PoolClosed);
            }
            if state.is_next(ticket) {
                if let Some(conn) = state.idle.pop_back() {
                    state.leave(ticket);
                    self.inner.wake_waiters(&state);
                    return Ok(PooledConnection::new(self.inner.clone(), conn));
                }
                if state.total < self.inner.config.max_total {
                    state.total += 1;
                    state.leave(ticket);
                    self.inner.wake_waiters(&state);
                    break;
                }
            }
            if Instant::now() >= deadline {
                state.leave(ticket);
                self.inner.wake_waiters(&state);
                return Err(ClientError::PoolExhausted);
            }
            if ticket.is_none() {
                ticket = Some(state.enqueue());
            }
            self.inner.available.wait_until(&mut state, deadline);
        }
        drop(state);

        match Connection::connect(&self.inner.config) {
            Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
            Err(err) => {
                warn!(addr = %self.inner.config.addr, error = %err, "connect failed");
                self.inner.release_slot();
                Err(err)
            }
        }
    }

    /// Returns current idle and total counts.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            total: state.total,
        }
    }

    /// Closes idle connections unused since `idle_timeout` before `now`.
    ///
    /// Returns the number of connections closed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let Some(idle_timeout) = self.inner.config.idle_timeout else {
            return 0;
        };

        let mut evicted = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            while let Some(conn) = state.idle.pop_front() {
                if now.saturating_duration_since(conn.last_used) >= idle_timeout {
                    evicted.push(conn);
                } else {
                    kept.push_back(conn);
                }
            }
            state.idle = kept;
            state.total = state.total.saturating_sub(evicted.len());
        }

        let count = evicted.len();
        if count > 0 {
            debug!(addr = %self.inner.config.addr, evicted = count, "evicted idle connections");
            self.inner.available.notify_all();
        }
        // Sockets close here, outside the lock.
        drop(evicted);
        count
    }

    /// Starts a background thread that runs `evict_idle` every `interval`.
    ///
    /// The thread holds only a weak reference, so it ends on its own once
    /// every pool handle is dropped.
    pub fn start_evictor(&self, interval: Duration) -> EvictionHandle {
        let interval = if interval.is_zero() {
            Duration::from_millis(1)
        } else {
            interval
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);

        let join = std::thread::spawn(move || {
            while !stop_thread.load(Ordering::Acquire) {
                std::thread::park_timeout(interval);
                if stop_thread.load(Ordering::Acquire) {
                    break;
                }
                let Some(inner) = pool.upgrade() else {
                    break;
                };
                ConnectionPool { inner }.evict_idle(Instant::now());
            }
        });

        EvictionHandle {
            stop,
            join: Some(join),
        }
    }

    /// Tears the pool down.
    ///
    /// Idle connections are closed, waiters fail with `PoolClosed`, and
    /// borrowed connections are destroyed when their guards drop.
    pub fn close(&self) {
        let idle: Vec<Connection> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<Connection> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(idle.len());
            idle
        };
        debug!(addr = %self.inner.config.addr, closed = idle.len(), "pool closed");
        self.inner.available.notify_all();
        drop(idle);
    }
}

/// Handle controlling the idle eviction thread.
pub struct EvictionHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl EvictionHandle {
    /// Stops the sweep and waits for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            join.thread().unpark();
            let _ = join.join();
        }
    }
}

impl Drop for EvictionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Writes one command and reads exactly one reply.
    ///
    /// Error frames are returned as `RespValue::Error`; only IO and framing
    /// failures are `Err`, and they mark this connection broken.
    pub fn exec(&mut self, command: &Command) -> ClientResult<RespValue> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::PoolClosed);
        };
        let response = conn.exec(command);
        if response.is_err() {
            // If IO/protocol fails, do not return this connection to the pool.
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            warn!(addr = %self.pool.config.addr, "discarding broken connection");
            drop(conn);
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
///
/// The buffers are stored on the connection to avoid per-call allocations.
pub struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: BytesMut,
    last_used: Instant,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
            last_used: Instant::now(),
        };

        if let Some(password) = &config.password {
            expect_ok(conn.exec(&Command::new("AUTH").arg(password.as_str()))?)?;
        }
        if let Some(name) = &config.client_name {
            expect_ok(conn.exec(&Command::new("CLIENT").arg("SETNAME").arg(name.as_str()))?)?;
        }
        debug!(addr = %config.addr, "connection established");
        Ok(conn)
    }

    fn exec(&mut self, command: &Command) -> ClientResult<RespValue> {
        self.write_buf.clear();
        command.encode(&mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addrs = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.addr.clone()))?;

    let mut last_err = None;
    for addr in addrs {
        let result = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match result {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(err) => Err(err.into()),
        None => Err(ClientError::InvalidAddress(config.addr.clone())),
    }
}
