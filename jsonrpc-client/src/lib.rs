//! Persistent JSON-RPC connection
//!
//! A [`Connection`] keeps one TCP stream open to a JSON-RPC peer. Requests
//! are correlated to their replies by numeric id; objects the peer pushes
//! without an id are handed to a single notification handler.
//!
//! One background reader thread owns the table of pending requests. Callers
//! never touch that table directly: they hand the reader a reply slot over a
//! channel before writing the request, so a reply can never arrive ahead of
//! its registration.
//!
//! The peer is not required to delimit frames; concatenated JSON objects are
//! split by the streaming deserializer.

mod error;
mod frame;

pub use error::{Result, TransportError};
pub use frame::{Frame, RemoteError};

use std::collections::HashMap;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use frame::Request;

/// Receives `(method, params)` for every pushed notification
///
/// Runs on the reader thread, so it must hand work off rather than block on
/// the same connection.
pub type NotificationHandler = Arc<dyn Fn(String, Value) + Send + Sync>;

/// Timeouts for a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    /// Deadline for writing a request and for its correlated reply; must
    /// be non-zero
    pub request_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

type ReplySlot = SyncSender<std::result::Result<Value, RemoteError>>;

enum Control {
    Register { id: u64, slot: ReplySlot },
    Cancel { id: u64 },
}

/// A persistent JSON-RPC channel over TCP
pub struct Connection {
    addr: SocketAddr,
    config: ConnectionConfig,
    writer: Mutex<TcpStream>,
    /// Clone outside the writer lock so a stuck write cannot block shutdown
    shutdown_handle: TcpStream,
    control: Mutex<Option<Sender<Control>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl Connection {
    /// Connect to `addr` and start the reader thread
    pub fn open(
        addr: &str,
        config: ConnectionConfig,
        on_notification: NotificationHandler,
    ) -> Result<Self> {
        let stream = connect(addr, config.connect_timeout)?;
        let peer = stream.peer_addr()?;
        let _ = stream.set_nodelay(true);
        stream.set_write_timeout(Some(config.request_timeout))?;
        let read_half = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;

        let (control_tx, control_rx) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let closed = Arc::clone(&closed);
            thread::Builder::new()
                .name(format!("jsonrpc-reader-{peer}"))
                .spawn(move || {
                    read_loop(read_half, control_rx, on_notification);
                    closed.store(true, Ordering::SeqCst);
                    tracing::debug!("Reader for {} exited", peer);
                })?
        };

        tracing::debug!("Connected to {}", peer);

        Ok(Self {
            addr: peer,
            config,
            writer: Mutex::new(stream),
            shutdown_handle,
            control: Mutex::new(Some(control_tx)),
            reader: Mutex::new(Some(reader)),
            closed,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether requests can still be sent
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Send `method` with `params`
    ///
    /// With `wait` set, blocks until the correlated reply arrives, the
    /// request timeout expires or the connection closes. Without it, returns
    /// `Ok(None)` once the request has been written. Writing is bounded by
    /// the request timeout too; a failed write closes the connection.
    pub fn send(&self, method: &str, params: Value, wait: bool) -> Result<Option<Value>> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_vec(&Request::new(id, method, &params))?;

        let reply = if wait {
            let (slot, reply) = mpsc::sync_channel(1);
            self.control(Control::Register { id, slot })?;
            Some(reply)
        } else {
            None
        };

        tracing::debug!("--> {} #{} {}", method, id, params);
        if let Err(e) = self.write(&frame) {
            if reply.is_some() {
                let _ = self.control(Control::Cancel { id });
            }
            return Err(self.write_failed(method, e));
        }

        let Some(reply) = reply else {
            return Ok(None);
        };

        match reply.recv_timeout(self.config.request_timeout) {
            Ok(Ok(result)) => {
                tracing::debug!("<-- {} #{} {}", method, id, result);
                Ok(Some(result))
            }
            Ok(Err(RemoteError { code, message })) => Err(TransportError::Remote { code, message }),
            Err(RecvTimeoutError::Timeout) => {
                let _ = self.control(Control::Cancel { id });
                Err(TransportError::Timeout {
                    method: method.to_string(),
                    timeout: self.config.request_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Close the socket and wait for the reader to exit
    ///
    /// Every pending request resolves to [`TransportError::Closed`].
    /// Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
        self.control.lock().take();

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            // A notification handler may shut the connection down
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("Reader for {} panicked", self.addr);
            }
            tracing::debug!("Connection to {} shut down", self.addr);
        }
    }

    fn control(&self, message: Control) -> Result<()> {
        self.control
            .lock()
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn write(&self, frame: &[u8]) -> io::Result<()> {
        let mut stream = self.writer.lock();
        stream.write_all(frame)?;
        stream.flush()
    }

    /// A partially written frame leaves the stream unusable, so any write
    /// failure closes the connection
    fn write_failed(&self, method: &str, error: io::Error) -> TransportError {
        let already_closed = !self.is_open();
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);

        if already_closed {
            return TransportError::Closed;
        }
        tracing::warn!("Writing {} to {} failed: {}", method, self.addr, error);
        match error.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout {
                method: method.to_string(),
                timeout: self.config.request_timeout,
            },
            _ => TransportError::Io(error),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .finish()
    }
}

fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let candidates = addr.to_socket_addrs().map_err(|e| TransportError::Connect {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;

    let mut last_error = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        reason: last_error.map_or_else(|| "no addresses resolved".to_string(), |e| e.to_string()),
    })
}

/// Demultiplex frames until the stream ends
///
/// Dropping `pending` on return wakes every waiting caller.
fn read_loop(stream: TcpStream, control: Receiver<Control>, on_notification: NotificationHandler) {
    let mut pending: HashMap<u64, ReplySlot> = HashMap::new();
    let frames = serde_json::Deserializer::from_reader(BufReader::new(stream)).into_iter::<Value>();

    for frame in frames {
        let value = match frame {
            Ok(value) => value,
            Err(e) if e.is_io() || e.is_eof() => {
                tracing::debug!("Stream ended: {}", e);
                break;
            }
            Err(e) => {
                tracing::error!("Malformed frame, closing connection: {}", e);
                break;
            }
        };

        // Registrations were enqueued before their requests were written
        for message in control.try_iter() {
            match message {
                Control::Register { id, slot } => {
                    pending.insert(id, slot);
                }
                Control::Cancel { id } => {
                    pending.remove(&id);
                }
            }
        }

        match Frame::classify(value) {
            Frame::Reply { id, outcome } => match pending.remove(&id) {
                Some(slot) => {
                    let _ = slot.try_send(outcome);
                }
                None => tracing::debug!("Dropping reply #{} with no waiter", id),
            },
            Frame::Notification { method, params } => {
                tracing::debug!("<-- notification {} {}", method, params);
                let handler = &on_notification;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(method, params)));
                if outcome.is_err() {
                    tracing::error!("Notification handler panicked");
                }
            }
            Frame::Unrecognized(value) => {
                tracing::warn!("Ignoring unrecognized frame {}", value);
            }
        }
    }
}
