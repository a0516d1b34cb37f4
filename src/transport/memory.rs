//! In-process transport backed by channels.
//!
//! Used to embed the shell behind a custom front end and to drive sessions
//! from tests without sockets.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{AcceptEvent, Acceptor, Connection, ReadEvent, Sink};

enum Input {
    Line(String),
    Hangup,
}

/// Sink that records everything written to it.
#[derive(Debug, Default)]
pub struct CaptureSink {
    output: Mutex<Vec<u8>>,
    changed: Condvar,
    closed: AtomicBool,
    wake: Mutex<Option<Sender<Input>>>,
}

impl CaptureSink {
    fn with_wake(wake: Sender<Input>) -> Self {
        Self {
            wake: Mutex::new(Some(wake)),
            ..Self::default()
        }
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&output).into_owned()
    }

    /// Take everything written so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&output).into_owned();
        output.clear();
        text
    }

    /// Block until the output contains `needle`, the sink closes, or `timeout` elapses.
    pub fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if String::from_utf8_lossy(&output).contains(needle) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline || self.is_closed() {
                return false;
            }
            output = self
                .changed
                .wait_timeout(output, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until the sink is closed or `timeout` elapses.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_closed() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            output = self
                .changed
                .wait_timeout(output, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Sink for CaptureSink {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"));
        }
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        output.extend_from_slice(bytes);
        self.changed.notify_all();
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(wake) = self.wake.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = wake.send(Input::Hangup);
        }
        // notify under the lock so a waiter between its check and its wait is not missed
        let _output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        self.changed.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    identity: String,
    key: Vec<u8>,
    peer: String,
    input: Receiver<Input>,
    sink: Arc<CaptureSink>,
}

impl Connection for MemoryConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn public_key(&self) -> &[u8] {
        &self.key
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }

    fn read_line(&mut self, idle: Option<Duration>) -> io::Result<ReadEvent> {
        if self.sink.is_closed() {
            return Ok(ReadEvent::Closed);
        }
        let input = match idle {
            Some(timeout) => self.input.recv_timeout(timeout),
            None => self.input.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        Ok(match input {
            Ok(Input::Line(line)) => ReadEvent::Line(line),
            Ok(Input::Hangup) | Err(RecvTimeoutError::Disconnected) => ReadEvent::Closed,
            Err(RecvTimeoutError::Timeout) => ReadEvent::TimedOut,
        })
    }

    fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }
}

/// Client side of an in-memory connection.
pub struct MemoryClient {
    input: Sender<Input>,
    sink: Arc<CaptureSink>,
}

impl MemoryClient {
    /// Type a line. Returns `false` once the server side is gone.
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        self.input.send(Input::Line(line.into())).is_ok()
    }

    /// Hang up, as if the client closed its end.
    pub fn hang_up(&self) {
        let _ = self.input.send(Input::Hangup);
    }

    /// Output received so far.
    pub fn output(&self) -> String {
        self.sink.contents()
    }

    /// Take the output received so far.
    pub fn take_output(&self) -> String {
        self.sink.take()
    }

    pub fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        self.sink.wait_for(needle, timeout)
    }

    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.sink.wait_closed(timeout)
    }

    /// Check whether the server closed the session.
    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.hang_up();
    }
}

static NEXT_PEER: AtomicU64 = AtomicU64::new(1);

/// Create a connected client/connection pair for `identity` presenting `key`.
pub fn pair(identity: &str, key: &[u8]) -> (MemoryClient, MemoryConnection) {
    let (tx, rx) = mpsc::channel();
    let sink = Arc::new(CaptureSink::with_wake(tx.clone()));
    let peer = format!("memory:{}", NEXT_PEER.fetch_add(1, Ordering::Relaxed));

    let client = MemoryClient {
        input: tx,
        sink: Arc::clone(&sink),
    };
    let conn = MemoryConnection {
        identity: identity.to_string(),
        key: key.to_vec(),
        peer,
        input: rx,
        sink,
    };
    (client, conn)
}

/// Dialing half of an in-memory listener.
#[derive(Clone)]
pub struct MemoryDialer {
    queue: Sender<MemoryConnection>,
}

impl MemoryDialer {
    /// Open a connection. Returns `None` if the acceptor is gone.
    pub fn connect(&self, identity: &str, key: &[u8]) -> Option<MemoryClient> {
        let (client, conn) = pair(identity, key);
        self.queue.send(conn).ok()?;
        Some(client)
    }
}

/// Accepting half of an in-memory listener. Finishes once every dialer is dropped.
pub struct MemoryAcceptor {
    queue: Receiver<MemoryConnection>,
}

impl Acceptor for MemoryAcceptor {
    fn accept(&mut self, wait: Option<Duration>) -> io::Result<AcceptEvent> {
        let conn = match wait {
            Some(timeout) => self.queue.recv_timeout(timeout),
            None => self.queue.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        Ok(match conn {
            Ok(conn) => AcceptEvent::Connection(Box::new(conn)),
            Err(RecvTimeoutError::Disconnected) => AcceptEvent::Done,
            Err(RecvTimeoutError::Timeout) => AcceptEvent::TimedOut,
        })
    }
}

/// Create an in-memory listener.
pub fn listener() -> (MemoryDialer, MemoryAcceptor) {
    let (tx, rx) = mpsc::channel();
    (MemoryDialer { queue: tx }, MemoryAcceptor { queue: rx })
}
