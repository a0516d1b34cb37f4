//! Connection abstraction the session loop runs over.
//!
//! A transport hands the server a [`Connection`] per accepted client: the
//! identity and public key the client presented during its handshake, a
//! blocking line reader, and a [`Sink`] for output. The SSH handshake itself
//! (host keys, channel negotiation, PTY requests) belongs to the transport.

use std::io;
use std::sync::Arc;
use std::time::Duration;

pub use crate::core::Sink;

pub mod memory;

/// Outcome of waiting for the next input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete line, without its terminator.
    Line(String),
    /// The client hung up or the sink was closed.
    Closed,
    /// Nothing arrived within the idle timeout.
    TimedOut,
}

/// One accepted client.
pub trait Connection: Send {
    /// User name the client asked to log in as.
    fn identity(&self) -> &str;

    /// Wire-encoded public key the client authenticated with.
    fn public_key(&self) -> &[u8];

    /// Remote address, for logs.
    fn peer(&self) -> String {
        String::from("unknown")
    }

    /// Block until a line arrives, the connection closes, or `idle` elapses.
    fn read_line(&mut self, idle: Option<Duration>) -> io::Result<ReadEvent>;

    /// Output side of this connection.
    fn sink(&self) -> Arc<dyn Sink>;
}

/// Outcome of waiting for the next client.
pub enum AcceptEvent {
    Connection(Box<dyn Connection>),
    /// The listener is done and will not accept again.
    Done,
    /// Nobody dialed in within the wait.
    TimedOut,
}

/// Source of incoming connections.
pub trait Acceptor: Send {
    /// Block until a client arrives, the listener finishes, or `wait` elapses.
    fn accept(&mut self, wait: Option<Duration>) -> io::Result<AcceptEvent>;
}
