//! Per-connection session state handed to command handlers.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use super::output::{OutputLevel, styled_line};
use super::{Command, ExecLevel, UserRegistry};

/// Write side of a connection.
///
/// Shared between the session loop and anything a handler spawns (tickers),
/// so every method takes `&self`.
pub trait Sink: Send + Sync {
    /// Write bytes to the remote end. Fails once the sink is closed.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Check whether [`Sink::close`] has been called or the peer went away.
    fn is_closed(&self) -> bool;
}

/// One authenticated session.
///
/// The session borrows its user's level and history from the shared
/// [`UserRegistry`] by identity, so it never holds a copy that could go stale.
/// Output written through the helpers is buffered until [`Session::flush`].
pub struct Session {
    id: u64,
    identity: String,
    peer: String,
    users: Arc<UserRegistry>,
    commands: Option<Arc<Command>>,
    sink: Arc<dyn Sink>,
    pending: Mutex<String>,
    local_history: Mutex<Vec<String>>,
    colored: bool,
}

impl Session {
    /// Create a session for an already authenticated identity.
    pub fn new(
        id: u64,
        identity: impl Into<String>,
        users: Arc<UserRegistry>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Self {
            id,
            identity: identity.into(),
            peer: String::from("unknown"),
            users,
            commands: None,
            sink,
            pending: Mutex::default(),
            local_history: Mutex::default(),
            colored: false,
        }
    }

    /// Set the peer address shown by `whoami` and in logs.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// Attach the command tree this session dispatches into.
    pub fn with_commands(mut self, commands: Arc<Command>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Enable or disable ANSI colors on output lines.
    pub fn with_colors(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    #[inline]
    pub fn colored(&self) -> bool {
        self.colored
    }

    /// The user's current level. A user removed from the registry mid-session
    /// drops to [`ExecLevel::All`].
    pub fn level(&self) -> ExecLevel {
        self.users.level_of(&self.identity).unwrap_or(ExecLevel::All)
    }

    /// Shared registry this session authenticated against.
    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    /// Root of the command tree, if attached.
    pub fn commands(&self) -> Option<&Command> {
        self.commands.as_deref()
    }

    /// The user's full history across all sessions.
    pub fn history(&self) -> Vec<String> {
        self.users.history(&self.identity).unwrap_or_default()
    }

    /// Lines executed successfully in this session only.
    pub fn session_history(&self) -> Vec<String> {
        self.local_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a successfully executed line.
    pub fn record(&self, line: &str) {
        self.users.append_history(&self.identity, line);
        self.local_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    /// Forget this session's own history.
    pub fn clear_session_history(&self) -> usize {
        let mut history = self.local_history.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = history.len();
        history.clear();
        removed
    }

    /// Buffer raw text without any styling.
    pub fn write_str(&self, text: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    /// Buffer one line at the given level.
    pub fn print(&self, level: OutputLevel, message: impl AsRef<str>) {
        self.write_str(&styled_line(level, message.as_ref(), self.colored));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.print(OutputLevel::Info, message);
    }

    pub fn result(&self, message: impl AsRef<str>) {
        self.print(OutputLevel::Result, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.print(OutputLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.print(OutputLevel::Error, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.print(OutputLevel::Debug, message);
    }

    /// Text buffered since the last flush.
    pub fn pending_output(&self) -> String {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send buffered output to the sink.
    pub fn flush(&self) -> io::Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let text = std::mem::take(&mut *pending);
        drop(pending);
        if text.is_empty() {
            return Ok(());
        }
        self.sink.write(text.as_bytes())
    }

    /// Flush pending output, then write `text` straight to the sink.
    pub fn write_now(&self, text: &str) -> io::Result<()> {
        self.flush()?;
        self.sink.write(text.as_bytes())
    }

    /// Flush pending output, then write `text` one character at a time with
    /// `delay` before each, like a typewriter, and end the line.
    ///
    /// Stops with an error as soon as the connection closes.
    pub fn type_out(&self, text: &str, delay: Duration) -> io::Result<()> {
        self.flush()?;
        let mut buf = [0; 4];
        for c in text.chars() {
            thread::sleep(delay);
            self.sink.write(c.encode_utf8(&mut buf).as_bytes())?;
        }
        self.sink.write(b"\n")
    }

    /// Flush and close the underlying connection. Idempotent.
    pub fn close(&self) {
        if !self.sink.is_closed() {
            let _ = self.flush();
        }
        self.sink.close();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    /// Shared handle to the sink, for output produced off the session thread.
    pub fn sink(&self) -> Arc<dyn Sink> {
        Arc::clone(&self.sink)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("peer", &self.peer)
            .field("colored", &self.colored)
            .field("closed", &self.is_closed())
            .finish()
    }
}
