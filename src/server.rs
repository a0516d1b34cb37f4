//! Session manager: authentication, the per-session read loop and hooks.
//!
//! One thread runs each session. Every line goes through the same pipeline:
//! tokenize, pre-exec hook, dispatch (with panic recovery), post-exec hook,
//! then history on success. Nothing a handler does can take the server down.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::{
    AuthError, Command, CommandArgs, DispatchError, OutputLevel, Session, Sink, UserRegistry,
    styled_line,
};
use crate::transport::{AcceptEvent, Acceptor, Connection, ReadEvent};

/// Runs before dispatch. Returning an error vetoes the line; the error is
/// shown to the user and nothing is dispatched or recorded.
/// A panicking hook counts as a veto.
pub type PreExecHook =
    Box<dyn Fn(&Session, &CommandArgs) -> anyhow::Result<()> + Send + Sync>;

/// Runs after dispatch with its outcome, whether or not it succeeded. A panic
/// here is logged and the session carries on.
pub type PostExecHook =
    Box<dyn Fn(&Session, &CommandArgs, Option<&DispatchError>) + Send + Sync>;

/// How long [`ShellServer::serve`] waits on its acceptor before checking for
/// shutdown.
pub const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Per-session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Written before every read.
    pub prompt: String,
    /// Close the session after this long without input. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Wrap output lines in ANSI colors.
    pub colored: bool,
    /// Greet the user with the key they authenticated with.
    pub greeting: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prompt: String::from("> "),
            idle_timeout: Some(Duration::from_secs(60)),
            colored: false,
            greeting: true,
        }
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why an authenticated session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client hung up.
    Eof,
    /// A command (such as `exit`) closed the session.
    ClosedByCommand,
    /// No input within the idle timeout.
    IdleTimeout,
    /// Reading from the transport failed.
    ReadError(io::ErrorKind),
    /// [`ShellServer::shutdown`] closed it.
    Shutdown,
}

/// A session currently in its read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub identity: String,
    pub peer: String,
}

struct ActiveSession {
    info: SessionInfo,
    sink: Arc<dyn Sink>,
}

/// Closes the session and drops it from the active list, even when the
/// session thread unwinds.
struct ActiveGuard<'a> {
    server: &'a ShellServer,
    session: &'a Session,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.session.close();
        self.server.unregister(self.session.id());
    }
}

/// Serves a command tree to authenticated users.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rsh_console::core::{AuthorizedKey, Command, ExecLevel, UserRegistry};
/// use rsh_console::server::ShellServer;
/// use rsh_console::transport::memory;
///
/// let key = AuthorizedKey::from_openssh(
///     "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f",
/// )
/// .unwrap();
/// let users = Arc::new(UserRegistry::new());
/// users.register_user("alice", ExecLevel::User, [key.clone()], Vec::new());
///
/// let mut root = Command::root();
/// root.add_command(Command::new("status", |session, _, _| {
///     session.result("ok");
///     Ok(())
/// }))
/// .unwrap();
///
/// let server = ShellServer::new(root, users);
/// let (client, conn) = memory::pair("alice", key.wire());
/// client.send_line("status");
/// client.hang_up();
///
/// server.handle_connection(Box::new(conn)).unwrap();
/// assert!(client.output().contains("ok\n"));
/// ```
pub struct ShellServer {
    commands: Arc<Command>,
    users: Arc<UserRegistry>,
    options: SessionOptions,
    pre_exec: Option<PreExecHook>,
    post_exec: Option<PostExecHook>,
    active: Mutex<HashMap<u64, ActiveSession>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl ShellServer {
    pub fn new(commands: Command, users: Arc<UserRegistry>) -> Self {
        Self {
            commands: Arc::new(commands),
            users,
            options: SessionOptions::default(),
            pre_exec: None,
            post_exec: None,
            active: Mutex::default(),
            next_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Install the hook run before every dispatch.
    pub fn pre_exec<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Session, &CommandArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pre_exec = Some(Box::new(hook));
        self
    }

    /// Install the hook run after every dispatch.
    pub fn post_exec<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Session, &CommandArgs, Option<&DispatchError>) + Send + Sync + 'static,
    {
        self.post_exec = Some(Box::new(hook));
        self
    }

    pub fn commands(&self) -> &Command {
        &self.commands
    }

    pub fn users(&self) -> &Arc<UserRegistry> {
        &self.users
    }

    pub fn session_options(&self) -> &SessionOptions {
        &self.options
    }

    /// Sessions currently in their read loop, ordered by id.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sessions: Vec<SessionInfo> = active.values().map(|s| s.info.clone()).collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Close every active session and refuse new ones.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let sinks: Vec<Arc<dyn Sink>> = {
            let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            active.values().map(|s| Arc::clone(&s.sink)).collect()
        };
        info!(sessions = sinks.len(), "shutting down");
        for sink in sinks {
            sink.close();
        }
    }

    /// Authenticate one connection and run its session to completion.
    ///
    /// Returns why the session ended, or the authentication failure. Handler
    /// errors and panics never surface here.
    pub fn handle_connection(
        &self,
        mut conn: Box<dyn Connection>,
    ) -> Result<SessionEnd, AuthError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let identity = conn.identity().to_string();
        let peer = conn.peer();
        let sink = conn.sink();
        let mut state = SessionState::Connecting;
        debug!(session = id, user = %identity, peer = %peer, %state, "connection accepted");

        state = SessionState::Authenticating;
        debug!(session = id, %state);
        let key = match self.users.authenticate(&identity, conn.public_key()) {
            Ok(key) => key,
            Err(err) => {
                warn!(
                    session = id,
                    user = %identity,
                    peer = %peer,
                    error = %err,
                    "authentication failed"
                );
                let line = styled_line(
                    OutputLevel::Error,
                    &format!("Access denied: {}", err),
                    self.options.colored,
                );
                let _ = sink.write(line.as_bytes());
                sink.close();
                return Err(err);
            }
        };

        let users = Arc::clone(&self.users);
        let session = Session::new(id, identity.as_str(), users, Arc::clone(&sink))
            .with_peer(peer.as_str())
            .with_commands(Arc::clone(&self.commands))
            .with_colors(self.options.colored);

        self.register(&session);
        let guard = ActiveGuard {
            server: self,
            session: &session,
        };
        state = SessionState::Active;
        info!(
            session = id,
            user = %identity,
            peer = %peer,
            key = key.fingerprint(),
            level = %session.level(),
            %state,
            "session started"
        );

        if self.options.greeting {
            session.info(format!(
                "Welcome {}! Authenticated with {} key {}",
                identity,
                key.algorithm(),
                key.fingerprint()
            ));
        }

        let end = self.read_loop(&session, conn.as_mut());

        drop(guard);
        state = SessionState::Closed;
        info!(session = id, user = %identity, %state, reason = ?end, "session ended");
        Ok(end)
    }

    fn register(&self, session: &Session) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(
            session.id(),
            ActiveSession {
                info: SessionInfo {
                    id: session.id(),
                    identity: session.identity().to_string(),
                    peer: session.peer().to_string(),
                },
                sink: session.sink(),
            },
        );
        // shutdown may have swept the map before this insert
        if self.is_shutting_down() {
            session.close();
        }
    }

    fn unregister(&self, id: u64) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn read_loop(&self, session: &Session, conn: &mut dyn Connection) -> SessionEnd {
        loop {
            if session.is_closed() {
                return self.closed_reason();
            }
            if session.write_now(&self.options.prompt).is_err() {
                return self.closed_reason();
            }

            match conn.read_line(self.options.idle_timeout) {
                Ok(ReadEvent::Line(line)) => {
                    self.run_line(session, &line);
                    let _ = session.flush();
                }
                Ok(ReadEvent::Closed) if session.is_closed() => return self.closed_reason(),
                Ok(ReadEvent::Closed) => return SessionEnd::Eof,
                Ok(ReadEvent::TimedOut) => {
                    let secs = self.options.idle_timeout.map_or(0, |d| d.as_secs());
                    session.warn(format!("\nIdle for {}s, closing session", secs));
                    return SessionEnd::IdleTimeout;
                }
                Err(err) => {
                    warn!(session = session.id(), error = %err, "read failed");
                    return SessionEnd::ReadError(err.kind());
                }
            }
        }
    }

    fn closed_reason(&self) -> SessionEnd {
        if self.is_shutting_down() {
            SessionEnd::Shutdown
        } else {
            SessionEnd::ClosedByCommand
        }
    }

    /// Run one input line through the pipeline. Output is left buffered on
    /// the session.
    pub fn run_line(&self, session: &Session, line: &str) {
        let mut args = match CommandArgs::new(line) {
            Ok(args) => args,
            Err(err) => {
                session.error(format!("Error parsing command: {}", err));
                return;
            }
        };
        if args.is_empty() {
            return;
        }

        if let Some(hook) = &self.pre_exec {
            match panic::catch_unwind(AssertUnwindSafe(|| hook(session, &args))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(session = session.id(), line, error = %err, "vetoed by pre-exec hook");
                    session.error(format!("{:#}", err));
                    return;
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    warn!(session = session.id(), line, panic = %message, "pre-exec hook panicked");
                    session.error(format!("Internal error: pre-exec hook panicked: {}", message));
                    return;
                }
            }
        }

        let result = self.dispatch(session, &mut args);

        if let Some(hook) = &self.post_exec {
            let outcome = result.as_ref().err();
            let ran = panic::catch_unwind(AssertUnwindSafe(|| hook(session, &args, outcome)));
            if let Err(payload) = ran {
                let message = panic_message(&*payload);
                warn!(session = session.id(), line, panic = %message, "post-exec hook panicked");
            }
        }

        match result {
            Ok(()) => session.record(line),
            Err(err) => {
                debug!(session = session.id(), line, error = %err, "command failed");
                report(session, &err);
            }
        }
    }

    fn dispatch(&self, session: &Session, args: &mut CommandArgs) -> Result<(), DispatchError> {
        let command = args.peel_off(0).to_string();
        let ran = panic::catch_unwind(AssertUnwindSafe(|| self.commands.execute(session, args)));
        ran.unwrap_or_else(|payload| {
            let message = panic_message(&*payload);
            warn!(session = session.id(), %command, panic = %message, "command panicked");
            Err(DispatchError::Panicked { command, message })
        })
    }

    /// Accept connections until the acceptor is exhausted or the server shuts
    /// down, one thread per session. Waits for running sessions before returning.
    ///
    /// The acceptor is polled every [`ACCEPT_POLL`], so [`shutdown`](Self::shutdown)
    /// ends the loop within one poll even if nobody dials in.
    pub fn serve(self: &Arc<Self>, mut acceptor: impl Acceptor) -> io::Result<()> {
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        while !self.is_shutting_down() {
            let conn = match acceptor.accept(Some(ACCEPT_POLL))? {
                AcceptEvent::Connection(conn) => conn,
                AcceptEvent::TimedOut => continue,
                AcceptEvent::Done => break,
            };
            if self.is_shutting_down() {
                conn.sink().close();
                break;
            }

            sessions.retain(|handle| !handle.is_finished());
            let server = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("session-{}", conn.identity()))
                .spawn(move || {
                    let _ = server.handle_connection(conn);
                })?;
            sessions.push(handle);
        }

        debug!(remaining = sessions.len(), "acceptor finished, waiting for sessions");
        for handle in sessions {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Run [`serve`](Self::serve) on a background thread.
    pub fn spawn(
        self: &Arc<Self>,
        acceptor: impl Acceptor + 'static,
    ) -> io::Result<JoinHandle<io::Result<()>>> {
        let server = Arc::clone(self);
        thread::Builder::new()
            .name("shell-acceptor".to_string())
            .spawn(move || server.serve(acceptor))
    }
}

impl fmt::Debug for ShellServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellServer")
            .field("options", &self.options)
            .field("users", &self.users.len())
            .field("active", &self.active_count())
            .field("pre_exec", &self.pre_exec.is_some())
            .field("post_exec", &self.post_exec.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Render a dispatch failure for the user.
fn report(session: &Session, err: &DispatchError) {
    if let Some(usage) = err.help_usage() {
        session.info(usage);
        return;
    }
    match err {
        DispatchError::UnknownCommand { name, suggestions } => {
            session.error(format!("Unknown command: {}", name));
            if !suggestions.is_empty() {
                session.info(format!("Did you mean: {}?", suggestions.join(", ")));
            }
            session.info("Type 'help' to list available commands.");
        }
        DispatchError::PermissionDenied { .. } | DispatchError::Handler { .. } => {
            session.error(format!("Error: {}", err))
        }
        DispatchError::Panicked { .. } => session.error(format!("Internal error: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::core::keys::tests::{ALICE_KEY, BOB_KEY, MALLORY_KEY};
    use crate::core::{AuthorizedKey, ExecLevel};
    use crate::transport::memory::{self, MemoryClient};

    const WAIT: Duration = Duration::from_secs(5);

    fn key(line: &str) -> AuthorizedKey {
        AuthorizedKey::from_openssh(line).unwrap()
    }

    fn users() -> Arc<UserRegistry> {
        let users = Arc::new(UserRegistry::new());
        users.register_user("alice", ExecLevel::Admin, [key(ALICE_KEY)], Vec::new());
        users.register_user("bob", ExecLevel::User, [key(BOB_KEY)], Vec::new());
        users
    }

    fn tree() -> Command {
        let mut root = crate::builtins::default_root().unwrap();
        root.add_commands([
            Command::new("status", |session, _, _| {
                session.result("all good");
                Ok(())
            }),
            Command::new("fail", |_, _, _| anyhow::bail!("disk on fire")),
            Command::new("boom", |_, _, _| panic!("handler exploded")),
            Command::new("reboot", |session, _, _| {
                session.result("rebooting");
                Ok(())
            })
            .level(ExecLevel::Admin),
        ])
        .unwrap();
        root
    }

    fn quiet() -> SessionOptions {
        SessionOptions {
            greeting: false,
            ..SessionOptions::default()
        }
    }

    fn run_script(
        server: &ShellServer,
        user: &str,
        key_line: &str,
        lines: &[&str],
    ) -> (MemoryClient, Result<SessionEnd, AuthError>) {
        let (client, conn) = memory::pair(user, key(key_line).wire());
        for line in lines {
            client.send_line(*line);
        }
        client.hang_up();
        let end = server.handle_connection(Box::new(conn));
        (client, end)
    }

    #[test]
    fn test_greeting_names_key() {
        let server = ShellServer::new(tree(), users());
        let (client, end) = run_script(&server, "alice", ALICE_KEY, &[]);

        assert_eq!(end, Ok(SessionEnd::Eof));
        let out = client.output();
        assert!(out.contains("Welcome alice!"));
        assert!(out.contains(key(ALICE_KEY).fingerprint()));
    }

    #[test]
    fn test_successful_command_is_recorded() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users)).options(quiet());
        let (client, _) = run_script(&server, "bob", BOB_KEY, &["status"]);

        assert!(client.output().contains("all good\n"));
        assert_eq!(users.history("bob"), Some(vec!["status".to_string()]));
    }

    #[test]
    fn test_failures_are_not_recorded() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users)).options(quiet());
        let (client, end) = run_script(
            &server,
            "bob",
            BOB_KEY,
            &["reboot", "nope", "fail", "echo \"unterminated", "status"],
        );

        assert_eq!(end, Ok(SessionEnd::Eof));
        let out = client.output();
        assert!(out.contains("permission denied: 'reboot' requires Admin, you are User"));
        assert!(!out.contains("rebooting"));
        assert!(out.contains("Unknown command: nope"));
        assert!(out.contains("Error: fail: disk on fire"));
        assert!(out.contains("Error parsing command"));
        assert_eq!(users.history("bob"), Some(vec!["status".to_string()]));
    }

    #[test]
    fn test_blank_lines_do_nothing() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users)).options(quiet());
        let (_, end) = run_script(&server, "bob", BOB_KEY, &["", "   "]);

        assert_eq!(end, Ok(SessionEnd::Eof));
        assert_eq!(users.history("bob"), Some(Vec::new()));
    }

    #[test]
    fn test_panic_is_contained() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users)).options(quiet());
        let (client, end) = run_script(&server, "bob", BOB_KEY, &["boom", "status"]);

        assert_eq!(end, Ok(SessionEnd::Eof));
        let out = client.output();
        assert!(out.contains("handler exploded"));
        assert!(out.contains("all good"));
        assert_eq!(users.history("bob"), Some(vec!["status".to_string()]));
    }

    #[test]
    fn test_unknown_user_and_wrong_key() {
        let server = ShellServer::new(tree(), users());

        let (client, end) = run_script(&server, "mallory", MALLORY_KEY, &["status"]);
        assert_eq!(end, Err(AuthError::UnknownUser { identity: "mallory".into() }));
        assert!(client.is_closed());
        assert!(!client.output().contains("all good"));

        let (client, end) = run_script(&server, "alice", MALLORY_KEY, &["status"]);
        assert_eq!(end, Err(AuthError::KeyRejected { identity: "alice".into() }));
        assert!(client.output().contains("Access denied"));
        assert_eq!(server.active_count(), 0);
    }

    #[test]
    fn test_pre_exec_veto() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users))
            .options(quiet())
            .pre_exec(|_, args| {
                if args.peel_off(0) == "status" {
                    anyhow::bail!("status is disabled during maintenance");
                }
                Ok(())
            });
        let (client, _) = run_script(&server, "alice", ALICE_KEY, &["status", "reboot"]);

        let out = client.output();
        assert!(out.contains("status is disabled during maintenance"));
        assert!(!out.contains("all good"));
        assert!(out.contains("rebooting"));
        assert_eq!(users.history("alice"), Some(vec!["reboot".to_string()]));
    }

    #[test]
    fn test_panicking_pre_exec_is_a_veto() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users))
            .options(quiet())
            .pre_exec(|_, _| panic!("hook blew up"));
        let (client, end) = run_script(&server, "bob", BOB_KEY, &["whoami", "status"]);

        assert_eq!(end, Ok(SessionEnd::Eof));
        assert_eq!(server.active_count(), 0);
        assert!(client.is_closed());
        let out = client.output();
        assert!(out.contains("Internal error: pre-exec hook panicked: hook blew up"));
        assert!(!out.contains("all good"));
        assert_eq!(users.history("bob"), Some(Vec::new()));
    }

    #[test]
    fn test_panicking_post_exec_is_logged_only() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users))
            .options(quiet())
            .post_exec(|_, _, _| panic!("audit log unavailable"));
        let (client, end) = run_script(&server, "bob", BOB_KEY, &["status", "status"]);

        assert_eq!(end, Ok(SessionEnd::Eof));
        assert_eq!(client.output().matches("all good").count(), 2);
        assert_eq!(users.history("bob"), Some(vec!["status".to_string(); 2]));
    }

    struct FailingConnection(memory::MemoryConnection);

    impl Connection for FailingConnection {
        fn identity(&self) -> &str {
            self.0.identity()
        }

        fn public_key(&self) -> &[u8] {
            self.0.public_key()
        }

        fn read_line(&mut self, _idle: Option<Duration>) -> io::Result<ReadEvent> {
            panic!("transport bug")
        }

        fn sink(&self) -> Arc<dyn Sink> {
            self.0.sink()
        }
    }

    #[test]
    fn test_unwinding_session_is_released() {
        let server = ShellServer::new(tree(), users()).options(quiet());
        let (client, conn) = memory::pair("bob", key(BOB_KEY).wire());

        let conn = Box::new(FailingConnection(conn));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| server.handle_connection(conn)));

        assert!(outcome.is_err());
        assert_eq!(server.active_count(), 0);
        assert!(client.is_closed());
    }

    #[test]
    fn test_post_exec_sees_every_outcome() {
        let ok = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let (ok_seen, failed_seen) = (Arc::clone(&ok), Arc::clone(&failed));

        let server = ShellServer::new(tree(), users())
            .options(quiet())
            .post_exec(move |_, _, err| {
                let counter = if err.is_some() { &failed_seen } else { &ok_seen };
                counter.fetch_add(1, Ordering::SeqCst);
            });
        run_script(&server, "bob", BOB_KEY, &["status", "fail", "reboot", "boom", "whoami"]);

        assert_eq!(ok.load(Ordering::SeqCst), 2);
        assert_eq!(failed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exit_closes_session() {
        let users = users();
        let server = ShellServer::new(tree(), Arc::clone(&users)).options(quiet());
        let (client, conn) = memory::pair("bob", key(BOB_KEY).wire());
        client.send_line("exit");
        client.send_line("status");

        let end = server.handle_connection(Box::new(conn));
        assert_eq!(end, Ok(SessionEnd::ClosedByCommand));
        assert!(client.is_closed());
        assert!(client.output().contains("Bye bye"));
        assert!(!client.output().contains("all good"));
        assert_eq!(users.history("bob"), Some(vec!["exit".to_string()]));
    }

    #[test]
    fn test_idle_timeout() {
        let server = ShellServer::new(tree(), users()).options(SessionOptions {
            idle_timeout: Some(Duration::from_millis(50)),
            greeting: false,
            ..SessionOptions::default()
        });
        let (client, conn) = memory::pair("bob", key(BOB_KEY).wire());

        let end = server.handle_connection(Box::new(conn));
        assert_eq!(end, Ok(SessionEnd::IdleTimeout));
        assert!(client.is_closed());
        assert!(client.output().contains("closing session"));
    }

    #[test]
    fn test_prompt_written_before_each_read() {
        let server = ShellServer::new(tree(), users()).options(SessionOptions {
            prompt: "rsh$ ".to_string(),
            greeting: false,
            ..SessionOptions::default()
        });
        let (client, _) = run_script(&server, "bob", BOB_KEY, &["status"]);
        assert_eq!(client.output(), "rsh$ all good\nrsh$ ");
    }

    #[test]
    fn test_serve_and_shutdown() {
        let server = Arc::new(ShellServer::new(tree(), users()).options(quiet()));
        let (dialer, acceptor) = memory::listener();
        let acceptor_thread = server.spawn(acceptor).unwrap();

        let alice = dialer.connect("alice", key(ALICE_KEY).wire()).unwrap();
        let bob = dialer.connect("bob", key(BOB_KEY).wire()).unwrap();
        assert!(alice.wait_for("> ", WAIT));
        assert!(bob.wait_for("> ", WAIT));
        assert_eq!(server.active_count(), 2);
        let identities: Vec<String> =
            server.active_sessions().into_iter().map(|s| s.identity).collect();
        assert!(identities.contains(&"alice".to_string()));

        server.shutdown();
        assert!(alice.wait_closed(WAIT));
        assert!(bob.wait_closed(WAIT));

        drop(dialer);
        acceptor_thread.join().unwrap().unwrap();
        assert_eq!(server.active_count(), 0);
    }

    #[test]
    fn test_shutdown_stops_idle_acceptor() {
        let server = Arc::new(ShellServer::new(tree(), users()).options(quiet()));
        let (dialer, acceptor) = memory::listener();
        let acceptor_thread = server.spawn(acceptor).unwrap();

        let alice = dialer.connect("alice", key(ALICE_KEY).wire()).unwrap();
        assert!(alice.wait_for("> ", WAIT));

        // the dialer stays open, so only shutdown can end the accept loop
        server.shutdown();
        acceptor_thread.join().unwrap().unwrap();
        assert!(alice.is_closed());
        assert_eq!(server.active_count(), 0);
        assert!(dialer.connect("bob", key(BOB_KEY).wire()).is_none());
    }
}
