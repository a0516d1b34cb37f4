//! Progress spinner for long-running handlers.
//!
//! The spinner draws on its own thread straight to the session's sink. It
//! stops when told to, when dropped, or when the session closes, and its
//! thread is always joined before `stop` or `drop` returns.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::core::{Session, Sink};

/// Frames drawn in turn.
pub const FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

/// Default delay between frames.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// A running spinner.
///
/// # Examples
///
/// ```no_run
/// # use rsh_console::core::{Command, HandlerResult};
/// use rsh_console::ticker::Spinner;
///
/// let cmd = Command::new("tldr", |session, _, _| -> HandlerResult {
///     let spinner = Spinner::start(session, "thinking");
///     std::thread::sleep(std::time::Duration::from_secs(2));
///     spinner.stop();
///     session.result("done");
///     Ok(())
/// });
/// ```
pub struct Spinner {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<usize>>,
    sink: Arc<dyn Sink>,
}

impl Spinner {
    /// Flush the session's pending output and start spinning after it.
    pub fn start(session: &Session, label: impl Into<String>) -> Self {
        let _ = session.flush();
        Self::with_interval(session.sink(), label, DEFAULT_INTERVAL)
    }

    /// Spin on `sink`, one frame every `interval`.
    pub fn with_interval(
        sink: Arc<dyn Sink>,
        label: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let label = label.into();
        let (tx, rx) = mpsc::channel::<()>();
        let thread_sink = Arc::clone(&sink);

        let handle = thread::spawn(move || {
            let mut frames = 0usize;
            loop {
                if thread_sink.is_closed() {
                    debug!("session closed, spinner stopping");
                    break;
                }
                let frame = FRAMES[frames % FRAMES.len()];
                if thread_sink.write(format!("\r{} {} ", frame, label).as_bytes()).is_err() {
                    break;
                }
                frames += 1;
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            frames
        });

        Self {
            stop: Some(tx),
            handle: Some(handle),
            sink,
        }
    }

    /// Check whether the drawing thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop spinning, erase the spinner line and return how many frames were drawn.
    pub fn stop(mut self) -> usize {
        self.finish()
    }

    fn finish(&mut self) -> usize {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let frames = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => return 0,
        };
        if !self.sink.is_closed() {
            let _ = self.sink.write(b"\r\x1b[2K");
        }
        frames
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Spinner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spinner")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Run `work` with a spinner showing, then clear it.
pub fn with_spinner<T>(session: &Session, label: &str, work: impl FnOnce() -> T) -> T {
    let spinner = Spinner::start(session, label);
    let out = work();
    spinner.stop();
    out
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::core::UserRegistry;
    use crate::transport::memory::CaptureSink;

    fn session() -> (Session, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::default());
        let session = Session::new(1, "alice", Arc::new(UserRegistry::new()), sink.clone());
        (session, sink)
    }

    #[test]
    fn test_spinner_draws_and_stops() {
        let (_session, sink) = session();
        let spinner = Spinner::with_interval(sink.clone(), "working", Duration::from_millis(5));
        assert!(sink.wait_for("/ working", Duration::from_secs(2)));

        let frames = spinner.stop();
        assert!(frames >= 2);
        assert!(sink.contents().ends_with("\r\x1b[2K"));
    }

    #[test]
    fn test_start_flushes_pending_output_first() {
        let (session, sink) = session();
        session.info("before");
        let spinner = Spinner::start(&session, "busy");
        spinner.stop();
        assert!(sink.contents().starts_with("before\n\r| busy "));
    }

    #[test]
    fn test_spinner_ends_when_session_closes() {
        let (session, sink) = session();
        let spinner = Spinner::with_interval(sink.clone(), "waiting", Duration::from_millis(5));
        assert!(sink.wait_for("waiting", Duration::from_secs(2)));

        session.close();
        let deadline = Instant::now() + Duration::from_secs(2);
        while spinner.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!spinner.is_running());
    }

    #[test]
    fn test_drop_joins_thread() {
        let (_session, sink) = session();
        {
            let _spinner = Spinner::with_interval(sink.clone(), "scoped", Duration::from_millis(5));
            assert!(sink.wait_for("scoped", Duration::from_secs(2)));
        }
        let len = sink.contents().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.contents().len(), len);
    }

    #[test]
    fn test_with_spinner_returns_work_result() {
        let (session, _) = session();
        assert_eq!(with_spinner(&session, "adding", || 2 + 2), 4);
    }
}
