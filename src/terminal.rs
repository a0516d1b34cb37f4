//! Terminal backend: one local session over stdin/stdout.
//!
//! Useful for running the shell on a console without a network listener.
//! The operator still authenticates: the connection presents a public key
//! that has to be authorized for the chosen identity.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::Sink;
use crate::transport::{Connection, ReadEvent};

enum Input {
    Line(String),
    Eof,
}

/// Sink writing to the process's stdout.
pub struct StdoutSink {
    closed: AtomicBool,
    wake: Mutex<Option<Sender<Input>>>,
}

impl Sink for StdoutSink {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"));
        }
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(wake) = self.wake.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = wake.send(Input::Eof);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A session's connection backed by the local terminal.
pub struct StdioConnection {
    identity: String,
    key: Vec<u8>,
    lines: Receiver<Input>,
    sink: Arc<StdoutSink>,
    _reader: JoinHandle<()>,
}

impl StdioConnection {
    /// Read lines from stdin as `identity`, presenting wire-encoded `key`.
    pub fn new(identity: impl Into<String>, key: Vec<u8>) -> Self {
        Self::from_reader(identity, key, io::BufReader::new(io::stdin()))
    }

    /// Read lines from any reader instead of stdin.
    ///
    /// The reader runs on its own thread. A blocked read cannot be interrupted,
    /// so after the session closes that thread lingers until its next line.
    pub fn from_reader(
        identity: impl Into<String>,
        key: Vec<u8>,
        reader: impl BufRead + Send + 'static,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let sink = Arc::new(StdoutSink {
            closed: AtomicBool::new(false),
            wake: Mutex::new(Some(sender.clone())),
        });
        let reader = spawn_line_reader(reader, sender);

        Self {
            identity: identity.into(),
            key,
            lines: receiver,
            sink,
            _reader: reader,
        }
    }
}

fn spawn_line_reader(
    reader: impl BufRead + Send + 'static,
    sender: Sender<Input>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in reader.lines().map_while(Result::ok) {
            let line = line.trim_end_matches('\r').to_string();
            if sender.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = sender.send(Input::Eof);
    })
}

impl Connection for StdioConnection {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn public_key(&self) -> &[u8] {
        &self.key
    }

    fn peer(&self) -> String {
        String::from("local terminal")
    }

    fn read_line(&mut self, idle: Option<Duration>) -> io::Result<ReadEvent> {
        if self.sink.is_closed() {
            return Ok(ReadEvent::Closed);
        }
        let input = match idle {
            Some(timeout) => self.lines.recv_timeout(timeout),
            None => self.lines.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        Ok(match input {
            Ok(Input::Line(line)) => ReadEvent::Line(line),
            Ok(Input::Eof) | Err(RecvTimeoutError::Disconnected) => ReadEvent::Closed,
            Err(RecvTimeoutError::Timeout) => ReadEvent::TimedOut,
        })
    }

    fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }
}
