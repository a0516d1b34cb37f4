//! An embeddable, role-gated command shell for authenticated remote sessions.
//!
//! A host application builds a tree of [`Command`]s, each requiring an
//! [`ExecLevel`], registers users with their authorized public keys in a
//! [`UserRegistry`], and hands both to a [`ShellServer`]. Every accepted
//! connection is authenticated against the registry, then each line the user
//! types is tokenized, permission-checked at every level of the tree, run, and
//! on success appended to that user's history.
//!
//! # Features
//!
//! - `persist` (default): RON configuration with the user roster and history
//! - `terminal`: stdin/stdout connection and log setup for a local operator
//! - `full`: Enable terminal + persist
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use rsh_console::prelude::*;
//! use rsh_console::transport::memory;
//!
//! let key = AuthorizedKey::from_openssh(
//!     "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f ops@host",
//! )
//! .unwrap();
//!
//! let users = Arc::new(UserRegistry::new());
//! users.register_user("alice", ExecLevel::Admin, [key.clone()], Vec::new());
//!
//! let mut root = builtins::default_root().unwrap();
//! root.add_command(
//!     Command::new("lines", |session, _cmd, args| {
//!         args.flag_int("cnt", 5, "number of lines")?;
//!         args.parse()?;
//!         for i in 0..args.int_flag("cnt").unwrap_or(5) {
//!             session.result(format!("line {}", i));
//!         }
//!         Ok(())
//!     })
//!     .description("Print some lines"),
//! )
//! .unwrap();
//!
//! let server = ShellServer::new(root, Arc::clone(&users));
//! let (client, conn) = memory::pair("alice", key.wire());
//! client.send_line("lines --cnt 2");
//! client.hang_up();
//! server.handle_connection(Box::new(conn)).unwrap();
//!
//! assert!(client.output().contains("line 1\n"));
//! assert_eq!(users.history("alice"), Some(vec!["lines --cnt 2".to_string()]));
//! ```

// Core module (always available)
pub mod core;

pub mod builtins;
pub mod server;
pub mod ticker;
pub mod transport;

// Terminal backend (feature-gated)
#[cfg(feature = "terminal")]
pub mod logging;
#[cfg(feature = "terminal")]
pub mod terminal;

// Persistence module (feature-gated)
#[cfg(feature = "persist")]
pub mod persist;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ArgsError, AuthError, AuthorizedKey, Command, CommandArgs, DispatchError, ExecLevel, Handler,
    HandlerResult, ParseError, RegistrationError, Session, UserRegistry,
};
pub use server::{SessionEnd, SessionOptions, ShellServer};

#[cfg(feature = "persist")]
pub use persist::{ConfigError, ShellConfigFile, UserEntry};

#[cfg(feature = "terminal")]
pub use terminal::StdioConnection;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builtins;
    pub use crate::core::{
        AuthorizedKey, Command, CommandArgs, ExecLevel, HandlerResult, OutputLevel, Session,
        UserRegistry,
    };
    pub use crate::server::{SessionOptions, ShellServer};
    pub use crate::ticker::Spinner;
}
