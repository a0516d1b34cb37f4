//! Core shell types with no transport attached.
//!
//! This module provides the fundamental building blocks:
//! - [`tokenize`] - Quote-aware line splitting
//! - [`CommandArgs`] - Tokens, a consumption cursor and lazily defined flags
//! - [`ExecLevel`] - Ordered permission levels
//! - [`Command`] - The command tree and dispatcher
//! - [`UserRegistry`] - Users, their authorized keys and history
//! - [`Session`] - Per-connection state handed to handlers

mod args;
mod command;
mod flags;
pub(crate) mod keys;
mod matcher;
mod output;
mod permissions;
mod registry;
mod session;
mod tokenizer;

pub use args::{ArgsError, CommandArgs};
pub use command::{Command, DispatchError, Handler, HandlerResult, RegistrationError};
pub use flags::{Flag, FlagKind, FlagSet, FlagValue};
pub use keys::{AuthorizedKey, KeyError, parse_authorized_keys};
pub use matcher::{abbreviation_score, edit_distance, suggest};
pub use output::{CLEAR_SCREEN, OutputLevel, styled_line};
pub use permissions::{ExecLevel, UnknownLevel};
pub use registry::{AuthError, UserRegistry, UserSnapshot};
pub use session::{Session, Sink};
pub use tokenizer::{ParseError, tokenize};
