//! The command tree and its dispatcher.
//!
//! A [`Command`] is a named node with an optional handler, a required
//! [`ExecLevel`], and child commands. The root node is never matched by name;
//! dispatch starts at its children. A node's level is never weaker than its
//! parent's, which is checked whenever a child is attached.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::matcher::suggest;
use super::{ArgsError, CommandArgs, ExecLevel, Session};

/// Result type returned by command handlers.
pub type HandlerResult = anyhow::Result<()>;

/// Something that can run a command.
///
/// Implemented for every `Fn(&Session, &Command, &mut CommandArgs) -> HandlerResult`,
/// so plain closures work; implement it directly for stateful handlers.
pub trait Handler: Send + Sync {
    fn execute(
        &self,
        session: &Session,
        command: &Command,
        args: &mut CommandArgs,
    ) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Session, &Command, &mut CommandArgs) -> HandlerResult + Send + Sync,
{
    fn execute(
        &self,
        session: &Session,
        command: &Command,
        args: &mut CommandArgs,
    ) -> HandlerResult {
        self(session, command, args)
    }
}

/// Attaching a child to the tree failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("'{parent}' already has a sub-command named '{name}'")]
    DuplicateName { parent: String, name: String },

    #[error("'{command}' requires {level}, weaker than its parent '{parent}' which requires {parent_level}")]
    LevelWeakerThanParent {
        parent: String,
        parent_level: ExecLevel,
        command: String,
        level: ExecLevel,
    },

    #[error("invalid command name {name:?}")]
    InvalidName { name: String },
}

/// Running a line through the tree failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command not found: {name}")]
    UnknownCommand { name: String, suggestions: Vec<String> },

    #[error("permission denied: '{command}' requires {required}, you are {actual}")]
    PermissionDenied {
        command: String,
        required: ExecLevel,
        actual: ExecLevel,
    },

    #[error("{command}: {error:#}")]
    Handler { command: String, error: anyhow::Error },

    #[error("{command}: command panicked: {message}")]
    Panicked { command: String, message: String },
}

impl DispatchError {
    /// Usage text if the handler stopped because `--help` was given.
    pub fn help_usage(&self) -> Option<&str> {
        match self {
            DispatchError::Handler { error, .. } => match error.downcast_ref::<ArgsError>() {
                Some(ArgsError::HelpRequested { usage }) => Some(usage),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A node in the command tree.
///
/// # Examples
///
/// ```
/// use rsh_console::core::{Command, ExecLevel};
///
/// let mut root = Command::root();
/// root.add_command(
///     Command::new("status", |session, _cmd, _args| {
///         session.result("all systems nominal");
///         Ok(())
///     })
///     .description("Show service status"),
/// )
/// .unwrap();
///
/// let mut users = Command::group("users").level(ExecLevel::Admin);
/// users
///     .add_command(Command::new("list", |_, _, _| Ok(())).level(ExecLevel::Admin))
///     .unwrap();
/// root.add_command(users).unwrap();
///
/// assert!(root.find(&["users", "list"]).is_some());
/// ```
pub struct Command {
    name: Box<str>,
    description: Box<str>,
    level: ExecLevel,
    handler: Option<Arc<dyn Handler>>,
    children: Vec<Command>,
    index: HashMap<Box<str>, usize>,
}

impl Command {
    /// Create a command that runs `handler`.
    ///
    /// The default level is [`ExecLevel::User`].
    pub fn new<F>(name: impl Into<Box<str>>, handler: F) -> Self
    where
        F: Fn(&Session, &Command, &mut CommandArgs) -> HandlerResult + Send + Sync + 'static,
    {
        Self::with_handler(name, handler)
    }

    /// Create a command backed by any [`Handler`] implementation.
    pub fn with_handler(name: impl Into<Box<str>>, handler: impl Handler + 'static) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::group(name)
        }
    }

    /// Create a namespace without a handler. Invoking it lists its children.
    pub fn group(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            description: "".into(),
            level: ExecLevel::User,
            handler: None,
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The unnamed root every tree hangs off. Anyone may reach it.
    pub fn root() -> Self {
        Self::group("").level(ExecLevel::All)
    }

    /// Set the description shown in listings.
    pub fn description(mut self, description: impl Into<Box<str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the level required to run this command or anything below it.
    pub fn level(mut self, level: ExecLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach a child, builder style.
    pub fn subcommand(mut self, child: Command) -> Result<Self, RegistrationError> {
        self.add_command(child)?;
        Ok(self)
    }

    /// Attach a child.
    ///
    /// Fails if the name is taken, malformed, or if the child (or anything
    /// beneath it) would require a weaker level than its parent.
    pub fn add_command(&mut self, child: Command) -> Result<(), RegistrationError> {
        if child.name.is_empty()
            || child.name.starts_with('-')
            || child.name.chars().any(char::is_whitespace)
        {
            return Err(RegistrationError::InvalidName {
                name: child.name.to_string(),
            });
        }
        if self.index.contains_key(&child.name) {
            return Err(RegistrationError::DuplicateName {
                parent: self.display_name().to_string(),
                name: child.name.to_string(),
            });
        }
        Self::check_levels(self.display_name(), self.level, &child)?;

        debug!(
            parent = self.display_name(),
            command = %child.name,
            level = %child.level,
            "command registered"
        );
        self.index.insert(child.name.clone(), self.children.len());
        self.children.push(child);
        Ok(())
    }

    /// Attach several children, stopping at the first failure.
    pub fn add_commands(
        &mut self,
        children: impl IntoIterator<Item = Command>,
    ) -> Result<(), RegistrationError> {
        children.into_iter().try_for_each(|c| self.add_command(c))
    }

    fn check_levels(
        parent: &str,
        parent_level: ExecLevel,
        node: &Command,
    ) -> Result<(), RegistrationError> {
        if node.level < parent_level {
            return Err(RegistrationError::LevelWeakerThanParent {
                parent: parent.to_string(),
                parent_level,
                command: node.name.to_string(),
                level: node.level,
            });
        }
        node.children
            .iter()
            .try_for_each(|child| Self::check_levels(&node.name, node.level, child))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        if self.name.is_empty() { "<root>" } else { &self.name }
    }

    #[inline]
    pub fn get_description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn get_level(&self) -> ExecLevel {
        self.level
    }

    #[inline]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Direct children in registration order.
    pub fn children(&self) -> &[Command] {
        &self.children
    }

    /// Direct child by name.
    pub fn child(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&i| &self.children[i])
    }

    /// Walk a path of names down from this node.
    pub fn find(&self, path: &[&str]) -> Option<&Command> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Children a caller at `level` may run.
    pub fn visible_children(&self, level: ExecLevel) -> impl Iterator<Item = &Command> {
        self.children.iter().filter(move |c| level.satisfies(c.level))
    }

    /// Aligned `name  description` listing of the children visible at `level`.
    pub fn listing(&self, level: ExecLevel) -> String {
        let visible: Vec<&Command> = self.visible_children(level).collect();
        let width = visible.iter().map(|c| c.name.len()).max().unwrap_or(0);

        let mut out = String::new();
        for child in visible {
            let marker = if child.children.is_empty() { "" } else { " ..." };
            out.push_str(&format!(
                "  {:<width$}  {}{}\n",
                child.name,
                child.description,
                marker,
                width = width
            ));
        }
        out
    }

    /// Route `args` to the matching child and run it.
    ///
    /// The first remaining token names a child of this node. The caller's
    /// level must satisfy that child's level before anything runs. If the next
    /// token names a grandchild, dispatch descends; otherwise the child's
    /// handler runs with the cursor just past the child's name. A child
    /// without a handler lists its own children instead.
    pub fn execute(&self, session: &Session, args: &mut CommandArgs) -> Result<(), DispatchError> {
        if args.is_empty() {
            return Ok(());
        }

        let caller = session.level();
        let name = args.peel_off(0).to_string();
        let Some(child) = self.child(&name) else {
            let visible = self.visible_children(caller).map(Command::name);
            return Err(DispatchError::UnknownCommand {
                suggestions: suggest(&name, visible, 3),
                name: self.path_to(args, &name),
            });
        };

        let path = self.path_to(args, &name);
        if !caller.satisfies(child.level) {
            return Err(DispatchError::PermissionDenied {
                command: path,
                required: child.level,
                actual: caller,
            });
        }

        args.advance(1);
        if child.child(args.peel_off(0)).is_some() {
            return child.execute(session, args);
        }

        match &child.handler {
            Some(handler) => {
                debug!(session = session.id(), command = %path, "running handler");
                handler
                    .execute(session, child, args)
                    .map_err(|error| DispatchError::Handler { command: path, error })
            }
            None if !args.is_empty() => child.execute(session, args),
            None => {
                session.info(format!("Available sub-commands of '{}':", path));
                session.write_str(&child.listing(caller));
                Ok(())
            }
        }
    }

    fn path_to(&self, args: &CommandArgs, name: &str) -> String {
        let mut path: Vec<&str> = args.tokens()[..args.cursor()]
            .iter()
            .map(String::as_str)
            .collect();
        path.push(name);
        path.join(" ")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("level", &self.level)
            .field("has_handler", &self.handler.is_some())
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::UserRegistry;
    use crate::transport::memory::CaptureSink;

    fn session_at(level: ExecLevel) -> Session {
        let users = Arc::new(UserRegistry::new());
        users.register_user("alice", level, Vec::new(), Vec::new());
        Session::new(1, "alice", users, Arc::new(CaptureSink::default()))
    }

    fn noop(_: &Session, _: &Command, _: &mut CommandArgs) -> HandlerResult {
        Ok(())
    }

    fn run(root: &Command, session: &Session, line: &str) -> Result<(), DispatchError> {
        let mut args = CommandArgs::new(line).unwrap();
        root.execute(session, &mut args)
    }

    #[test]
    fn test_dispatch_runs_handler_with_cursor_past_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_handler = Arc::clone(&seen);

        let mut root = Command::root();
        root.add_command(Command::new("echo", move |_, cmd, args| {
            seen_by_handler
                .lock()
                .unwrap()
                .push(format!("{}:{}", cmd.name(), args.join_remaining(" ")));
            Ok(())
        }))
        .unwrap();

        let session = session_at(ExecLevel::User);
        run(&root, &session, "echo hello world").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["echo:hello world"]);
    }

    #[test]
    fn test_nested_dispatch() {
        let mut user = Command::group("user").level(ExecLevel::Admin);
        user.add_command(
            Command::new("add", |session, _, args| {
                session.result(format!("added {}", args.peel_off(0)));
                Ok(())
            })
            .level(ExecLevel::Admin),
        )
        .unwrap();
        let mut root = Command::root();
        root.add_command(user).unwrap();

        let session = session_at(ExecLevel::SuperAdmin);
        run(&root, &session, "user add bob").unwrap();
        assert_eq!(session.pending_output(), "added bob\n");
    }

    #[test]
    fn test_permission_denied_names_full_path() {
        let mut user = Command::group("user").level(ExecLevel::Admin);
        user.add_command(Command::new("add", noop).level(ExecLevel::SuperAdmin))
            .unwrap();
        let mut root = Command::root();
        root.add_command(user).unwrap();

        let session = session_at(ExecLevel::Admin);
        match run(&root, &session, "user add bob") {
            Err(DispatchError::PermissionDenied { command, required, actual }) => {
                assert_eq!(command, "user add");
                assert_eq!(required, ExecLevel::SuperAdmin);
                assert_eq!(actual, ExecLevel::Admin);
            }
            other => panic!("expected permission denied, got {:?}", other),
        }
    }

    #[test]
    fn test_denied_at_parent_never_reaches_child() {
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let mut admin = Command::group("admin").level(ExecLevel::Admin);
        admin
            .add_command(
                Command::new("wipe", move |_, _, _| {
                    *flag.lock().unwrap() = true;
                    Ok(())
                })
                .level(ExecLevel::Admin),
            )
            .unwrap();
        let mut root = Command::root();
        root.add_command(admin).unwrap();

        let session = session_at(ExecLevel::User);
        assert!(matches!(
            run(&root, &session, "admin wipe"),
            Err(DispatchError::PermissionDenied { .. })
        ));
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn test_unknown_command_with_suggestions() {
        let mut root = Command::root();
        root.add_commands([Command::new("status", noop), Command::new("stats", noop)])
            .unwrap();

        let session = session_at(ExecLevel::User);
        match run(&root, &session, "statsu") {
            Err(DispatchError::UnknownCommand { name, suggestions }) => {
                assert_eq!(name, "statsu");
                assert_eq!(suggestions, vec!["stats", "status"]);
            }
            other => panic!("expected unknown command, got {:?}", other),
        }
    }

    #[test]
    fn test_suggestions_hide_commands_above_caller() {
        let mut root = Command::root();
        root.add_commands([
            Command::new("status", noop),
            Command::new("statz", noop).level(ExecLevel::SuperAdmin),
        ])
        .unwrap();

        let session = session_at(ExecLevel::User);
        match run(&root, &session, "statu") {
            Err(DispatchError::UnknownCommand { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["status"]);
            }
            other => panic!("expected unknown command, got {:?}", other),
        }
    }

    #[test]
    fn test_group_without_handler_lists_children() {
        let mut user = Command::group("user");
        user.add_commands([
            Command::new("add", noop).description("Add a user"),
            Command::new("purge", noop).level(ExecLevel::SuperAdmin),
        ])
        .unwrap();
        let mut root = Command::root();
        root.add_command(user).unwrap();

        let session = session_at(ExecLevel::User);
        run(&root, &session, "user").unwrap();
        let out = session.pending_output();
        assert!(out.contains("Available sub-commands of 'user'"));
        assert!(out.contains("add  Add a user"));
        assert!(!out.contains("purge"));
    }

    #[test]
    fn test_group_with_unknown_subcommand() {
        let mut user = Command::group("user");
        user.add_command(Command::new("add", noop)).unwrap();
        let mut root = Command::root();
        root.add_command(user).unwrap();

        let session = session_at(ExecLevel::User);
        match run(&root, &session, "user ad") {
            Err(DispatchError::UnknownCommand { name, suggestions }) => {
                assert_eq!(name, "user ad");
                assert_eq!(suggestions, vec!["add"]);
            }
            other => panic!("expected unknown command, got {:?}", other),
        }
    }

    #[test]
    fn test_handler_with_children_runs_when_no_child_matches() {
        let mut config = Command::new("config", |session, _, args| {
            session.result(format!("show {}", args.join_remaining(" ")));
            Ok(())
        });
        config.add_command(Command::new("set", noop)).unwrap();
        let mut root = Command::root();
        root.add_command(config).unwrap();

        let session = session_at(ExecLevel::User);
        run(&root, &session, "config prompt").unwrap();
        assert_eq!(session.pending_output(), "show prompt\n");
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let mut root = Command::root();
        root.add_command(Command::new("fail", |_, _, _| anyhow::bail!("disk on fire")))
            .unwrap();

        let session = session_at(ExecLevel::User);
        let err = run(&root, &session, "fail").unwrap_err();
        assert_eq!(err.to_string(), "fail: disk on fire");
        assert!(err.help_usage().is_none());
    }

    #[test]
    fn test_help_usage_is_recognised() {
        let mut root = Command::root();
        root.add_command(Command::new("lines", |_, _, args| {
            args.flag_int("cnt", 5, "number of lines")?;
            args.parse()?;
            Ok(())
        }))
        .unwrap();

        let session = session_at(ExecLevel::User);
        let err = run(&root, &session, "lines --help").unwrap_err();
        assert!(err.help_usage().unwrap().contains("--cnt"));
    }

    #[test]
    fn test_empty_line_is_a_no_op() {
        let root = Command::root();
        let session = session_at(ExecLevel::All);
        run(&root, &session, "   ").unwrap();
        assert_eq!(session.pending_output(), "");
    }

    #[test]
    fn test_all_level_commands_reach_everyone() {
        let mut root = Command::root();
        root.add_command(Command::new("help", noop).level(ExecLevel::All))
            .unwrap();
        let session = session_at(ExecLevel::All);
        run(&root, &session, "help").unwrap();
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut root = Command::root();
        root.add_command(Command::new("status", noop)).unwrap();
        assert_eq!(
            root.add_command(Command::new("status", noop)),
            Err(RegistrationError::DuplicateName {
                parent: "<root>".into(),
                name: "status".into(),
            })
        );
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut root = Command::root();
        for name in ["", "--help", "two words"] {
            assert!(matches!(
                root.add_command(Command::new(name, noop)),
                Err(RegistrationError::InvalidName { .. })
            ));
        }
    }

    #[test]
    fn test_weaker_child_rejected() {
        let mut admin = Command::group("admin").level(ExecLevel::Admin);
        let err = admin
            .add_command(Command::new("peek", noop).level(ExecLevel::User))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::LevelWeakerThanParent { .. }));
    }

    #[test]
    fn test_level_checked_through_whole_subtree() {
        // grandchild was fine under a User group, but the group is later raised
        let mut inner = Command::group("inner");
        inner.add_command(Command::new("leaf", noop)).unwrap();

        let mut outer = Command::group("outer").level(ExecLevel::Admin);
        let err = outer.add_command(inner.level(ExecLevel::Admin)).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::LevelWeakerThanParent {
                parent: "inner".into(),
                parent_level: ExecLevel::Admin,
                command: "leaf".into(),
                level: ExecLevel::User,
            }
        );
    }

    #[test]
    fn test_find_and_visible_children() {
        let root = Command::root()
            .subcommand(Command::new("status", noop))
            .unwrap()
            .subcommand(Command::new("reboot", noop).level(ExecLevel::SuperAdmin))
            .unwrap();

        assert!(root.find(&["status"]).is_some());
        assert!(root.find(&["status", "deep"]).is_none());
        assert_eq!(root.visible_children(ExecLevel::User).count(), 1);
        assert_eq!(root.visible_children(ExecLevel::SuperAdmin).count(), 2);
    }
}
