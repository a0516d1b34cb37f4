//! Commands every shell gets: `help`, `history`, `whoami`, `cls` and `exit`.
//!
//! All of them are open to every authenticated user.

use anyhow::bail;

use crate::core::{
    CLEAR_SCREEN, Command, CommandArgs, ExecLevel, HandlerResult, RegistrationError, Session,
};

/// The built-in commands, ready to attach to a root.
pub fn commands() -> Vec<Command> {
    vec![
        Command::new("help", help)
            .description("List commands, or describe one: help [command...]")
            .level(ExecLevel::All),
        Command::new("history", history)
            .description("Show executed commands [--session] [--clear]")
            .level(ExecLevel::All),
        Command::new("whoami", whoami)
            .description("Show who you are logged in as")
            .level(ExecLevel::All),
        Command::new("cls", cls)
            .description("Clear the screen")
            .level(ExecLevel::All),
        Command::new("exit", exit)
            .description("Close this session")
            .level(ExecLevel::All),
    ]
}

/// Attach the built-in commands to `root`.
pub fn register(root: &mut Command) -> Result<(), RegistrationError> {
    root.add_commands(commands())
}

/// A fresh root holding only the built-in commands.
pub fn default_root() -> Result<Command, RegistrationError> {
    let mut root = Command::root();
    register(&mut root)?;
    Ok(root)
}

fn help(session: &Session, _cmd: &Command, args: &mut CommandArgs) -> HandlerResult {
    let Some(root) = session.commands() else {
        bail!("no command tree attached to this session");
    };
    let level = session.level();

    if args.is_empty() {
        session.info("Available commands:");
        session.write_str(&root.listing(level));
        return Ok(());
    }

    let path: Vec<&str> = args.remaining().iter().map(String::as_str).collect();
    let mut node = root;
    for name in &path {
        match node.child(name) {
            Some(child) if level.satisfies(child.get_level()) => node = child,
            _ => bail!("no such command: {}", path.join(" ")),
        }
    }

    let description = match node.get_description() {
        "" => "(no description)",
        text => text,
    };
    session.info(format!("{} - {}", path.join(" "), description));
    session.info(format!("requires: {}", node.get_level()));
    if !node.children().is_empty() {
        session.info("sub-commands:");
        session.write_str(&node.listing(level));
    }
    Ok(())
}

fn history(session: &Session, _cmd: &Command, args: &mut CommandArgs) -> HandlerResult {
    args.flag_bool("session", false, "only show this session's commands")?;
    args.flag_bool("clear", false, "forget the history instead of showing it")?;
    args.parse()?;

    let session_only = args.bool_flag("session").unwrap_or(false);
    if args.bool_flag("clear").unwrap_or(false) {
        let removed = if session_only {
            session.clear_session_history()
        } else {
            session.clear_session_history();
            session.users().clear_history(session.identity()).unwrap_or(0)
        };
        session.result(format!("Cleared {} entries", removed));
        return Ok(());
    }

    let entries = if session_only {
        session.session_history()
    } else {
        session.history()
    };
    if entries.is_empty() {
        session.info("History is empty");
        return Ok(());
    }

    session.info(format!("History[{}]:", entries.len()));
    for (i, line) in entries.iter().enumerate() {
        session.info(format!("{:>4}  {}", i + 1, line));
    }
    Ok(())
}

fn whoami(session: &Session, _cmd: &Command, _args: &mut CommandArgs) -> HandlerResult {
    session.info(format!("username:   {}", session.identity()));
    session.info(format!("exec level: {}", session.level()));
    session.info(format!("session:    {} from {}", session.id(), session.peer()));
    Ok(())
}

fn cls(session: &Session, _cmd: &Command, _args: &mut CommandArgs) -> HandlerResult {
    session.write_str(CLEAR_SCREEN);
    Ok(())
}

fn exit(session: &Session, _cmd: &Command, _args: &mut CommandArgs) -> HandlerResult {
    session.result("Bye bye 👋");
    session.close();
    Ok(())
}
