//! Terminal shell example.
//!
//! Runs one authenticated session on stdin/stdout, as an operator would on a
//! server console. The key file holds the operator's OpenSSH public key.
//!
//! Run with:
//! `cargo run --example terminal --features full -- --user ops --key ~/.ssh/id_ed25519.pub`
//!
//! Commands:
//! - `help` - List available commands
//! - `echo hello "quoted words"` - Print the arguments back
//! - `lines --cnt 3` - Print some lines
//! - `tldr` - Think for a while behind a spinner
//! - `admintest` - Only for admins
//! - `logs --n 20` - Show recent server logs
//! - `namespace testing` - A nested command
//! - `exit` - Close the session

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rsh_console::logging::{self, LogBuffer};
use rsh_console::prelude::*;
use rsh_console::{ShellConfigFile, StdioConnection, UserEntry};

#[derive(Parser)]
#[command(name = "rsh-terminal")]
#[command(about = "Role-gated shell on the local terminal")]
struct Cli {
    /// Identity to log in as
    #[arg(short, long, default_value = "ops")]
    user: String,

    /// OpenSSH public key presented for the login
    #[arg(short, long)]
    key: PathBuf,

    /// Config file with options, users and history
    #[arg(short, long, default_value = rsh_console::persist::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let logs = Arc::new(logging::init(&cli.log)?);

    let key_line = fs::read_to_string(&cli.key)
        .with_context(|| format!("reading key file {}", cli.key.display()))?;
    let key = AuthorizedKey::from_openssh(key_line.trim())?;

    let mut config = ShellConfigFile::load_or_default(&cli.config);
    if config.users.is_empty() {
        info!(
            user = %cli.user,
            fingerprint = key.fingerprint(),
            "no users configured, adding operator"
        );
        config.users.push(UserEntry {
            name: cli.user.clone(),
            level: ExecLevel::SuperAdmin,
            authorized_keys: vec![key_line.trim().to_string()],
            history: Vec::new(),
        });
    }

    let users = Arc::new(config.build_registry()?);
    let server = ShellServer::new(demo_root(logs)?, Arc::clone(&users))
        .options(config.session_options());

    println!("=== Terminal Shell Example ===");
    println!("Type commands and press Enter. Type 'exit' to leave.");
    println!();

    let conn = StdioConnection::new(cli.user.as_str(), key.wire().to_vec());
    let end = server.handle_connection(Box::new(conn))?;
    info!(?end, "session ended");

    config.extract_users(&users);
    config.save(&cli.config)?;
    Ok(())
}

fn demo_root(logs: Arc<LogBuffer>) -> Result<Command> {
    let mut root = builtins::default_root()?;

    root.add_command(
        Command::new("echo", |session, _cmd, args| {
            session.result(args.join_remaining(" "));
            Ok(())
        })
        .description("Print the arguments back"),
    )?;

    root.add_command(
        Command::new("debug", |session, _cmd, args| {
            session.debug(args.debug_info());
            Ok(())
        })
        .description("Show how the line was tokenized"),
    )?;

    root.add_command(
        Command::new("lines", |session, _cmd, args| {
            args.flag_int("cnt", 5, "number of lines")?;
            args.parse()?;
            for i in 0..args.int_flag("cnt").unwrap_or(5) {
                session.result(format!("line {}", i));
            }
            Ok(())
        })
        .description("Print some lines [--cnt N]"),
    )?;

    root.add_command(
        Command::new("tldr", |session, _cmd, _args| {
            let spinner = Spinner::start(session, "thinking");
            thread::sleep(Duration::from_secs(2));
            spinner.stop();
            session.type_out("too long; didn't run", Duration::from_millis(20))?;
            Ok(())
        })
        .description("Think for a while"),
    )?;

    root.add_command(
        Command::new("admintest", |session, _cmd, _args| {
            session.result(format!("hello, admin {}", session.identity()));
            Ok(())
        })
        .description("Only admins may run this")
        .level(ExecLevel::Admin),
    )?;

    root.add_command(
        Command::new("logs", move |session, _cmd, args| {
            args.flag_int("n", 10, "number of messages")?;
            args.parse()?;
            let n = args.int_flag("n").unwrap_or(10).max(0) as usize;
            for message in logs.recent(n) {
                session.result(message.to_string());
            }
            Ok(())
        })
        .description("Show recent server logs [--n N]")
        .level(ExecLevel::Admin),
    )?;

    let namespace = Command::group("namespace")
        .description("A group of nested commands")
        .subcommand(
            Command::new("testing", |session, _cmd, _args| {
                session.result("nested command ran");
                Ok(())
            })
            .description("Run a nested command"),
        )?;
    root.add_command(namespace)?;

    Ok(root)
}
