//! Styled output lines written back to a session.

/// Kind of output line, which decides its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLevel {
    /// Debug information (gray).
    Debug,
    /// General information (white).
    #[default]
    Info,
    /// Warning (yellow).
    Warn,
    /// Error (red).
    Error,
    /// Successful command result (green).
    Result,
}

impl OutputLevel {
    /// ANSI escape that starts this level's color.
    pub fn ansi(self) -> &'static str {
        match self {
            OutputLevel::Debug => "\x1b[90m",
            OutputLevel::Info => "\x1b[0m",
            OutputLevel::Warn => "\x1b[33m",
            OutputLevel::Error => "\x1b[31m",
            OutputLevel::Result => "\x1b[32m",
        }
    }
}

/// Format `message` as a single output line.
///
/// With `colored` set, the line is wrapped in the level's ANSI color and a reset.
pub fn styled_line(level: OutputLevel, message: &str, colored: bool) -> String {
    let message = message.strip_suffix('\n').unwrap_or(message);
    if colored {
        format!("{}{}\x1b[0m\n", level.ansi(), message)
    } else {
        format!("{}\n", message)
    }
}

/// Escape sequence that resets the remote terminal.
pub const CLEAR_SCREEN: &str = "\x1bc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line() {
        assert_eq!(styled_line(OutputLevel::Error, "boom", false), "boom\n");
        assert_eq!(styled_line(OutputLevel::Info, "one\n", false), "one\n");
    }

    #[test]
    fn test_colored_line() {
        assert_eq!(
            styled_line(OutputLevel::Error, "boom", true),
            "\x1b[31mboom\x1b[0m\n"
        );
    }
}
