//! Arguments passed to a command handler.
//!
//! [`CommandArgs`] keeps the raw line, its tokens and a cursor. The dispatcher
//! advances the cursor past every command name it resolves, so a handler sees
//! its own arguments starting at `peel_off(0)`.

use thiserror::Error;

use super::flags::{Flag, FlagKind, FlagSet, FlagValue};
use super::tokenizer::{ParseError, tokenize};

/// Errors raised while registering or parsing flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    /// A flag with this name was already registered.
    #[error("flag redefined: --{name}")]
    DuplicateFlag { name: String },

    /// Unknown flag, missing value, or a value of the wrong type.
    #[error("invalid flag --{flag}: {reason}")]
    FlagSyntax { flag: String, reason: String },

    /// `parse()` already ran; flags can be neither registered nor parsed again.
    #[error("arguments have already been parsed")]
    AlreadyParsed,

    /// `--help` was given and the command did not define its own help flag.
    #[error("usage:\n{usage}")]
    HelpRequested { usage: String },
}

/// Parsed input line with a consumption cursor and a lazily defined flag set.
///
/// # Examples
///
/// ```
/// use rsh_console::core::CommandArgs;
///
/// let mut args = CommandArgs::new("lines --cnt 3 extra").unwrap();
/// args.advance(1); // the dispatcher consumed "lines"
///
/// args.flag_int("cnt", 5, "number of lines").unwrap();
/// args.parse().unwrap();
///
/// assert_eq!(args.int_flag("cnt"), Some(3));
/// assert_eq!(args.peel_off(0), "extra");
/// assert_eq!(args.peel_off(7), "");
/// ```
#[derive(Debug, Clone)]
pub struct CommandArgs {
    raw: String,
    tokens: Vec<String>,
    cursor: usize,
    flags: FlagSet,
    parsed: bool,
}

impl CommandArgs {
    /// Tokenize `raw` into a new argument set with the cursor at the start.
    pub fn new(raw: impl Into<String>) -> Result<Self, ParseError> {
        let raw = raw.into();
        let tokens = tokenize(&raw)?;
        Ok(Self {
            raw,
            tokens,
            cursor: 0,
            flags: FlagSet::new(),
            parsed: false,
        })
    }

    /// Get the raw input line.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All tokens, including the ones already consumed.
    ///
    /// After [`parse`](Self::parse), the tokens past the cursor are the positionals.
    #[inline]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of tokens consumed so far.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Tokens from the cursor onward.
    #[inline]
    pub fn remaining(&self) -> &[String] {
        &self.tokens[self.cursor.min(self.tokens.len())..]
    }

    /// Positional arguments: the remaining tokens, with flags removed once parsed.
    #[inline]
    pub fn args(&self) -> &[String] {
        self.remaining()
    }

    /// Check if nothing is left past the cursor.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining().is_empty()
    }

    /// Token at `cursor + offset`, or `""` when out of range.
    pub fn peel_off(&self, offset: usize) -> &str {
        self.cursor
            .checked_add(offset)
            .and_then(|i| self.tokens.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Consume `n` tokens. The cursor never moves past the end.
    pub fn advance(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_add(n).min(self.tokens.len());
    }

    /// Join the remaining tokens with a separator.
    pub fn join_remaining(&self, separator: &str) -> String {
        self.remaining().join(separator)
    }

    /// Register a flag; the kind is taken from `default`.
    pub fn register_flag(
        &mut self,
        name: &str,
        default: impl Into<FlagValue>,
        help: &str,
    ) -> Result<(), ArgsError> {
        if self.parsed {
            return Err(ArgsError::AlreadyParsed);
        }
        self.flags.register(name, default.into(), help)
    }

    /// Register a string flag.
    pub fn flag_str(&mut self, name: &str, default: &str, help: &str) -> Result<(), ArgsError> {
        self.register_flag(name, default, help)
    }

    /// Register an integer flag.
    pub fn flag_int(&mut self, name: &str, default: i64, help: &str) -> Result<(), ArgsError> {
        self.register_flag(name, default, help)
    }

    /// Register a boolean flag.
    pub fn flag_bool(&mut self, name: &str, default: bool, help: &str) -> Result<(), ArgsError> {
        self.register_flag(name, default, help)
    }

    /// Parse flags out of the tokens past the cursor.
    ///
    /// Accepted forms are `--name value`, `--name=value`, and `--name` for
    /// booleans. `--` ends flag parsing. Everything else is positional and stays
    /// reachable through [`args`](Self::args) and [`peel_off`](Self::peel_off).
    pub fn parse(&mut self) -> Result<(), ArgsError> {
        if self.parsed {
            return Err(ArgsError::AlreadyParsed);
        }
        self.parsed = true;

        let start = self.cursor.min(self.tokens.len());
        let mut rest = self.tokens[start..].to_vec().into_iter();
        let mut positionals = Vec::new();

        while let Some(token) = rest.next() {
            if token == "--" {
                positionals.extend(rest.by_ref());
                break;
            }

            let Some(body) = token.strip_prefix("--") else {
                positionals.push(token);
                continue;
            };

            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };

            if name.is_empty() {
                return Err(ArgsError::FlagSyntax {
                    flag: body.to_string(),
                    reason: "bad flag syntax".to_string(),
                });
            }

            if name == "help" && !self.flags.contains("help") {
                return Err(ArgsError::HelpRequested {
                    usage: self.usage(),
                });
            }

            let kind = match self.flags.get(name) {
                Some(flag) => flag.kind(),
                None => {
                    return Err(ArgsError::FlagSyntax {
                        flag: name.to_string(),
                        reason: "flag provided but not defined".to_string(),
                    });
                }
            };

            match (kind, inline) {
                (_, Some(value)) => self.flags.set(name, value)?,
                (FlagKind::Bool, None) => self.flags.set(name, "true")?,
                (_, None) => match rest.next() {
                    Some(value) => self.flags.set(name, &value)?,
                    None => {
                        return Err(ArgsError::FlagSyntax {
                            flag: name.to_string(),
                            reason: "flag needs an argument".to_string(),
                        });
                    }
                },
            }
        }

        self.tokens.truncate(start);
        self.tokens.extend(positionals);
        Ok(())
    }

    /// Check whether [`parse`](Self::parse) has run.
    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Look up a registered flag.
    pub fn flag(&self, name: &str) -> Option<&Flag> {
        self.flags.get(name)
    }

    /// Value of a string flag.
    pub fn str_flag(&self, name: &str) -> Option<&str> {
        match self.flags.get(name)?.value() {
            FlagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Value of an integer flag.
    pub fn int_flag(&self, name: &str) -> Option<i64> {
        match self.flags.get(name)?.value() {
            FlagValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Value of a boolean flag.
    pub fn bool_flag(&self, name: &str) -> Option<bool> {
        match self.flags.get(name)?.value() {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Help text for the registered flags.
    pub fn usage(&self) -> String {
        let consumed = self.tokens[..self.cursor.min(self.tokens.len())].join(" ");
        if self.flags.is_empty() {
            format!("{} takes no flags\n", consumed)
        } else {
            format!("{} [flags]\n{}", consumed, self.flags.usage())
        }
    }

    /// Diagnostic dump of the raw line, tokens, cursor and flag state.
    pub fn debug_info(&self) -> String {
        let mut out = format!(
            "raw: {:?}\ntokens: [{}]\ncursor: {}\nremaining: [{}]\nparsed: {}\n",
            self.raw,
            self.tokens.join(" | "),
            self.cursor,
            self.remaining().join(" | "),
            self.parsed,
        );
        for flag in self.flags.iter() {
            let marker = if flag.is_set() { "" } else { " (default)" };
            out.push_str(&format!("flag --{} = {}{}\n", flag.name(), flag.value(), marker));
        }
        out
    }
}
