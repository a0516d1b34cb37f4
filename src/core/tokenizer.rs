//! Simple tokenizer for shell input lines.
//!
//! Splits on whitespace with support for double-quoted strings.

use thiserror::Error;

/// Tokenize error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A double quote was opened but never closed.
    #[error("unterminated quote at position {position}")]
    UnterminatedQuote { position: usize },
}

/// Tokenize a line into its individual tokens.
///
/// # Syntax
///
/// - Tokens are separated by runs of whitespace
/// - A double-quoted span preserves whitespace; the quotes are stripped
/// - Inside quotes, `\"` and `\\` are unescaped
/// - Quoted spans glue onto adjacent characters: `--msg="a b"` is one token
///
/// A blank line produces no tokens.
///
/// # Examples
///
/// ```
/// use rsh_console::core::tokenize;
///
/// let tokens = tokenize("echo hello world").unwrap();
/// assert_eq!(tokens, vec!["echo", "hello", "world"]);
///
/// let tokens = tokenize(r#"say "hello world""#).unwrap();
/// assert_eq!(tokens, vec!["say", "hello world"]);
///
/// assert!(tokenize(r#"say "oops"#).is_err());
/// ```
pub fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // A token is open once any character (or an empty "") has been seen.
    let mut open = false;
    let mut chars = input.char_indices();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if open {
                    tokens.push(std::mem::take(&mut current));
                    open = false;
                }
            }

            '"' => {
                open = true;
                let mut closed = false;

                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, esc @ ('"' | '\\'))) => current.push(esc),
                            Some((_, other)) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(ch),
                    }
                }

                if !closed {
                    return Err(ParseError::UnterminatedQuote { position: start });
                }
            }

            _ => {
                open = true;
                current.push(c);
            }
        }
    }

    if open {
        tokens.push(current);
    }

    Ok(tokens)
}
