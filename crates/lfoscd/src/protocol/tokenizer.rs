//! Splits free-form argument text into typed arguments.
//!
//! Tokens are separated by whitespace outside double-quoted spans. Inside a
//! quoted span a backslash escapes the next character, so `\"` does not close
//! the span. Surrounding quotes are removed before typing. Typing tries a
//! base-10 `i32`, then a finite decimal `f32`, and otherwise keeps the text
//! unchanged. An unterminated quote swallows the rest of the input as one
//! text argument.

use super::Argument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Idle,
    Bare,
    Quoted,
    Escaped,
}

/// Tokenizes `raw` into typed arguments.
#[must_use]
pub fn tokenize(raw: &str) -> Vec<Argument> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut scan = Scan::Idle;

    for ch in raw.chars() {
        scan = match (scan, ch) {
            (Scan::Idle, ch) if ch.is_whitespace() => Scan::Idle,
            (Scan::Idle | Scan::Bare, '"') => {
                current.push(ch);
                Scan::Quoted
            }
            (Scan::Bare, ch) if ch.is_whitespace() => {
                arguments.push(classify(strip_quotes(&current)));
                current.clear();
                Scan::Idle
            }
            (Scan::Idle | Scan::Bare, ch) => {
                current.push(ch);
                Scan::Bare
            }
            (Scan::Quoted, '\\') => {
                current.push(ch);
                Scan::Escaped
            }
            (Scan::Quoted, '"') => {
                current.push(ch);
                Scan::Bare
            }
            (Scan::Quoted | Scan::Escaped, ch) => {
                current.push(ch);
                Scan::Quoted
            }
        };
    }

    match scan {
        Scan::Idle => {}
        Scan::Bare => arguments.push(classify(strip_quotes(&current))),
        Scan::Quoted | Scan::Escaped => {
            let rest = current.trim_end();
            let rest = rest.strip_prefix('"').unwrap_or(rest);
            arguments.push(Argument::Text(rest.to_owned()));
        }
    }
    arguments
}

/// Types a single token: integer, then decimal, then text.
#[must_use]
pub fn classify(token: &str) -> Argument {
    if let Ok(value) = token.parse::<i32>() {
        return Argument::Int(value);
    }
    if looks_decimal(token)
        && let Ok(value) = token.parse::<f32>()
        && value.is_finite()
    {
        return Argument::Float(value);
    }
    Argument::Text(token.to_owned())
}

fn looks_decimal(token: &str) -> bool {
    token.chars().any(|ch| ch.is_ascii_digit())
        && token
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.' | 'e' | 'E'))
}

fn strip_quotes(token: &str) -> &str {
    let inner = token.strip_prefix('"').unwrap_or(token);
    match inner.strip_suffix('"') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => inner,
    }
}
