//! Windows (`cmd.exe`-style) grammar.
//!
//! No chain or pipe support is modeled at all: any shell metacharacter
//! anywhere in the string -- quoted or not -- is an immediate failure.
//! Tokenization only toggles on `"` (no backslash escaping) and splits
//! on whitespace outside quotes.

use super::ParseFailure;

/// Metacharacters that make a Windows command unanalyzable.
const REJECTED: &[char] = &['&', '|', '<', '>', '^', '(', ')', '%', '!'];

/// Tokenize a Windows command line into argv.
pub(super) fn tokenize(raw: &str) -> Result<Vec<String>, ParseFailure> {
    for c in raw.chars() {
        if REJECTED.contains(&c) {
            return Err(ParseFailure::unsupported(format!(
                "unsupported windows shell token: '{c}'"
            )));
        }
        if c == '\n' || c == '\r' {
            return Err(ParseFailure::unsupported(
                "unsupported windows shell token: newline",
            ));
        }
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_quotes = false;

    for c in raw.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            has_token = true;
            continue;
        }
        if !in_quotes && c.is_whitespace() {
            if has_token {
                tokens.push(std::mem::take(&mut current));
                has_token = false;
            }
            continue;
        }
        current.push(c);
        has_token = true;
    }

    if in_quotes {
        return Err(ParseFailure::parse("unmatched quote"));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}
