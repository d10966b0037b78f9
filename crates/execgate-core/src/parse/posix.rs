//! POSIX-like grammar: chain splitting, pipeline splitting, and a
//! character-scanning tokenizer with heredoc support.
//!
//! The chain splitter runs first on the whole string and partitions on
//! `&&` / `;` outside quotes. `||` and bare `&` are recognized there so
//! they are never misread downstream, and rejected outright: no
//! short-circuit or background semantics are modeled. The pipeline
//! splitter then divides each part on `|`, and the tokenizer turns each
//! segment into argv. A failure at any layer aborts the whole analysis.

use super::ParseFailure;

/// Partition a command on chain operators outside quotes.
///
/// Returns the ordered chain parts. Dangling or leading operators and
/// empty parts are failures, never implicit no-ops.
pub(super) fn split_chains(input: &str) -> Result<Vec<String>, ParseFailure> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }

        if in_double {
            if c == '\\' && i + 1 < chars.len() {
                current.push(c);
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            current.push(c);
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                current.push(c);
                if i + 1 < chars.len() {
                    current.push(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            '\'' => {
                in_single = true;
                current.push(c);
                i += 1;
            }
            '"' => {
                in_double = true;
                current.push(c);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    if current.trim().is_empty() {
                        return Err(ParseFailure::parse("missing command before '&&'"));
                    }
                    parts.push(std::mem::take(&mut current));
                    i += 2;
                } else {
                    return Err(ParseFailure::unsupported(
                        "background execution ('&') is not supported",
                    ));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    return Err(ParseFailure::unsupported("'||' is not supported"));
                }
                if chars.get(i + 1) == Some(&'&') {
                    return Err(ParseFailure::unsupported("'|&' is not supported"));
                }
                current.push(c);
                i += 1;
            }
            ';' => {
                if current.trim().is_empty() {
                    return Err(ParseFailure::parse("missing command before ';'"));
                }
                parts.push(std::mem::take(&mut current));
                i += 1;
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    if current.trim().is_empty() {
        if parts.is_empty() {
            return Err(ParseFailure::parse("empty command"));
        }
        return Err(ParseFailure::parse("dangling chain operator"));
    }
    parts.push(current);
    Ok(parts)
}

/// Divide one chain part on `|` outside quotes.
pub(super) fn split_pipeline(part: &str) -> Result<Vec<String>, ParseFailure> {
    let chars: Vec<char> = part.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_single {
            current.push(c);
            if c == '\'' {
                in_single = false;
            }
            i += 1;
            continue;
        }

        if in_double {
            if c == '\\' && i + 1 < chars.len() {
                current.push(c);
                current.push(chars[i + 1]);
                i += 2;
                continue;
            }
            current.push(c);
            if c == '"' {
                in_double = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                current.push(c);
                if i + 1 < chars.len() {
                    current.push(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            '\'' => {
                in_single = true;
                current.push(c);
                i += 1;
            }
            '"' => {
                in_double = true;
                current.push(c);
                i += 1;
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    return Err(ParseFailure::unsupported("'||' is not supported"));
                }
                if chars.get(i + 1) == Some(&'&') {
                    return Err(ParseFailure::unsupported("'|&' is not supported"));
                }
                if current.trim().is_empty() {
                    return Err(ParseFailure::parse("empty pipeline segment"));
                }
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
            '&' => {
                return Err(ParseFailure::unsupported(
                    "background execution ('&') is not supported",
                ));
            }
            ';' => {
                return Err(ParseFailure::unsupported("';' is not supported here"));
            }
            _ => {
                current.push(c);
                i += 1;
            }
        }
    }

    if current.trim().is_empty() {
        if segments.is_empty() {
            return Err(ParseFailure::parse("empty command"));
        }
        return Err(ParseFailure::parse("empty pipeline segment"));
    }
    segments.push(current);
    Ok(segments)
}

/// Tokenize one pipeline segment into argv.
///
/// States: normal, single quote, double quote, plus pending heredocs
/// whose bodies are skipped verbatim once a newline is reached.
pub(super) fn tokenize(segment: &str) -> Result<Vec<String>, ParseFailure> {
    let chars: Vec<char> = segment.chars().collect();
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    // Tracks whether `current` denotes a token even when empty ('' / "").
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut pending: Vec<(String, bool)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_single {
            if c == '\'' {
                in_single = false;
            } else {
                current.push(c);
            }
            i += 1;
            continue;
        }

        if in_double {
            match c {
                '\\' => match chars.get(i + 1) {
                    // Only \ " $ ` and newline are escapable inside
                    // double quotes; the backslash is retained otherwise.
                    Some('\\') | Some('"') | Some('$') | Some('`') => {
                        current.push(chars[i + 1]);
                        i += 2;
                    }
                    Some('\n') => {
                        i += 2;
                    }
                    Some(other) => {
                        current.push('\\');
                        current.push(*other);
                        i += 2;
                    }
                    None => return Err(ParseFailure::parse("unterminated quote")),
                },
                '$' if chars.get(i + 1) == Some(&'(') => {
                    return Err(ParseFailure::unsupported(
                        "command substitution '$(' is not supported",
                    ));
                }
                '`' => {
                    return Err(ParseFailure::unsupported(
                        "backtick command substitution is not supported",
                    ));
                }
                '\n' => {
                    return Err(ParseFailure::unsupported(
                        "raw newline inside double quotes is not supported",
                    ));
                }
                '"' => {
                    in_double = false;
                    i += 1;
                }
                _ => {
                    current.push(c);
                    i += 1;
                }
            }
            continue;
        }

        match c {
            '\\' => match chars.get(i + 1) {
                Some(next) => {
                    current.push(*next);
                    has_token = true;
                    i += 2;
                }
                None => return Err(ParseFailure::parse("trailing backslash")),
            },
            '\'' => {
                in_single = true;
                has_token = true;
                i += 1;
            }
            '"' => {
                in_double = true;
                has_token = true;
                i += 1;
            }
            '`' => {
                return Err(ParseFailure::unsupported(
                    "backtick command substitution is not supported",
                ));
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                return Err(ParseFailure::unsupported(
                    "command substitution '$(' is not supported",
                ));
            }
            '(' | ')' => {
                return Err(ParseFailure::unsupported(format!("'{c}' is not supported")));
            }
            '>' => {
                return Err(ParseFailure::unsupported(
                    "redirection '>' is not supported",
                ));
            }
            '<' => {
                if chars.get(i + 1) == Some(&'<') {
                    i += 2;
                    let strip_tabs = chars.get(i) == Some(&'-');
                    if strip_tabs {
                        i += 1;
                    }
                    while matches!(chars.get(i), Some(' ') | Some('\t')) {
                        i += 1;
                    }
                    let (delim, next) = read_heredoc_delimiter(&chars, i)?;
                    if delim.is_empty() {
                        return Err(ParseFailure::parse("heredoc missing delimiter"));
                    }
                    pending.push((delim, strip_tabs));
                    i = next;
                } else {
                    return Err(ParseFailure::unsupported(
                        "redirection '<' is not supported",
                    ));
                }
            }
            '&' | ';' | '|' => {
                return Err(ParseFailure::unsupported(format!(
                    "'{c}' is not supported here"
                )));
            }
            '\n' => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
                if pending.is_empty() {
                    return Err(ParseFailure::unsupported(
                        "raw newline outside heredoc is not supported",
                    ));
                }
                i += 1;
                for (delim, strip_tabs) in pending.drain(..) {
                    i = consume_heredoc_body(&chars, i, &delim, strip_tabs)?;
                }
            }
            ' ' | '\t' => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
                i += 1;
            }
            _ => {
                current.push(c);
                has_token = true;
                i += 1;
            }
        }
    }

    if in_single || in_double {
        return Err(ParseFailure::parse("unterminated quote"));
    }
    if let Some((delim, _)) = pending.first() {
        return Err(ParseFailure::parse(format!(
            "unterminated heredoc (missing '{delim}')"
        )));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Read a heredoc delimiter word, honoring quoting. Quoted delimiters
/// would disable expansion in a real shell; irrelevant here since no
/// expansion is performed, but the quotes still do not become part of
/// the delimiter text.
fn read_heredoc_delimiter(
    chars: &[char],
    mut i: usize,
) -> Result<(String, usize), ParseFailure> {
    let mut delim = String::new();
    while i < chars.len() {
        match chars[i] {
            quote @ ('\'' | '"') => {
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    delim.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(ParseFailure::parse("unterminated quote in heredoc delimiter"));
                }
            }
            '\\' => {
                if i + 1 >= chars.len() {
                    return Err(ParseFailure::parse("trailing backslash"));
                }
                delim.push(chars[i + 1]);
                i += 2;
            }
            ' ' | '\t' | '\n' | '&' | ';' | '|' | '<' | '>' | '(' | ')' | '`' => break,
            c => {
                delim.push(c);
                i += 1;
            }
        }
    }
    Ok((delim, i))
}

/// Skip a heredoc body verbatim up to a line equal to the delimiter.
/// `strip_tabs` implements `<<-`: leading tabs are removed before the
/// comparison.
fn consume_heredoc_body(
    chars: &[char],
    mut i: usize,
    delim: &str,
    strip_tabs: bool,
) -> Result<usize, ParseFailure> {
    loop {
        if i > chars.len() {
            break;
        }
        let line_start = i;
        while i < chars.len() && chars[i] != '\n' {
            i += 1;
        }
        let line: String = chars[line_start..i].iter().collect();
        let at_end = i >= chars.len();
        if !at_end {
            i += 1;
        }
        let compare = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };
        if compare == delim {
            return Ok(i);
        }
        if at_end {
            break;
        }
    }
    Err(ParseFailure::parse(format!(
        "unterminated heredoc (missing '{delim}')"
    )))
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- split_chains --

    #[test]
    fn splits_on_and_and_semicolon() {
        let parts = split_chains("a && b ; c").unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].trim(), "a");
        assert_eq!(parts[1].trim(), "b");
        assert_eq!(parts[2].trim(), "c");
    }

    #[test]
    fn operators_in_quotes_are_literal() {
        let parts = split_chains("echo 'a && b'").unwrap();
        assert_eq!(parts.len(), 1);

        let parts = split_chains("echo \"x; y\"").unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn or_is_rejected() {
        let err = split_chains("a || b").unwrap_err();
        assert!(err.message.contains("||"));
    }

    #[test]
    fn bare_ampersand_is_rejected() {
        let err = split_chains("a & b").unwrap_err();
        assert!(err.message.contains("background"));
    }

    #[test]
    fn trailing_ampersand_is_rejected() {
        assert!(split_chains("sleep 5 &").is_err());
    }

    #[test]
    fn dangling_operators_fail() {
        assert!(split_chains("a &&").is_err());
        assert!(split_chains("&& a").is_err());
        assert!(split_chains("a ;").is_err());
        assert!(split_chains("; a").is_err());
        assert!(split_chains("a && && b").is_err());
    }

    // -- split_pipeline --

    #[test]
    fn splits_on_pipe() {
        let segments = split_pipeline("cat f | grep x | wc").unwrap();
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn pipe_in_quotes_is_literal() {
        let segments = split_pipeline("echo 'a | b'").unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn empty_segments_fail() {
        assert!(split_pipeline("| a").is_err());
        assert!(split_pipeline("a |").is_err());
        assert!(split_pipeline("a | | b").is_err());
    }

    // -- tokenize: quoting and escaping --

    #[test]
    fn whitespace_splitting() {
        assert_eq!(tokenize("ls  -la\t/tmp").unwrap(), vec!["ls", "-la", "/tmp"]);
    }

    #[test]
    fn single_quotes_suppress_everything() {
        assert_eq!(
            tokenize(r#"echo '$(pwd) `x` \n'"#).unwrap(),
            vec!["echo", r#"$(pwd) `x` \n"#]
        );
    }

    #[test]
    fn double_quote_escapes() {
        assert_eq!(
            tokenize(r#"echo "a \"b\" \$c \\d""#).unwrap(),
            vec!["echo", r#"a "b" $c \d"#]
        );
    }

    #[test]
    fn double_quote_keeps_backslash_before_ordinary_chars() {
        assert_eq!(tokenize(r#"echo "a\nb""#).unwrap(), vec!["echo", r"a\nb"]);
    }

    #[test]
    fn backslash_outside_quotes_escapes_next() {
        assert_eq!(tokenize(r"echo a\ b").unwrap(), vec!["echo", "a b"]);
        assert_eq!(tokenize(r"echo \$HOME").unwrap(), vec!["echo", "$HOME"]);
    }

    #[test]
    fn adjacent_quoted_parts_join_one_token() {
        assert_eq!(tokenize(r#"echo 'a'"b"c"#).unwrap(), vec!["echo", "abc"]);
    }

    #[test]
    fn empty_quoted_string_is_a_token() {
        assert_eq!(tokenize("echo ''").unwrap(), vec!["echo", ""]);
    }

    #[test]
    fn dollar_without_paren_is_literal() {
        assert_eq!(tokenize("echo $HOME").unwrap(), vec!["echo", "$HOME"]);
    }

    #[test]
    fn trailing_backslash_fails() {
        assert!(tokenize("echo a\\").is_err());
    }

    #[test]
    fn unmatched_quotes_fail() {
        assert!(tokenize("echo 'a").is_err());
        assert!(tokenize("echo \"a").is_err());
    }

    // -- tokenize: rejected constructs --

    #[test]
    fn rejects_substitution_and_redirection() {
        assert!(tokenize("echo $(date)").is_err());
        assert!(tokenize("echo `date`").is_err());
        assert!(tokenize("echo x > f").is_err());
        assert!(tokenize("wc < f").is_err());
        assert!(tokenize("(ls)").is_err());
    }

    #[test]
    fn rejects_substitution_inside_double_quotes() {
        assert!(tokenize(r#"echo "$(date)""#).is_err());
        assert!(tokenize(r#"echo "`date`""#).is_err());
    }

    #[test]
    fn rejects_raw_newline_without_heredoc() {
        assert!(tokenize("echo a\necho b").is_err());
    }

    // -- tokenize: heredocs --

    #[test]
    fn heredoc_body_not_tokenized() {
        assert_eq!(tokenize("cat <<EOF\nsome body\nEOF").unwrap(), vec!["cat"]);
    }

    #[test]
    fn heredoc_args_after_delimiter_kept() {
        assert_eq!(
            tokenize("cat <<EOF file\nbody\nEOF").unwrap(),
            vec!["cat", "file"]
        );
    }

    #[test]
    fn heredoc_dash_strips_tabs() {
        assert_eq!(tokenize("cat <<-X\n\tbody\n\t\tX").unwrap(), vec!["cat"]);
    }

    #[test]
    fn heredoc_quoted_delimiter_matches_unquoted_line() {
        assert_eq!(tokenize("cat <<\"DONE\"\nx\nDONE").unwrap(), vec!["cat"]);
    }

    #[test]
    fn heredoc_without_terminator_fails() {
        let err = tokenize("cat <<EOF\nbody only").unwrap_err();
        assert!(err.message.contains("EOF"));
    }

    #[test]
    fn heredoc_missing_delimiter_fails() {
        assert!(tokenize("cat <<\nbody").is_err());
    }

    #[test]
    fn two_heredocs_consumed_in_order() {
        assert_eq!(
            tokenize("cat <<A <<B\nfirst\nA\nsecond\nB").unwrap(),
            vec!["cat"]
        );
    }
}
