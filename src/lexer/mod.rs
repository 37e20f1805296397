//! Argument tokenizer for control lines
//!
//! Splits the argument part of a command line into tokens. Single and double
//! quotes group separators into one token, a backslash escapes the character
//! after it. With `unquote` set the quoting characters are consumed; without
//! it they are copied through so the caller can re-split later.
//!
//! The grammar is permissive on purpose: an unterminated quote runs to the end
//! of the input and a lone trailing backslash is kept as-is.

/// Characters that end an unquoted token
fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split `raw` into argument tokens.
///
/// Runs of separators between tokens collapse, so `"a  b"` gives two tokens.
/// A token opened by a quote is kept even when empty (`"''"` gives `[""]`).
/// The final token is always emitted, which means a trailing separator yields
/// one trailing empty token and an empty input yields `[""]`.
pub fn split(raw: &str, unquote: bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // A quote touched the current token; keeps `''` from collapsing away
    let mut quoted = false;
    let mut in_double = false;
    let mut in_single = false;

    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => {
                    if !unquote {
                        current.push('\\');
                    }
                    current.push(next);
                }
                None => current.push('\\'),
            },
            '"' if !in_single => {
                if !unquote {
                    current.push('"');
                }
                in_double = !in_double;
                quoted = true;
            }
            '\'' if !in_double => {
                if !unquote {
                    current.push('\'');
                }
                in_single = !in_single;
                quoted = true;
            }
            c if is_separator(c) && !in_double && !in_single => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }

    tokens.push(current);
    tokens
}

/// Quote `text` so that `split(&quote(text), true)` gives back `[text]`.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Split a line into the command name and the raw remainder.
///
/// The name ends at the first space; everything after that space (including
/// further separators) is the remainder.
pub fn split_command(line: &str) -> (&str, Option<&str>) {
    match line.split_once(' ') {
        Some((name, rest)) => (name, Some(rest)),
        None => (line, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_words() {
        assert_eq!(split("foo bar baz", true), v(&["foo", "bar", "baz"]));
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(split("a  b   c", true), v(&["a", "b", "c"]));
        assert_eq!(split("a\t\tb", true), v(&["a", "b"]));
    }

    #[test]
    fn test_trailing_separator_gives_empty_token() {
        assert_eq!(split("a b", true).len(), 2);
        assert_eq!(split("a b ", true), v(&["a", "b", ""]));
        assert_eq!(split("a b    ", true), v(&["a", "b", ""]));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(split("", true), v(&[""]));
        assert_eq!(split("", false), v(&[""]));
    }

    #[test]
    fn test_leading_separators_skipped() {
        assert_eq!(split("  a", true), v(&["a"]));
    }

    #[test]
    fn test_single_quotes_group() {
        assert_eq!(
            split("foo bar 'a quoted string'", true),
            v(&["foo", "bar", "a quoted string"])
        );
    }

    #[test]
    fn test_double_quotes_group() {
        assert_eq!(split("\"x y\" z", true), v(&["x y", "z"]));
    }

    #[test]
    fn test_quotes_kept_without_unquote() {
        assert_eq!(split("'a b' c", false), v(&["'a b'", "c"]));
        assert_eq!(split("\"it's\"", false), v(&["\"it's\""]));
    }

    #[test]
    fn test_other_quote_is_literal_inside_quotes() {
        assert_eq!(split("\"it's\"", true), v(&["it's"]));
        assert_eq!(split("'say \"hi\"'", true), v(&["say \"hi\""]));
    }

    #[test]
    fn test_empty_quoted_token_survives() {
        assert_eq!(split("'' x", true), v(&["", "x"]));
        assert_eq!(split("a \"\" b", true), v(&["a", "", "b"]));
    }

    #[test]
    fn test_backslash_escape() {
        assert_eq!(split("\\@", true), v(&["@"]));
        assert_eq!(split("\\@", false), v(&["\\@"]));
        assert_eq!(split("a\\ b", true), v(&["a b"]));
        assert_eq!(split("'don\\'t'", true), v(&["don't"]));
    }

    #[test]
    fn test_lone_trailing_backslash_kept() {
        assert_eq!(split("abc\\", true), v(&["abc\\"]));
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(split("a 'b c", true), v(&["a", "b c"]));
        assert_eq!(split("\"open  ended ", true), v(&["open  ended "]));
    }

    #[test]
    fn test_quote_roundtrip() {
        for text in ["plain", "two words", "it's", "back\\slash", "", "  pad  ", "@var"] {
            assert_eq!(split(&quote(text), true), v(&[text]), "text: {:?}", text);
        }
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("set a = b"), ("set", Some("a = b")));
        assert_eq!(split_command("exit"), ("exit", None));
        assert_eq!(split_command("js  two"), ("js", Some(" two")));
    }
}
