//! Line expansion
//!
//! Runs before a command line is parsed. The default [`Expander`] knows:
//!
//! | syntax        | result                                              |
//! |---------------|-----------------------------------------------------|
//! | `@name`       | value of variable `name` (empty when unknown)       |
//! | `@{name}`     | same, delimited                                     |
//! | `@(cmd)@`     | stdout of `cmd` run through `shell_cmd`             |
//! | `@(+prog a)@` | stdout of `prog a` run directly                     |
//! | `@/cmd/@`     | result of the control command `cmd`                 |
//! | `@/+file/@`   | result of `include file`                            |
//! | `@<js>@`      | script result in the page context                   |
//! | `@*js*@`      | script result in the host context                   |
//! | `@-js-@`      | script result in a clean context                    |
//! | `@[text]@`    | `text`, expanded, then markup-escaped               |
//!
//! A backslash and the character after it are copied unchanged; the
//! tokenizer removes the backslash later. The body of a `@(`, `@/` or script
//! form is itself expanded, except for nested forms of the same kind, which
//! are kept literally.

use logos::{Lexer, Logos};
use std::fs;

/// Where a script expansion is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptContext {
    /// The loaded page
    Page,
    /// Isolated context with access to the host bindings
    Host,
    /// Fresh context with nothing from the page
    Clean,
}

impl ScriptContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptContext::Page => "page",
            ScriptContext::Host => "host",
            ScriptContext::Clean => "clean",
        }
    }
}

/// Capabilities an expander needs from the running instance
pub trait ExpandHost {
    /// Formatted variable value
    fn variable(&self, name: &str) -> Option<String>;
    /// Run a process and capture stdout; `direct` skips `shell_cmd`
    fn shell(&self, command: &str, direct: bool) -> String;
    /// Evaluate script source
    fn script(&self, context: ScriptContext, source: &str) -> String;
    /// Run a control command line and return its result
    fn command(&self, line: &str) -> String;
}

/// Turns a raw line into the line that gets parsed
pub trait Expand: Send + Sync {
    fn expand(&self, line: &str, host: &dyn ExpandHost) -> String;
}

/// Leaves lines untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct Verbatim;

impl Expand for Verbatim {
    fn expand(&self, line: &str, _host: &dyn ExpandHost) -> String {
        line.to_string()
    }
}

/// The built-in `@` expansion grammar
#[derive(Debug, Default, Clone, Copy)]
pub struct Expander;

impl Expand for Expander {
    fn expand(&self, line: &str, host: &dyn ExpandHost) -> String {
        expand_with(line, host, Skip::None)
    }
}

/// Form that is not expanded again inside its own body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    None,
    Shell,
    Command,
    Script(ScriptContext),
}

/// Consume up to and including `end`, returning the text before it.
/// Without a terminator the rest of the input is taken.
fn enclosed<'s>(lex: &mut Lexer<'s, Piece<'s>>, end: &str) -> &'s str {
    let rest = lex.remainder();
    match rest.find(end) {
        Some(at) => {
            lex.bump(at + end.len());
            &rest[..at]
        }
        None => {
            lex.bump(rest.len());
            rest
        }
    }
}

fn escaped<'s>(lex: &mut Lexer<'s, Piece<'s>>) -> &'s str {
    if let Some(next) = lex.remainder().chars().next() {
        lex.bump(next.len_utf8());
    }
    lex.slice()
}

fn braced<'s>(lex: &mut Lexer<'s, Piece<'s>>) -> &'s str {
    enclosed(lex, "}")
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum Piece<'s> {
    #[token("\\", escaped)]
    Escaped(&'s str),

    #[regex(r"@[A-Za-z0-9_.]*", |lex| &lex.slice()[1..])]
    Var(&'s str),

    #[token("@{", braced)]
    Braced(&'s str),

    #[token("@(", |lex| enclosed(lex, ")@"))]
    Shell(&'s str),

    #[token("@/", |lex| enclosed(lex, "/@"))]
    Command(&'s str),

    #[token("@<", |lex| enclosed(lex, ">@"))]
    PageScript(&'s str),

    #[token("@*", |lex| enclosed(lex, "*@"))]
    HostScript(&'s str),

    #[token("@-", |lex| enclosed(lex, "-@"))]
    CleanScript(&'s str),

    #[token("@[", |lex| enclosed(lex, "]@"))]
    Markup(&'s str),

    #[regex(r"[^@\\]+")]
    Text,
}

fn expand_with(line: &str, host: &dyn ExpandHost, skip: Skip) -> String {
    let mut out = String::with_capacity(line.len());
    let mut lex = Piece::lexer(line);

    while let Some(piece) = lex.next() {
        let piece = match piece {
            Ok(piece) => piece,
            Err(()) => {
                out.push_str(lex.slice());
                continue;
            }
        };

        match piece {
            Piece::Text => out.push_str(lex.slice()),
            Piece::Escaped(pair) => out.push_str(pair),
            Piece::Var(name) | Piece::Braced(name) => {
                if let Some(value) = host.variable(name) {
                    out.push_str(&value);
                }
            }
            Piece::Shell(body) => {
                if skip == Skip::Shell {
                    out.push_str(lex.slice());
                    continue;
                }
                let (direct, body) = match body.strip_prefix('+') {
                    Some(rest) => (true, rest),
                    None => (false, body),
                };
                let command = expand_with(body, host, Skip::Shell);
                let output = host.shell(&command, direct);
                out.push_str(output.strip_suffix('\n').unwrap_or(&output));
            }
            Piece::Command(body) => {
                if skip == Skip::Command {
                    out.push_str(lex.slice());
                    continue;
                }
                let line = match body.strip_prefix('+') {
                    Some(path) => format!("include {}", expand_with(path, host, Skip::Command)),
                    None => expand_with(body, host, Skip::Command),
                };
                out.push_str(&host.command(&line));
            }
            Piece::PageScript(body) => {
                run_script(&mut out, &lex, host, skip, ScriptContext::Page, body)
            }
            Piece::HostScript(body) => {
                run_script(&mut out, &lex, host, skip, ScriptContext::Host, body)
            }
            Piece::CleanScript(body) => {
                run_script(&mut out, &lex, host, skip, ScriptContext::Clean, body)
            }
            Piece::Markup(body) => {
                let text = expand_with(body, host, Skip::None);
                out.push_str(&markup_escape(&text));
            }
        }
    }

    out
}

fn run_script<'s>(
    out: &mut String,
    lex: &Lexer<'s, Piece<'s>>,
    host: &dyn ExpandHost,
    skip: Skip,
    context: ScriptContext,
    body: &str,
) {
    if skip == Skip::Script(context) {
        out.push_str(lex.slice());
        return;
    }

    let source = match body.strip_prefix('+') {
        Some(path) => {
            let path = expand_with(path, host, Skip::Script(context));
            match fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(event = "script_file_unreadable", path = %path, error = %e);
                    return;
                }
            }
        }
        None => expand_with(body, host, Skip::Script(context)),
    };

    out.push_str(&host.script(context, &source));
}

/// Escape the XML markup characters in `text`
pub fn markup_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
