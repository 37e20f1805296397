//! Command registry and line parser
//!
//! Every command is a plain function over the runtime and its argument
//! vector. The table is built once when the runtime is created and never
//! changes afterwards.

use crate::error::CommandError;
use crate::lexer;
use crate::runtime::Runtime;
use anyhow::Result;
use std::collections::HashMap;

mod control;
mod navigation;
mod spawn;

/// Handler signature. `Ok(None)` means the command produced no result.
pub type CommandFn = fn(&Runtime, &mut Vec<String>) -> Result<Option<String>>;

/// One registry entry
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub handler: CommandFn,
    /// Tokenize the remainder (true) or pass it as a single argument
    pub split: bool,
    /// Emit `COMMAND_EXECUTED` after running
    pub notify: bool,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("split", &self.split)
            .field("notify", &self.notify)
            .finish()
    }
}

/// A parsed line, ready to run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: Command,
    pub args: Vec<String>,
}

const fn split(name: &'static str, handler: CommandFn) -> Command {
    Command { name, handler, split: true, notify: true }
}

const fn whole(name: &'static str, handler: CommandFn) -> Command {
    Command { name, handler, split: false, notify: true }
}

const fn silent(name: &'static str, handler: CommandFn) -> Command {
    Command { name, handler, split: false, notify: false }
}

/// Built-in commands in registration order
const BUILTINS: &[Command] = &[
    // Navigation
    split("back", navigation::back),
    split("forward", navigation::forward),
    split("reload", navigation::reload),
    split("reload_ign_cache", navigation::reload_ign_cache),
    split("stop", navigation::stop),
    whole("uri", navigation::uri),
    split("download", navigation::download),
    // Display and search
    split("scroll", navigation::scroll),
    split("zoom_in", navigation::zoom_in),
    split("zoom_out", navigation::zoom_out),
    whole("search", navigation::search),
    whole("search_reverse", navigation::search_reverse),
    whole("search_clear", navigation::search_clear),
    split("dehilight", navigation::search_clear),
    // Scripts and processes
    whole("js", navigation::js),
    split("script", navigation::script),
    split("spawn", spawn::spawn),
    split("sync_spawn", spawn::sync_spawn),
    split("sync_spawn_exec", spawn::sync_spawn_exec),
    split("sh", spawn::sh),
    split("sync_sh", spawn::sync_sh),
    // Cookies
    split("cookie_get", control::cookie_get),
    split("cookie_put", control::cookie_put),
    // Control
    split("chain", control::chain),
    whole("include", control::include),
    split("exit", control::exit),
    silent("set", control::set),
    split("toggle", control::toggle),
    split("dump_config", control::dump_config),
    split("dump_config_as_events", control::dump_config_as_events),
    whole("print", control::print),
    silent("event", control::event),
    silent("request", control::event),
];

/// The command table
#[derive(Clone)]
pub struct Commands {
    commands: HashMap<&'static str, Command>,
    order: Vec<&'static str>,
}

impl Default for Commands {
    fn default() -> Self {
        Self::new()
    }
}

impl Commands {
    pub fn new() -> Self {
        let mut commands = HashMap::new();
        let mut order = Vec::with_capacity(BUILTINS.len());

        for command in BUILTINS {
            commands.insert(command.name, *command);
            order.push(command.name);
        }

        Self { commands, order }
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Command names in registration order
    pub fn names(&self) -> Vec<String> {
        self.order.iter().map(|name| name.to_string()).collect()
    }

    /// Parse an already expanded line.
    ///
    /// An empty line parses to `None`. The command name ends at the first
    /// space; the remainder is tokenized or passed whole depending on the
    /// command.
    pub fn parse(&self, line: &str) -> Result<Option<Invocation>, CommandError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (name, rest) = lexer::split_command(line);
        let command = self.lookup(name).copied().ok_or_else(|| CommandError::Unknown {
            name: name.to_string(),
            line: line.to_string(),
        })?;

        let args = match rest {
            None => Vec::new(),
            Some(rest) if command.split => lexer::split(rest, true),
            Some(rest) => vec![rest.to_string()],
        };

        Ok(Some(Invocation { command, args }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(commands: &Commands, line: &str) -> Vec<String> {
        commands.parse(line).unwrap().unwrap().args
    }

    #[test]
    fn test_names_unique_and_ordered() {
        let commands = Commands::new();
        let names = commands.names();
        assert_eq!(names.len(), BUILTINS.len());
        assert_eq!(names[0], "back");
        assert_eq!(names.last().map(String::as_str), Some("request"));
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
    }

    #[test]
    fn test_empty_line_is_noop() {
        let commands = Commands::new();
        assert!(commands.parse("").unwrap().is_none());
        assert!(commands.parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_unknown_command() {
        let commands = Commands::new();
        let err = commands.parse("frobnicate now").unwrap_err();
        assert_eq!(
            err,
            CommandError::Unknown {
                name: "frobnicate".into(),
                line: "frobnicate now".into()
            }
        );
    }

    #[test]
    fn test_split_commands_tokenize() {
        let commands = Commands::new();
        assert_eq!(
            args(&commands, "toggle foo bar 'a quoted string'"),
            vec!["foo", "bar", "a quoted string"]
        );
        assert_eq!(args(&commands, "spawn \\@"), vec!["@"]);
        assert!(args(&commands, "exit").is_empty());
    }

    #[test]
    fn test_whole_commands_keep_remainder() {
        let commands = Commands::new();
        assert_eq!(args(&commands, "print  two  'spaces'"), vec![" two  'spaces'"]);
        assert_eq!(args(&commands, "set a = b c"), vec!["a = b c"]);
    }

    #[test]
    fn test_notify_flags() {
        let commands = Commands::new();
        for name in ["set", "event", "request"] {
            assert!(!commands.lookup(name).unwrap().notify, "{}", name);
        }
        assert!(commands.lookup("print").unwrap().notify);
        assert!(commands.lookup("chain").unwrap().split);
    }
}
