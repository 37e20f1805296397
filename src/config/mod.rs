//! Command line and configuration files
//!
//! A configuration file is a list of control lines run in order, the same
//! way `include` runs a file. [`DEFAULT_CONFIG`] runs first, then the
//! selected source:
//! - `-c FILE`: that file
//! - `-c -`: commands from stdin, whose results go to stdout
//! - otherwise `$XDG_CONFIG_HOME/webctl/config` when it exists

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Built-in settings applied before any user configuration
pub const DEFAULT_CONFIG: &str = "\
set shell_cmd = sh -c
set zoom_step = 0.1
";

/// Where the user configuration comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// `$XDG_CONFIG_HOME/webctl/config`, skipped when missing
    #[default]
    Default,
    File(PathBuf),
    Stdin,
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    /// Instance name; the process id when unset
    pub name: Option<String>,
    pub config: ConfigSource,
    pub connect_sockets: Vec<PathBuf>,
    pub print_events: bool,
    pub verbose: bool,
    pub uri: Option<String>,
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(Options),
    Help,
    Version,
}

impl Options {
    /// The configuration file to run, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            ConfigSource::File(path) => Some(path.clone()),
            ConfigSource::Default => default_config_path().filter(|path| path.exists()),
            ConfigSource::Stdin => None,
        }
    }
}

/// Split `--flag=value` into its parts
fn split_inline(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
        _ => (arg, None),
    }
}

/// Parse arguments, without the program name
pub fn parse_args<I>(args: I) -> Result<Action>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = split_inline(&arg);
        let mut value = |what: &str| -> Result<String> {
            match inline {
                Some(value) => Ok(value.to_string()),
                None => args
                    .next()
                    .ok_or_else(|| anyhow!("option {} needs {}", flag, what)),
            }
        };

        match flag {
            "-n" | "--named" => options.name = Some(value("a name")?),
            "-c" | "--config" => {
                let path = value("a file")?;
                options.config = if path == "-" {
                    ConfigSource::Stdin
                } else {
                    ConfigSource::File(PathBuf::from(path))
                };
            }
            "--connect-socket" => options.connect_sockets.push(PathBuf::from(value("a path")?)),
            "-u" | "--uri" => options.uri = Some(value("a URI")?),
            "-p" | "--print-events" => options.print_events = true,
            "-v" | "--verbose" => options.verbose = true,
            "-V" | "--version" => return Ok(Action::Version),
            "-h" | "--help" => return Ok(Action::Help),
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(anyhow!("unknown option '{}'", other));
            }
            _ => {
                if options.uri.is_some() {
                    return Err(anyhow!("unexpected argument '{}'", arg));
                }
                options.uri = Some(arg.clone());
            }
        }
    }
    Ok(Action::Run(options))
}

/// `$XDG_CONFIG_HOME/webctl/config`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("webctl").join("config"))
}

pub fn usage() -> String {
    format!(
        "\
webctl {}

Usage: webctl [OPTIONS] [URI]

Options:
  -n, --named NAME           Instance name (default: process id)
  -c, --config FILE          Configuration file, '-' reads commands from stdin
      --connect-socket PATH  Socket to send events to (repeatable)
  -p, --print-events         Print events to stdout
  -u, --uri URI              Page to load
  -v, --verbose              Debug logging
  -V, --version              Print version and exit
  -h, --help                 Show this help message

Logging is filtered by WEBCTL_LOG (e.g. WEBCTL_LOG=webctl=trace).",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<Action> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    fn options(list: &[&str]) -> Options {
        match parse(list).unwrap() {
            Action::Run(options) => options,
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let opts = options(&[]);
        assert_eq!(opts, Options::default());
        assert_eq!(opts.config, ConfigSource::Default);
    }

    #[test]
    fn test_all_flags() {
        let opts = options(&[
            "-n",
            "main",
            "--config",
            "/tmp/cfg",
            "--connect-socket",
            "/tmp/a",
            "--connect-socket=/tmp/b",
            "-p",
            "-v",
            "http://example.com",
        ]);
        assert_eq!(opts.name.as_deref(), Some("main"));
        assert_eq!(opts.config, ConfigSource::File(PathBuf::from("/tmp/cfg")));
        assert_eq!(
            opts.connect_sockets,
            vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]
        );
        assert!(opts.print_events);
        assert!(opts.verbose);
        assert_eq!(opts.uri.as_deref(), Some("http://example.com"));
        assert_eq!(opts.config_path(), Some(PathBuf::from("/tmp/cfg")));
    }

    #[test]
    fn test_stdin_config() {
        let opts = options(&["-c", "-"]);
        assert_eq!(opts.config, ConfigSource::Stdin);
        assert_eq!(opts.config_path(), None);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["-h"]).unwrap(), Action::Help);
        assert_eq!(parse(&["-v", "--version"]).unwrap(), Action::Version);
    }

    #[test]
    fn test_default_config_sets_known_variables() {
        use crate::variables::{register_builtins, Variables};

        let vars = Variables::new();
        register_builtins(&vars, "t", 1, "");
        for line in DEFAULT_CONFIG.lines() {
            let name = line
                .strip_prefix("set ")
                .and_then(|rest| rest.split(" = ").next())
                .unwrap();
            assert!(vars.kind(name).is_some(), "{} is not a built-in variable", name);
        }
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--named"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["a", "b"]).is_err());
        assert!(parse(&["-u", "x", "y"]).is_err());
    }
}
