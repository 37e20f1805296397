//! Cookie daemon configuration
//!
//! Flags:
//! - `-s`, `--socket PATH`: where to listen (default
//!   `$XDG_CACHE_HOME/webctl/cookie_daemon_socket`)
//! - `-f`, `--file PATH`: JSON file the jar is loaded from and saved to
//! - `-v`, `--verbose`: log every request

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Socket file name inside the cache directory
pub const SOCKET_NAME: &str = "cookie_daemon_socket";

#[derive(Debug, Clone, PartialEq)]
pub struct CookieDaemonConfig {
    pub socket_path: PathBuf,
    pub store: Option<PathBuf>,
    pub verbose: bool,
}

/// What the command line asked for
#[derive(Debug, Clone, PartialEq)]
pub enum DaemonCommand {
    Run(CookieDaemonConfig),
    Help,
}

impl Default for CookieDaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            store: None,
            verbose: false,
        }
    }
}

impl CookieDaemonConfig {
    /// Parse arguments, without the program name
    pub fn from_args<I>(args: I) -> Result<DaemonCommand>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-s" | "--socket" => {
                    let path = args.next().ok_or_else(|| anyhow!("{} needs a path", arg))?;
                    config.socket_path = PathBuf::from(path);
                }
                "-f" | "--file" => {
                    let path = args.next().ok_or_else(|| anyhow!("{} needs a path", arg))?;
                    config.store = Some(PathBuf::from(path));
                }
                "-v" | "--verbose" => config.verbose = true,
                "-h" | "--help" => return Ok(DaemonCommand::Help),
                other => return Err(anyhow!("unknown option '{}'", other)),
            }
        }
        Ok(DaemonCommand::Run(config))
    }
}

/// Default daemon socket, shared with the browser side
pub fn default_socket_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("webctl")
        .join(SOCKET_NAME)
}
