//! Collaborators the control plane drives but does not implement
//!
//! The renderer and the process spawner are injected into the runtime. The
//! defaults here are a headless renderer that only logs, and a spawner
//! backed by `std::process`.

use crate::expand::ScriptContext;
use std::io;
use std::process::{Command, Stdio};

/// Scroll direction for the `scroll` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

/// Rendering engine operations reachable from commands and variable hooks
///
/// Every method has a no-op default so embedders only implement what they
/// support.
pub trait Renderer: Send + Sync {
    fn load_uri(&self, _uri: &str) {}

    fn go_back(&self, _steps: u32) {}

    fn go_forward(&self, _steps: u32) {}

    fn reload(&self, _bypass_cache: bool) {}

    fn stop(&self) {}

    /// Evaluate script source and return its value as text
    fn evaluate(&self, _context: ScriptContext, _source: &str) -> String {
        String::new()
    }

    fn set_zoom(&self, _level: f64) {}

    fn set_user_agent(&self, _agent: &str) {}

    /// `amount` is passed through as given (`10`, `-5`, `50%`, `begin`, `end`)
    fn scroll(&self, _axis: Axis, _amount: &str) {}

    fn search(&self, _text: &str, _forward: bool) {}

    fn search_clear(&self) {}

    fn download(&self, _uri: &str, _destination: &str) {}
}

/// Renderer used when no engine is attached
#[derive(Debug, Default)]
pub struct HeadlessRenderer;

impl Renderer for HeadlessRenderer {
    fn load_uri(&self, uri: &str) {
        tracing::debug!(event = "load_uri", uri = %uri);
    }

    fn evaluate(&self, context: ScriptContext, source: &str) -> String {
        tracing::debug!(event = "evaluate", context = context.as_str(), bytes = source.len());
        String::new()
    }

    fn download(&self, uri: &str, destination: &str) {
        tracing::debug!(event = "download", uri = %uri, destination = %destination);
    }
}

/// Runs external handler programs
pub trait Spawner: Send + Sync {
    /// Start `argv` in the background
    fn spawn(&self, argv: &[String], env: &[(String, String)]) -> io::Result<()>;

    /// Run `argv` to completion and return its stdout
    fn spawn_sync(&self, argv: &[String], env: &[(String, String)]) -> io::Result<String>;
}

/// [`Spawner`] on top of `std::process::Command`
#[derive(Debug, Default)]
pub struct ProcessSpawner;

fn command_for(argv: &[String], env: &[(String, String)]) -> io::Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
    let mut command = Command::new(program);
    command.args(args);
    command.envs(env.iter().map(|(k, v)| (k, v)));
    Ok(command)
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, argv: &[String], env: &[(String, String)]) -> io::Result<()> {
        let mut child = command_for(argv, env)?
            .stdin(Stdio::null())
            .spawn()?;

        // Reap in the background so finished handlers don't linger as zombies
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }

    fn spawn_sync(&self, argv: &[String], env: &[(String, String)]) -> io::Result<String> {
        let output = command_for(argv, env)?
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?;

        if !output.status.success() {
            tracing::debug!(event = "spawn_status", program = %argv[0], status = %output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
