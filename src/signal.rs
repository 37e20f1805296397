//! Signal handling for the webctl instance

use anyhow::Result;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::thread;

/// What the instance should do about a delivered signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// SIGINT, SIGTERM: shut down cleanly with this exit code
    Exit(i32),
    /// SIGHUP: run the configuration file again
    Reload,
}

impl SignalAction {
    pub fn from_signal(sig: i32) -> Option<Self> {
        match sig {
            SIGINT => Some(SignalAction::Exit(130)),
            SIGTERM => Some(SignalAction::Exit(143)),
            SIGHUP => Some(SignalAction::Reload),
            _ => None,
        }
    }
}

/// Watches SIGINT, SIGTERM and SIGHUP on a background thread
pub struct SignalHandler {
    handle: Handle,
}

impl SignalHandler {
    /// Start watching; `on_signal` runs on the watcher thread
    pub fn setup<F>(mut on_signal: F) -> Result<Self>
    where
        F: FnMut(SignalAction) + Send + 'static,
    {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
        let handle = signals.handle();

        thread::Builder::new()
            .name("webctl-signals".into())
            .spawn(move || {
                for sig in signals.forever() {
                    if let Some(action) = SignalAction::from_signal(sig) {
                        tracing::info!(event = "signal", signal = sig, action = ?action);
                        on_signal(action);
                    }
                }
            })?;

        Ok(Self { handle })
    }

    /// Stop watching
    pub fn close(&self) {
        self.handle.close();
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.close();
    }
}
