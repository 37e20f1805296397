// Commands from standard input (`--config -`)

use super::{handle_line, read_lines};
use crate::runtime::Runtime;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

/// Read commands from stdin on a background thread; non-empty results are
/// printed to stdout. EOF just ends the reader.
pub fn spawn_stdin(rt: &Arc<Runtime>) -> io::Result<thread::JoinHandle<()>> {
    let weak = Arc::downgrade(rt);
    thread::Builder::new()
        .name("webctl-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            let result = read_lines(stdin.lock(), |line| {
                let Some(rt) = weak.upgrade() else {
                    return false;
                };
                if let Some(result) = handle_line(&rt, line).filter(|r| !r.is_empty()) {
                    let mut out = io::stdout().lock();
                    let _ = writeln!(out, "{}", result).and_then(|_| out.flush());
                }
                true
            });
            if let Err(e) = result {
                tracing::warn!(event = "stdin_read_failed", error = %e);
            }
        })
}
