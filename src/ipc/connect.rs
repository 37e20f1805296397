//! Outbound event sockets
//!
//! Each path given with `--connect-socket` is dialed once at startup. The
//! socket becomes a connect channel on the event bus, and whatever the peer
//! writes back is dispatched like fifo input (results are not sent back).
//! Commands run on a worker thread so the reader stays free for replies.

use super::{read_lines, route_line, spawn_command_worker};
use crate::events::{ChannelId, ChannelKind};
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A peer that stops reading for this long is dropped
pub const CONNECT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Dial `path` and register it as a connect channel
pub fn connect(rt: &Arc<Runtime>, path: &Path) -> Result<ChannelId> {
    let stream = UnixStream::connect(path)
        .with_context(|| format!("cannot connect to {}", path.display()))?;
    let writer = stream.try_clone()?;
    writer.set_write_timeout(Some(CONNECT_WRITE_TIMEOUT))?;

    let label = path.display().to_string();
    let weak = Arc::downgrade(rt);
    let commands = spawn_command_worker(weak.clone(), &label)?;

    let bus = rt.bus().clone();
    let id = bus.add_channel(ChannelKind::Connect, label.clone(), writer);

    thread::Builder::new()
        .name("webctl-connect".into())
        .spawn(move || {
            let result = read_lines(BufReader::new(stream), |line| match weak.upgrade() {
                Some(rt) => route_line(&rt, line, &commands),
                None => false,
            });
            if let Err(e) = result {
                tracing::debug!(event = "connect_read_failed", channel = %label, error = %e);
            }
            bus.remove_channel(id);
            tracing::info!(event = "connect_closed", channel = %label);
        })?;

    tracing::info!(event = "connect_attached", path = %path.display(), id);
    Ok(id)
}

/// Dial every path; failures are logged and skipped. Returns how many connected.
pub fn connect_all(rt: &Arc<Runtime>, paths: &[PathBuf]) -> usize {
    paths
        .iter()
        .filter(|path| match connect(rt, path) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(event = "connect_failed", error = %format!("{:#}", e));
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::Verbatim;
    use std::io::{BufRead, Write};
    use std::os::unix::net::UnixListener;
    use std::time::Instant;

    #[test]
    fn test_connect_receives_backlog_and_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peer.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let rt = Runtime::builder().name("c").expander(Verbatim).build();
        rt.execute("set early = 1");
        assert_eq!(rt.bus().buffered(), 1);

        connect(&rt, &path).unwrap();
        let (peer, _) = listener.accept().unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut reader = BufReader::new(peer.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "EVENT [c] VARIABLE_SET early str '1'\n");

        (&peer).write_all(b"set late = 2\n").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while rt.variable("late") != "2" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(rt.variable("late"), "2");
    }

    #[test]
    fn test_connect_all_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let rt = Runtime::builder().name("c").expander(Verbatim).build();
        let missing = vec![dir.path().join("nobody.sock")];
        assert_eq!(connect_all(&rt, &missing), 0);
        assert_eq!(rt.bus().channel_count(), 0);
    }
}
