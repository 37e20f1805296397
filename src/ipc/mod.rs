//! Control channels
//!
//! - **fifo**: `<dir>/webctl_fifo_<name>`, commands in, nothing out. A read
//!   failure is fatal to the instance.
//! - **control socket**: `<dir>/webctl_socket_<name>`, any number of
//!   clients; every command line gets its result back followed by `\n`.
//! - **connect sockets**: dialed at startup; they receive events and
//!   requests, and their lines are run like fifo lines.
//! - **stdin**: optional, results are printed to stdout.
//!
//! - **extension socket**: `<dir>/webctl_extension_<name>`, one extension
//!   link per accepted connection.
//!
//! Every channel runs its own reader thread. Lines starting with `REPLY-`
//! are routed to the request slot instead of the dispatcher. Connect
//! channels hand commands to a separate worker, since the reply to a
//! request their own command made arrives on the same stream.

pub mod connect;
pub mod extension;
pub mod fifo;
pub mod socket;
pub mod stdin;

pub use connect::{connect, connect_all, CONNECT_WRITE_TIMEOUT};
pub use extension::ExtensionSocket;
pub use fifo::FifoChannel;
pub use socket::ControlSocket;
pub use stdin::spawn_stdin;

use crate::events::{Event, EventKind};
use crate::runtime::Runtime;
use crate::variables::Value;
use anyhow::Result;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Weak};
use std::thread;

/// Fifo and control socket currently attached to a runtime
#[derive(Default)]
pub struct Endpoints {
    fifo: Option<FifoChannel>,
    socket: Option<ControlSocket>,
    extension: Option<ExtensionSocket>,
}

impl Endpoints {
    pub fn fifo_path(&self) -> Option<&Path> {
        self.fifo.as_ref().map(FifoChannel::path)
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.socket.as_ref().map(ControlSocket::path)
    }

    pub fn extension_path(&self) -> Option<&Path> {
        self.extension.as_ref().map(ExtensionSocket::path)
    }

    /// Stop both endpoints and unlink their files
    pub fn close_all(&mut self) {
        if let Some(fifo) = self.fifo.take() {
            fifo.close();
        }
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        if let Some(extension) = self.extension.take() {
            extension.close();
        }
    }
}

/// Dispatch one received line.
///
/// Returns the command result, or `None` for reply lines, which go to the
/// request slot.
pub fn handle_line(rt: &Runtime, line: &str) -> Option<String> {
    let line = trim_line(line);
    if line.starts_with("REPLY-") {
        rt.requests().set_reply(line);
        return None;
    }
    Some(rt.execute(line))
}

fn trim_line(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Start a thread that runs queued command lines in order.
///
/// The returned sender takes lines already stripped of `REPLY-` traffic;
/// dropping it ends the worker once the queue is drained.
pub(crate) fn spawn_command_worker(rt: Weak<Runtime>, label: &str) -> io::Result<Sender<String>> {
    let (tx, rx) = mpsc::channel::<String>();
    let label = label.to_string();
    thread::Builder::new()
        .name("webctl-commands".into())
        .spawn(move || {
            for line in rx {
                let Some(rt) = rt.upgrade() else {
                    break;
                };
                rt.execute(&line);
            }
            tracing::debug!(event = "command_worker_stopped", channel = %label);
        })?;
    Ok(tx)
}

/// Route one line read from a connect channel: replies go straight to the
/// request slot, commands to `commands`. Returns false once the worker is gone.
pub(crate) fn route_line(rt: &Runtime, line: &str, commands: &Sender<String>) -> bool {
    let line = trim_line(line);
    if line.starts_with("REPLY-") {
        rt.requests().set_reply(line);
        return true;
    }
    commands.send(line.to_string()).is_ok()
}

/// Feed newline-terminated lines from `reader` to `on_line` until EOF, an
/// error, or `on_line` returns false. Invalid UTF-8 is replaced, not fatal.
pub(crate) fn read_lines<R, F>(mut reader: R, mut on_line: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        if !on_line(&line) {
            return Ok(());
        }
    }
}

/// Replace the fifo with one in `dir`; an empty `dir` only removes it
pub fn attach_fifo(rt: &Arc<Runtime>, dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(old) = rt.endpoints().fifo.take() {
        old.close();
    }
    if dir.as_os_str().is_empty() {
        rt.variables().store("fifo_path", Value::Str(String::new()));
        return Ok(None);
    }

    let channel = FifoChannel::open(rt, dir)?;
    let path = channel.path().to_path_buf();
    rt.endpoints().fifo = Some(channel);

    let shown = path.to_string_lossy().into_owned();
    rt.variables().store("fifo_path", Value::Str(shown.clone()));
    rt.send_event(&Event::new(EventKind::FifoSet).str(shown));
    Ok(Some(path))
}

/// Replace the control socket with one in `dir`; an empty `dir` only removes it
pub fn attach_socket(rt: &Arc<Runtime>, dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(old) = rt.endpoints().socket.take() {
        old.close();
    }
    if dir.as_os_str().is_empty() {
        rt.variables().store("socket_path", Value::Str(String::new()));
        return Ok(None);
    }

    let socket = ControlSocket::bind(rt, dir)?;
    let path = socket.path().to_path_buf();
    rt.endpoints().socket = Some(socket);

    let shown = path.to_string_lossy().into_owned();
    rt.variables().store("socket_path", Value::Str(shown.clone()));
    rt.send_event(&Event::new(EventKind::SocketSet).str(shown));
    Ok(Some(path))
}

/// Replace the extension socket with one in `dir`; an empty `dir` only removes it
pub fn attach_extension_socket(rt: &Arc<Runtime>, dir: &Path) -> Result<Option<PathBuf>> {
    if let Some(old) = rt.endpoints().extension.take() {
        old.close();
    }
    if dir.as_os_str().is_empty() {
        rt.variables().store("extension_path", Value::Str(String::new()));
        return Ok(None);
    }

    let listener = ExtensionSocket::bind(rt, dir)?;
    let path = listener.path().to_path_buf();
    rt.endpoints().extension = Some(listener);

    rt.variables()
        .store("extension_path", Value::Str(path.to_string_lossy().into_owned()));
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::Verbatim;
    use std::io::Cursor;

    #[test]
    fn test_read_lines_handles_partial_last_line() {
        let mut seen = Vec::new();
        read_lines(Cursor::new(b"one\ntwo\nthree".to_vec()), |line| {
            seen.push(line.to_string());
            true
        })
        .unwrap();
        assert_eq!(seen, vec!["one\n", "two\n", "three"]);
    }

    #[test]
    fn test_read_lines_stops_when_asked() {
        let mut count = 0;
        read_lines(Cursor::new(b"a\nb\nc\n".to_vec()), |_| {
            count += 1;
            count < 2
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_handle_line_routes_replies() {
        let rt = Runtime::builder().name("h").expander(Verbatim).build();
        assert_eq!(handle_line(&rt, "print hi\n").as_deref(), Some("hi"));
        assert_eq!(handle_line(&rt, "print crlf\r\n").as_deref(), Some("crlf"));
        assert_eq!(handle_line(&rt, "REPLY-1 x\n"), None);
    }

    #[test]
    fn test_route_line_keeps_replies_off_the_worker() {
        let rt = Runtime::builder().name("r").expander(Verbatim).build();
        let (tx, rx) = mpsc::channel();
        assert!(route_line(&rt, "REPLY-4 done\r\n", &tx));
        assert!(route_line(&rt, "set a = 1\n", &tx));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["set a = 1".to_string()]);

        drop(rx);
        assert!(!route_line(&rt, "print x\n", &tx));
    }

    #[test]
    fn test_command_worker_runs_lines_in_order() {
        let rt = Runtime::builder().name("w").expander(Verbatim).build();
        let tx = spawn_command_worker(Arc::downgrade(&rt), "test").unwrap();
        tx.send("set first = 1".into()).unwrap();
        tx.send("set second = @first".into()).unwrap();
        drop(tx);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while rt.variable("second").is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(rt.variable("first"), "1");
        assert_eq!(rt.variable("second"), "@first");
    }
}
