//! Control socket
//!
//! A Unix stream listener in a private directory. Each client gets its own
//! thread; every command line is answered with its result and a newline.

use super::{handle_line, read_lines};
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// A listening control socket
pub struct ControlSocket {
    path: PathBuf,
    closed: Arc<AtomicBool>,
}

/// Create `dir` with owner-only permissions if it does not exist yet
pub(super) fn create_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create socket directory {}", dir.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(dir)?.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(dir, perms)?;
        }
    }
    Ok(())
}

impl ControlSocket {
    /// Bind `<dir>/webctl_socket_<name>` and start accepting clients
    pub fn bind(rt: &Arc<Runtime>, dir: &Path) -> Result<Self> {
        create_private_dir(dir)?;

        let path = dir.join(format!("webctl_socket_{}", rt.name()));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("cannot bind control socket {}", path.display()))?;
        listener.set_nonblocking(true)?;

        let closed = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(rt);
        let flag = Arc::clone(&closed);
        thread::Builder::new()
            .name("webctl-socket".into())
            .spawn(move || accept_loop(weak, listener, flag))?;

        tracing::info!(event = "socket_created", path = %path.display());
        Ok(Self { path, closed })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting and unlink the socket. Connected clients stay served.
    pub fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!(event = "socket_unlink_failed", error = %e);
        }
    }
}

fn accept_loop(rt: Weak<Runtime>, listener: UnixListener, closed: Arc<AtomicBool>) {
    while !closed.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    tracing::warn!(event = "socket_client_rejected", error = %e);
                    continue;
                }
                let rt = rt.clone();
                let spawned = thread::Builder::new()
                    .name("webctl-client".into())
                    .spawn(move || serve_client(rt, stream));
                if let Err(e) = spawned {
                    tracing::warn!(event = "socket_client_rejected", error = %e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if rt.strong_count() == 0 {
                    break;
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::warn!(event = "socket_accept_failed", error = %e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    tracing::debug!(event = "socket_closed");
}

fn serve_client(rt: Weak<Runtime>, stream: UnixStream) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            tracing::warn!(event = "socket_client_rejected", error = %e);
            return;
        }
    };
    tracing::debug!(event = "socket_client_connected");

    let result = read_lines(BufReader::new(stream), |line| {
        let Some(rt) = rt.upgrade() else {
            return false;
        };
        match handle_line(&rt, line) {
            Some(mut result) => {
                result.push('\n');
                writer
                    .write_all(result.as_bytes())
                    .and_then(|_| writer.flush())
                    .is_ok()
            }
            None => true,
        }
    });

    if let Err(e) = result {
        tracing::debug!(event = "socket_client_error", error = %e);
    }
    tracing::debug!(event = "socket_client_disconnected");
}
