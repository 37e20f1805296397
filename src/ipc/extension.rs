//! Extension socket
//!
//! Page extensions dial `<dir>/webctl_extension_<name>`. Every accepted
//! connection becomes an [`ExtensionLink`] that is greeted with `HELO` and
//! forwards focus notifications as events.

use super::socket::create_private_dir;
use crate::extio::{attach_extension, ExtensionLink};
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(10);

type Links = Arc<Mutex<Vec<Arc<ExtensionLink>>>>;

/// A listening extension socket and the links it accepted
pub struct ExtensionSocket {
    path: PathBuf,
    closed: Arc<AtomicBool>,
    links: Links,
}

impl ExtensionSocket {
    /// Bind `<dir>/webctl_extension_<name>` and start accepting extensions
    pub fn bind(rt: &Arc<Runtime>, dir: &Path) -> Result<Self> {
        create_private_dir(dir)?;

        let path = dir.join(format!("webctl_extension_{}", rt.name()));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("cannot bind extension socket {}", path.display()))?;
        listener.set_nonblocking(true)?;

        let closed = Arc::new(AtomicBool::new(false));
        let links: Links = Arc::default();
        let weak = Arc::downgrade(rt);
        let flag = Arc::clone(&closed);
        let accepted = Arc::clone(&links);
        thread::Builder::new()
            .name("webctl-extension".into())
            .spawn(move || accept_loop(weak, listener, flag, accepted))?;

        tracing::info!(event = "extension_socket_created", path = %path.display());
        Ok(Self {
            path,
            closed,
            links,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Links currently open
    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Stop accepting, close every link and unlink the socket
    pub fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
        let links = std::mem::take(&mut *self.links.lock().unwrap_or_else(|p| p.into_inner()));
        for link in links {
            link.close();
        }
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!(event = "extension_socket_unlink_failed", error = %e);
        }
    }
}

fn accept_loop(rt: Weak<Runtime>, listener: UnixListener, closed: Arc<AtomicBool>, links: Links) {
    while !closed.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let Some(runtime) = rt.upgrade() else {
                    break;
                };
                let attached = stream
                    .set_nonblocking(false)
                    .and_then(|_| attach_extension(&runtime, stream));
                match attached {
                    Ok(link) => links
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(link),
                    Err(e) => tracing::warn!(event = "extension_rejected", error = %e),
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if rt.strong_count() == 0 {
                    break;
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::warn!(event = "extension_accept_failed", error = %e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    tracing::debug!(event = "extension_socket_closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelKind;
    use crate::expand::Verbatim;
    use crate::extio::{read_message, write_message, ExtMessage};
    use std::io::{BufRead, BufReader, Read};
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    #[test]
    fn test_accepted_extension_reports_focus() {
        let dir = tempfile::tempdir().unwrap();
        let rt = Runtime::builder().name("e").expander(Verbatim).build();
        let (events_ours, events_theirs) = UnixStream::pair().unwrap();
        events_theirs.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        rt.bus().add_channel(ChannelKind::Connect, "test", events_ours);

        let socket = ExtensionSocket::bind(&rt, dir.path()).unwrap();
        assert!(socket.path().ends_with("webctl_extension_e"));

        let mut extension = UnixStream::connect(socket.path()).unwrap();
        extension.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(read_message(&mut extension).unwrap(), ExtMessage::Hello(1));
        write_message(&mut extension, &ExtMessage::Focus("textarea".into())).unwrap();

        let mut line = String::new();
        BufReader::new(events_theirs).read_line(&mut line).unwrap();
        assert_eq!(line, "EVENT [e] FOCUS_ELEMENT 'textarea'\n");

        let deadline = Instant::now() + Duration::from_secs(5);
        while socket.link_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(socket.link_count(), 1);

        let path = socket.path().to_path_buf();
        socket.close();
        assert!(!path.exists());
        let mut rest = Vec::new();
        assert_eq!(extension.read_to_end(&mut rest).unwrap(), 0);
    }
}
