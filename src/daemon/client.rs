//! Cookie daemon client
//!
//! The connection is opened on first use and dropped after any failure, so
//! the next call reconnects. Older daemons close the connection after every
//! request; [`CookieClient::get`] therefore retries the round-trip once.

use crate::daemon::protocol::{decode_reply, CookieRequest};
use crate::error::CookieError;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{connect, recv, send, socket, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

/// How long to wait for the daemon's answer
pub const POLL_TIMEOUT_MS: u16 = 500;

/// Connection to the cookie daemon
pub struct CookieClient {
    path: Option<PathBuf>,
    fd: Option<OwnedFd>,
}

impl CookieClient {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, fd: None }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Point at another daemon; an open connection is dropped
    pub fn set_socket_path(&mut self, path: Option<PathBuf>) {
        if self.path != path {
            self.disconnect();
            self.path = path;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.fd.is_some()
    }

    /// Cookie header for a URL; empty when there are none or the daemon
    /// failed twice
    pub fn get(&mut self, scheme: &str, host: &str, path: &str) -> String {
        let request = CookieRequest::get(scheme, host, path);
        match self.round_trip(&request) {
            Ok(reply) => reply,
            Err(first) => {
                tracing::debug!(event = "cookie_get_retry", error = %first);
                self.round_trip(&request).unwrap_or_else(|e| {
                    tracing::warn!(event = "cookie_get_failed", host = %host, error = %e);
                    String::new()
                })
            }
        }
    }

    /// Store a `name=value` cookie; true once the daemon acknowledged it
    pub fn put(&mut self, scheme: &str, domain: &str, path: &str, cookie: &str) -> bool {
        let request = CookieRequest::put(scheme, domain, path, cookie);
        match self.round_trip(&request) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(event = "cookie_put_failed", domain = %domain, error = %e);
                false
            }
        }
    }

    /// Send one request and wait for its reply. Any failure disconnects.
    pub fn round_trip(&mut self, request: &CookieRequest) -> Result<String, CookieError> {
        self.ensure_connected()?;
        let result = match &self.fd {
            Some(fd) => exchange(fd, &request.encode()),
            None => Err(CookieError::NoSocket),
        };
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn ensure_connected(&mut self) -> Result<(), CookieError> {
        if self.fd.is_some() {
            return Ok(());
        }
        let path = self.path.as_ref().ok_or(CookieError::NoSocket)?;

        let fd = socket(
            AddressFamily::Unix,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(CookieError::Connect)?;
        let addr = UnixAddr::new(path.as_path()).map_err(CookieError::Connect)?;
        connect(fd.as_raw_fd(), &addr).map_err(CookieError::Connect)?;

        tracing::debug!(event = "cookie_daemon_connected", path = %path.display());
        self.fd = Some(fd);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.fd.take().is_some() {
            tracing::debug!(event = "cookie_daemon_disconnected");
        }
    }
}

fn exchange(fd: &OwnedFd, packet: &[u8]) -> Result<String, CookieError> {
    send(fd.as_raw_fd(), packet, MsgFlags::MSG_NOSIGNAL).map_err(CookieError::Send)?;

    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    loop {
        match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
            Ok(0) => return Err(CookieError::Timeout),
            Ok(_) => break,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(CookieError::Poll(e)),
        }
    }
    let revents = fds[0].revents().unwrap_or(PollFlags::empty());

    let pending = pending_bytes(fd.as_raw_fd())?;
    if pending == 0 && revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
        return Err(CookieError::HangUp);
    }

    // a zero-length packet is still consumed by the read
    let mut buf = vec![0u8; pending];
    let read = recv(fd.as_raw_fd(), &mut buf, MsgFlags::empty()).map_err(CookieError::Read)?;
    buf.truncate(read);
    Ok(decode_reply(&buf))
}

/// Size of the next packet waiting on `fd`
fn pending_bytes(fd: RawFd) -> Result<usize, CookieError> {
    let mut len: libc::c_int = 0;
    // SAFETY: FIONREAD stores one c_int through the pointer
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut len as *mut libc::c_int) };
    if rc == -1 {
        return Err(CookieError::Read(Errno::last()));
    }
    Ok(usize::try_from(len).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::{accept_seqpacket, encode_reply, listen_seqpacket, MAX_PACKET_SIZE};
    use std::thread;

    #[test]
    fn test_no_socket_configured() {
        let mut client = CookieClient::new(None);
        assert!(matches!(
            client.round_trip(&CookieRequest::get("http", "h", "/")),
            Err(CookieError::NoSocket)
        ));
        assert_eq!(client.get("http", "h", "/"), "");
        assert!(!client.put("http", "h", "/", "a=1"));
    }

    #[test]
    fn test_round_trip_keeps_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies");
        let listener = listen_seqpacket(&path).unwrap();

        let server = thread::spawn(move || {
            let conn = accept_seqpacket(&listener).unwrap();
            let mut buf = [0u8; MAX_PACKET_SIZE];
            for reply in ["a=1; b=2", ""] {
                let n = recv(conn.as_raw_fd(), &mut buf, MsgFlags::empty()).unwrap();
                assert!(n > 0);
                send(conn.as_raw_fd(), &encode_reply(reply), MsgFlags::empty()).unwrap();
            }
        });

        let mut client = CookieClient::new(Some(path));
        assert_eq!(client.get("http", "example.com", "/"), "a=1; b=2");
        assert!(client.is_connected());
        assert!(client.put("http", "example.com", "/", "c=3"));
        server.join().unwrap();
    }

    #[test]
    fn test_timeout_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent");
        let listener = listen_seqpacket(&path).unwrap();

        let mut client = CookieClient::new(Some(path));
        let server = thread::spawn(move || {
            let conn = accept_seqpacket(&listener).unwrap();
            thread::sleep(std::time::Duration::from_millis(POLL_TIMEOUT_MS as u64 + 300));
            drop(conn);
        });

        assert!(matches!(
            client.round_trip(&CookieRequest::get("http", "h", "/")),
            Err(CookieError::Timeout)
        ));
        assert!(!client.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_changing_path_drops_connection() {
        let mut client = CookieClient::new(Some(PathBuf::from("/nonexistent/a")));
        client.set_socket_path(Some(PathBuf::from("/nonexistent/b")));
        assert_eq!(client.socket_path(), Some(Path::new("/nonexistent/b")));
        assert!(matches!(
            client.round_trip(&CookieRequest::get("http", "h", "/")),
            Err(CookieError::Connect(_))
        ));
    }
}
