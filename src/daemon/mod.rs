/// Cookie daemon: a long-lived process holding the cookie jar, reached over
/// a `SOCK_SEQPACKET` Unix socket.
///
/// - `protocol`: NUL-delimited request and reply packets
/// - `client`: lazy-connecting client with a poll deadline and one retry
/// - `jar`: in-memory cookie store with optional JSON persistence
/// - `server`: accept loop and per-connection workers (`webctl-cookied`)
/// - `config`: daemon command line and default paths

pub mod client;
pub mod config;
pub mod jar;
pub mod protocol;
pub mod server;

pub use client::{CookieClient, POLL_TIMEOUT_MS};
pub use config::CookieDaemonConfig;
pub use jar::{Cookie, CookieJar};
pub use protocol::{decode_reply, encode_reply, CookieRequest, MAX_PACKET_SIZE};
pub use server::CookieDaemon;

use nix::sys::socket::{bind, listen, socket, AddressFamily, Backlog, SockFlag, SockType, UnixAddr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

/// Bind and listen on a `SOCK_SEQPACKET` socket at `path`
pub fn listen_seqpacket(path: &Path) -> nix::Result<OwnedFd> {
    let fd = socket(
        AddressFamily::Unix,
        SockType::SeqPacket,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    let addr = UnixAddr::new(path)?;
    bind(fd.as_raw_fd(), &addr)?;
    listen(&fd, Backlog::MAXCONN)?;
    Ok(fd)
}

/// Accept one connection on a listener from [`listen_seqpacket`]
pub fn accept_seqpacket(listener: &OwnedFd) -> nix::Result<OwnedFd> {
    let fd = nix::sys::socket::accept4(listener.as_raw_fd(), SockFlag::SOCK_CLOEXEC)?;
    // SAFETY: accept4 returned a fresh descriptor nobody else owns
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
