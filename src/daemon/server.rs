//! Cookie daemon server: the jar behind a seqpacket listener

use crate::daemon::config::CookieDaemonConfig;
use crate::daemon::jar::CookieJar;
use crate::daemon::protocol::{encode_reply, CookieRequest, MAX_PACKET_SIZE};
use crate::daemon::{accept_seqpacket, listen_seqpacket};
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal;
use nix::sys::socket::{recv, send, MsgFlags};
use std::fs;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// How often the accept loop checks the shutdown flag
const ACCEPT_POLL_MS: u16 = 100;

/// Cookie daemon server
pub struct CookieDaemon {
    socket_path: PathBuf,
    store: Option<PathBuf>,
    verbose: bool,
    jar: Arc<Mutex<CookieJar>>,
    listener: Option<OwnedFd>,
    shutdown: Arc<AtomicBool>,
}

impl CookieDaemon {
    /// Create a daemon, loading the jar from the store file if there is one
    pub fn new(config: CookieDaemonConfig) -> Result<Self> {
        let jar = match &config.store {
            Some(store) => CookieJar::load(store)?,
            None => CookieJar::new(),
        };
        tracing::info!(event = "cookie_jar_loaded", cookies = jar.len());

        Ok(Self {
            socket_path: config.socket_path,
            store: config.store,
            verbose: config.verbose,
            jar: Arc::new(Mutex::new(jar)),
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Flag that stops the accept loop when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Install handlers, bind and serve until SIGINT or SIGTERM
    pub fn start(&mut self) -> Result<()> {
        self.setup_signal_handlers()?;
        self.bind()?;
        self.serve()
    }

    fn setup_signal_handlers(&self) -> Result<()> {
        signal_hook::flag::register(signal::SIGTERM as i32, Arc::clone(&self.shutdown))?;
        signal_hook::flag::register(signal::SIGINT as i32, Arc::clone(&self.shutdown))?;
        Ok(())
    }

    /// Create the socket directory (0700), remove a stale socket and listen
    pub fn bind(&mut self) -> Result<()> {
        if let Some(dir) = self.socket_path.parent().filter(|d| !d.exists()) {
            fs::create_dir_all(dir)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(dir)?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(dir, perms)?;
            }
        }

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)?;
        }

        let listener = listen_seqpacket(&self.socket_path)
            .with_context(|| format!("cannot listen on {}", self.socket_path.display()))?;
        tracing::info!(event = "cookie_daemon_listening", path = %self.socket_path.display());
        self.listener = Some(listener);
        Ok(())
    }

    /// Accept loop; each connection is served on its own thread
    pub fn serve(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .context("cookie daemon socket not bound")?;

        while !self.shutdown.load(Ordering::Relaxed) {
            let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(ACCEPT_POLL_MS)) {
                Ok(0) | Err(Errno::EINTR) => continue,
                Ok(_) => {}
                Err(e) => return Err(e).context("poll on cookie daemon socket"),
            }

            match accept_seqpacket(&listener) {
                Ok(conn) => {
                    let jar = Arc::clone(&self.jar);
                    let store = self.store.clone();
                    let verbose = self.verbose;
                    thread::spawn(move || serve_connection(conn, jar, store, verbose));
                }
                Err(e) => tracing::warn!(event = "cookie_accept_failed", error = %e),
            }
        }

        tracing::info!(event = "cookie_daemon_stopping");
        self.listener = Some(listener);
        Ok(())
    }
}

impl Drop for CookieDaemon {
    fn drop(&mut self) {
        if let Some(store) = &self.store {
            let jar = self.jar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = jar.save(store) {
                tracing::warn!(event = "cookie_jar_save_failed", error = %e);
            }
        }
        if self.socket_path.exists() {
            let _ = fs::remove_file(&self.socket_path);
        }
    }
}

/// Answer one request against the jar
pub fn handle_request(jar: &mut CookieJar, request: &CookieRequest) -> String {
    match request {
        CookieRequest::Get { host, path, .. } => jar.header(host, path),
        CookieRequest::Put {
            domain,
            path,
            cookie,
            ..
        } => {
            if !jar.put(domain, path, cookie) {
                tracing::debug!(event = "cookie_rejected", domain = %domain, cookie = %cookie);
            }
            String::new()
        }
    }
}

fn serve_connection(
    conn: OwnedFd,
    jar: Arc<Mutex<CookieJar>>,
    store: Option<PathBuf>,
    verbose: bool,
) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        let read = match recv(conn.as_raw_fd(), &mut buf, MsgFlags::empty()) {
            Ok(0) => break,
            Ok(n) => n,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                tracing::warn!(event = "cookie_read_failed", error = %e);
                break;
            }
        };

        let request = match CookieRequest::decode(&buf[..read]) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(event = "cookie_request_malformed", error = %e);
                continue;
            }
        };
        if verbose {
            tracing::info!(event = "cookie_request", request = ?request);
        }

        let reply = {
            let mut jar = jar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let reply = handle_request(&mut jar, &request);
            if let (CookieRequest::Put { .. }, Some(store)) = (&request, &store) {
                if let Err(e) = jar.save(store) {
                    tracing::warn!(event = "cookie_jar_save_failed", error = %e);
                }
            }
            reply
        };

        if let Err(e) = send(conn.as_raw_fd(), &encode_reply(&reply), MsgFlags::MSG_NOSIGNAL) {
            tracing::debug!(event = "cookie_reply_failed", error = %e);
            break;
        }
    }
    tracing::debug!(event = "cookie_client_hung_up");
}
