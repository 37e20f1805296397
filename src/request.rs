//! Synchronous request/reply over the connect channels
//!
//! A request goes out as `REQUEST-<cookie> <name> <fields...>` and the
//! caller blocks until a line `REPLY-<cookie> <body>` comes back on any
//! channel, or the deadline passes. Only one request is in flight at a time;
//! concurrent callers queue up behind it.
//!
//! The wait blocks the calling thread. Event delivery and the other channels
//! keep going meanwhile, and a connect channel keeps reading while its
//! command worker waits, so the peer that got the request can answer it.

use crate::events::{format_fields, ChannelKind, EventBus, Field};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default deadline for requests issued by built-in commands
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the request line, or `None` if it would contain a raw newline
pub fn request_line(cookie: u32, name: &str, fields: &[Field]) -> Option<String> {
    let mut line = format!("REQUEST-{} {}", cookie, name);
    if !fields.is_empty() {
        line.push(' ');
        line.push_str(&format_fields(fields)?);
    }
    if line.contains('\n') {
        return None;
    }
    line.push('\n');
    Some(line)
}

/// Body of `reply` if it answers `cookie`
pub fn match_reply(reply: &str, cookie: u32) -> Option<String> {
    let rest = reply.strip_prefix("REPLY-")?;
    let rest = rest.strip_prefix(cookie.to_string().as_str())?;
    if rest.is_empty() {
        return Some(String::new());
    }
    rest.strip_prefix(' ').map(str::to_string)
}

/// The single reply slot shared by channel readers and the waiting caller
#[derive(Default)]
pub struct Requests {
    in_flight: Mutex<()>,
    slot: Mutex<Option<String>>,
    ready: Condvar,
}

impl Requests {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a `REPLY-` line, replacing any unread one, and wake the waiter
    pub fn set_reply(&self, line: &str) {
        *self.slot() = Some(line.to_string());
        self.ready.notify_all();
    }

    /// Send a request through `bus` and wait up to `timeout` for its reply.
    ///
    /// Returns the reply body, or an empty string on timeout, on a malformed
    /// request, or when nothing answers.
    pub fn send(&self, bus: &EventBus, timeout: Duration, name: &str, fields: &[Field]) -> String {
        let _turn = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let deadline = Instant::now() + timeout;

        let cookie: u32 = rand::random();
        let line = match request_line(cookie, name, fields) {
            Some(line) => line,
            None => {
                tracing::warn!(event = "request_refused", request = %name, "request would contain a newline");
                return String::new();
            }
        };

        // Anything left over belongs to an earlier, abandoned request
        self.slot().take();

        let delivered = bus.send_to(ChannelKind::Connect, &line);
        if delivered == 0 {
            tracing::debug!(event = "request_no_peer", request = %name, cookie);
        }

        self.wait(cookie, deadline).unwrap_or_else(|| {
            tracing::debug!(event = "request_timeout", request = %name, cookie);
            String::new()
        })
    }

    /// Wait for the reply to `cookie` until `deadline`.
    ///
    /// Every reply that arrives is consumed; mismatching ones are dropped and
    /// the wait goes on.
    pub fn wait(&self, cookie: u32, deadline: Instant) -> Option<String> {
        let mut slot = self.slot();
        loop {
            if let Some(reply) = slot.take() {
                if let Some(body) = match_reply(&reply, cookie) {
                    return Some(body);
                }
                tracing::debug!(event = "stale_reply_dropped", cookie);
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}
