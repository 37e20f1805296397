//! Event fan-out to live channels
//!
//! Each channel owns a writer thread fed by a bounded queue, so a slow or
//! stuck peer never holds up the others. A write error, or a queue that
//! fills up because the sink stopped reading, removes that channel only.
//!
//! Until the first connect channel exists, broadcast lines are kept in a
//! buffer. The buffer is replayed into the first connect channel that comes
//! up, or dropped once its timeout passes. Channel registration and the
//! buffer-or-send decision happen under one lock, so a line is never lost or
//! delivered twice while a channel is being added.

use super::Event;
use std::io::Write;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// How long buffered events wait for a channel before being dropped
pub const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_secs(10);

/// Lines a channel may have queued before it counts as stuck
pub const CHANNEL_QUEUE_LIMIT: usize = 4096;

pub type ChannelId = u64;

/// Role of a channel on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Outbound socket dialed at startup; receives events and requests
    Connect,
    /// Process stdout when `print_events` is on; live events only
    Stdout,
}

impl ChannelKind {
    /// Whether this channel ends buffering and receives the replay
    fn drains_buffer(&self) -> bool {
        matches!(self, ChannelKind::Connect)
    }
}

struct Channel {
    id: ChannelId,
    kind: ChannelKind,
    label: String,
    queue: SyncSender<Arc<str>>,
    writer: thread::JoinHandle<()>,
}

struct Backlog {
    lines: Vec<Arc<str>>,
    deadline: Instant,
}

#[derive(Default)]
struct BusState {
    next_id: ChannelId,
    channels: Vec<Channel>,
    backlog: Option<Backlog>,
}

impl BusState {
    fn has_receivers(&self) -> bool {
        self.channels.iter().any(|c| c.kind.drains_buffer())
    }

    /// Drop the backlog if it outlived its deadline
    fn expire(&mut self, now: Instant) {
        if let Some(backlog) = &self.backlog {
            if now >= backlog.deadline {
                tracing::debug!(
                    event = "event_buffer_expired",
                    dropped = backlog.lines.len()
                );
                self.backlog = None;
            }
        }
    }

    /// Queue `line` on every channel picked by `filter`; channels that are
    /// full or gone are removed. Returns how many took the line.
    fn push(&mut self, line: &Arc<str>, filter: impl Fn(&Channel) -> bool) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for channel in self.channels.iter().filter(|&c| filter(c)) {
            match channel.queue.try_send(Arc::clone(line)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(event = "channel_overflow", channel = %channel.label);
                    dead.push(channel.id);
                }
                Err(TrySendError::Disconnected(_)) => dead.push(channel.id),
            }
        }
        if !dead.is_empty() {
            self.channels.retain(|c| !dead.contains(&c.id));
        }
        delivered
    }
}

struct Shared {
    instance: String,
    buffer_timeout: Duration,
    state: Mutex<BusState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: ChannelId) -> bool {
        let mut state = self.lock();
        let before = state.channels.len();
        state.channels.retain(|c| c.id != id);
        before != state.channels.len()
    }
}

/// Broadcasts formatted event lines to every live channel
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    pub fn new(instance: impl Into<String>) -> Self {
        Self::with_buffer_timeout(instance, DEFAULT_BUFFER_TIMEOUT)
    }

    pub fn with_buffer_timeout(instance: impl Into<String>, buffer_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                instance: instance.into(),
                buffer_timeout,
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Instance id printed in every event line
    pub fn instance(&self) -> &str {
        &self.shared.instance
    }

    /// Format and broadcast `event`. Returns false if the event was suppressed.
    pub fn send(&self, event: &Event) -> bool {
        match event.format(&self.shared.instance) {
            Some(line) => {
                self.broadcast(&line);
                true
            }
            None => false,
        }
    }

    /// Deliver `line` to all channels, or buffer it while no connect channel exists
    pub fn broadcast(&self, line: &str) {
        let line: Arc<str> = Arc::from(line);
        let now = Instant::now();
        let mut state = self.shared.lock();

        if !state.has_receivers() {
            state.expire(now);
            let deadline = now + self.shared.buffer_timeout;
            state
                .backlog
                .get_or_insert_with(|| Backlog {
                    lines: Vec::new(),
                    deadline,
                })
                .lines
                .push(Arc::clone(&line));
        }

        state.push(&line, |_| true);
    }

    /// Deliver `line` only to channels of `kind`; returns how many got it.
    ///
    /// Nothing is buffered. Used for request lines that only make sense to a
    /// live peer.
    pub fn send_to(&self, kind: ChannelKind, line: &str) -> usize {
        let line: Arc<str> = Arc::from(line);
        self.shared.lock().push(&line, |c| c.kind == kind)
    }

    /// Register a channel writing to `sink`.
    ///
    /// A connect channel receives the pending backlog (in order) before any
    /// later line, and the backlog is discarded.
    pub fn add_channel<W>(&self, kind: ChannelKind, label: impl Into<String>, sink: W) -> ChannelId
    where
        W: Write + Send + 'static,
    {
        let label = label.into();

        let mut state = self.shared.lock();
        let id = state.next_id;
        state.next_id += 1;

        let mut replay = Vec::new();
        if kind.drains_buffer() {
            state.expire(Instant::now());
            if let Some(backlog) = state.backlog.take() {
                tracing::debug!(
                    event = "event_buffer_replay",
                    channel = %label,
                    lines = backlog.lines.len()
                );
                replay = backlog.lines;
            }
        }

        let (tx, rx) = mpsc::sync_channel::<Arc<str>>(CHANNEL_QUEUE_LIMIT + replay.len());
        for line in replay {
            let _ = tx.try_send(line);
        }

        let weak = Arc::downgrade(&self.shared);
        let writer_label = label.clone();
        let writer = thread::spawn(move || write_loop(weak, id, writer_label, sink, rx));

        state.channels.push(Channel {
            id,
            kind,
            label,
            queue: tx,
            writer,
        });
        drop(state);

        tracing::debug!(event = "channel_added", id, kind = ?kind);
        id
    }

    /// Remove a channel; its writer finishes the queued lines and stops
    pub fn remove_channel(&self, id: ChannelId) -> bool {
        self.shared.remove(id)
    }

    /// Remove every channel of `kind`
    pub fn remove_kind(&self, kind: ChannelKind) -> usize {
        let mut state = self.shared.lock();
        let before = state.channels.len();
        state.channels.retain(|c| c.kind != kind);
        before - state.channels.len()
    }

    /// Remove every channel and wait until each writer has flushed its queue
    pub fn close(&self) {
        let channels = std::mem::take(&mut self.shared.lock().channels);
        for channel in channels {
            let Channel { label, queue, writer, .. } = channel;
            drop(queue);
            if writer.join().is_err() {
                tracing::warn!(event = "channel_writer_panicked", channel = %label);
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.shared.lock().channels.len()
    }

    pub fn count_kind(&self, kind: ChannelKind) -> usize {
        self.shared.lock().channels.iter().filter(|c| c.kind == kind).count()
    }

    pub fn channel_labels(&self) -> Vec<String> {
        self.shared.lock().channels.iter().map(|c| c.label.clone()).collect()
    }

    /// Lines currently waiting for a channel (expired lines count as gone)
    pub fn buffered(&self) -> usize {
        let mut state = self.shared.lock();
        state.expire(Instant::now());
        state.backlog.as_ref().map_or(0, |b| b.lines.len())
    }
}

fn write_loop<W: Write>(
    shared: Weak<Shared>,
    id: ChannelId,
    label: String,
    mut sink: W,
    queue: mpsc::Receiver<Arc<str>>,
) {
    for line in queue {
        let result = sink
            .write_all(line.as_bytes())
            .and_then(|_| sink.flush());

        if let Err(e) = result {
            tracing::warn!(event = "channel_write_failed", channel = %label, error = %e);
            if let Some(shared) = shared.upgrade() {
                shared.remove(id);
            }
            return;
        }
    }
    tracing::debug!(event = "channel_closed", channel = %label);
}
