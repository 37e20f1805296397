//! Command fifo
//!
//! The fifo is opened read-write so the reader never sees EOF when a writer
//! goes away. Any read failure aborts the instance.

use super::{handle_line, read_lines};
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

/// A named pipe feeding the dispatcher
pub struct FifoChannel {
    path: PathBuf,
    /// Our own write end, used to wake the reader on close
    waker: File,
    closed: Arc<AtomicBool>,
}

impl FifoChannel {
    /// Create `<dir>/webctl_fifo_<name>` and start reading it
    pub fn open(rt: &Arc<Runtime>, dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create fifo directory {}", dir.display()))?;

        let path = dir.join(format!("webctl_fifo_{}", rt.name()));
        if path.exists() {
            fs::remove_file(&path)?;
        }
        mkfifo(&path, Mode::from_bits_truncate(0o666))
            .with_context(|| format!("cannot create fifo {}", path.display()))?;

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let waker = file.try_clone()?;
        let closed = Arc::new(AtomicBool::new(false));

        let weak = Arc::downgrade(rt);
        let flag = Arc::clone(&closed);
        let label = path.display().to_string();
        thread::Builder::new()
            .name("webctl-fifo".into())
            .spawn(move || read_loop(weak, file, flag, label))?;

        tracing::info!(event = "fifo_created", path = %path.display());
        Ok(Self {
            path,
            waker,
            closed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the reader and unlink the fifo
    pub fn close(mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.waker.write_all(b"\n");
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::debug!(event = "fifo_unlink_failed", error = %e);
        }
    }
}

fn read_loop(rt: Weak<Runtime>, file: File, closed: Arc<AtomicBool>, label: String) {
    let result = read_lines(BufReader::new(file), |line| {
        if closed.load(Ordering::SeqCst) {
            return false;
        }
        match rt.upgrade() {
            Some(rt) => {
                handle_line(&rt, line);
                true
            }
            None => false,
        }
    });

    if closed.load(Ordering::SeqCst) {
        tracing::debug!(event = "fifo_closed", path = %label);
        return;
    }
    if let Some(rt) = rt.upgrade() {
        match result {
            Err(e) => rt.abort(&format!("error reading fifo {}: {}", label, e)),
            Ok(()) => rt.abort(&format!("fifo {} hung up", label)),
        }
    }
}
