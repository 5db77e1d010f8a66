//! Shared tunnel status and bounded output history.
//!
//! The launcher and the output parser are the only writers; the HTTP layer
//! reads through [`StatusStore::snapshot`]. Both the status fields and the log
//! tail live behind one lock, so a snapshot is always taken at a single point
//! in time.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of most recent output lines kept for `/status`.
pub const LOG_TAIL_LINES: usize = 200;

/// Health of the tunnel process as reported on `/status`.
///
/// `online` is only ever set together with a non-empty `public_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    /// Whether the tunnel has reported a public endpoint
    pub online: bool,
    /// Last `udp://` endpoint seen in the process output
    pub public_url: Option<String>,
    /// First error observed, empty when there is none
    pub error: String,
    /// Set once the process has exited or failed to start
    pub process_exited: bool,
    /// OS process id of the running tunnel binary
    pub pid: Option<u32>,
}

/// Point-in-time copy of [`TunnelStatus`] plus the log tail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub status: TunnelStatus,
    /// Output lines, oldest first
    pub log_tail: Vec<String>,
}

/// FIFO of output lines that evicts the oldest entry once full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(LOG_TAIL_LINES)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    status: TunnelStatus,
    logs: LogBuffer,
}

/// Cloneable handle to the process-wide tunnel state.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<Mutex<Inner>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Writers only assign plain fields, so a poisoned guard still holds
        // consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            status: inner.status.clone(),
            log_tail: inner.logs.to_vec(),
        }
    }

    pub fn status(&self) -> TunnelStatus {
        self.lock().status.clone()
    }

    /// Applies `f` to the status and log buffer under a single lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut TunnelStatus, &mut LogBuffer) -> R) -> R {
        let mut inner = self.lock();
        let Inner { status, logs } = &mut *inner;
        f(status, logs)
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status, _| status.error = message);
    }

    pub fn set_pid(&self, pid: u32) {
        self.update(|status, _| status.pid = Some(pid));
    }

    /// Records process termination. A non-zero exit code becomes the error
    /// unless an earlier one was already captured.
    pub fn mark_exited(&self, code: Option<i32>) {
        self.update(|status, _| {
            status.process_exited = true;
            if let Some(code) = code.filter(|code| *code != 0)
                && status.error.is_empty()
            {
                status.error = format!("localxpose exited with code {code}");
            }
        });
    }
}
