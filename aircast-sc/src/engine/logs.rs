//! Bounded console log buffer
//!
//! Keeps the most recent engine and encoder output lines for the control
//! API. The buffer applies a drop-oldest policy so the drain tasks feeding
//! it never block, which would stall detection of process exit.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DEFAULT_CAPACITY: usize = 300;

/// Shared rolling buffer of timestamped log lines
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest entries beyond capacity.
    pub fn push(&self, msg: &str) {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {}", ts, msg);
        let mut buf = self.inner.lock().expect("log buffer poisoned");
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(line);
    }

    /// Return the last `limit` lines (oldest first); `0` returns everything.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let buf = self.inner.lock().expect("log buffer poisoned");
        if limit == 0 || limit >= buf.len() {
            return buf.iter().cloned().collect();
        }
        buf.iter().skip(buf.len() - limit).cloned().collect()
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
