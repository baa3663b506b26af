/// Shared state between the supervisor and its output reader task.
///
/// One coarse `std::sync::Mutex` guards the line buffer, the readiness gate,
/// the stop signal and the reader liveness flag. A `Notify` wakes readiness
/// waiters when the gate opens or the reader dies; it never carries data.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

/// Bounded FIFO of trimmed log lines. Full buffer drops the incoming line.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append a line. Returns `false` (and counts a drop) when full.
    pub fn push(&mut self, line: String) -> bool {
        if self.lines.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.lines.push_back(line);
        true
    }

    /// Remove and return every buffered line, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines rejected since the last clear.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Everything behind the shared lock.
#[derive(Debug)]
pub struct SharedState {
    pub buffer: OutputBuffer,
    /// Readiness gate: set once per process lifetime by the reader.
    pub ready: bool,
    /// Cooperative stop signal, observed by the reader between reads.
    pub stop: bool,
    /// False once the reader task has returned for any reason.
    pub reader_alive: bool,
}

#[derive(Debug)]
pub struct Shared {
    state: Mutex<SharedState>,
    ready_set: Notify,
}

impl Shared {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SharedState {
                buffer: OutputBuffer::new(capacity),
                ready: false,
                stop: false,
                reader_alive: false,
            }),
            ready_set: Notify::new(),
        }
    }

    /// Take the shared lock. A poisoned lock is recovered; the state stays usable.
    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset for a fresh process: clear stop, close the gate, empty the buffer.
    pub fn reset_for_start(&self) {
        let mut state = self.lock();
        state.stop = false;
        state.ready = false;
        state.reader_alive = true;
        state.buffer.clear();
    }

    /// Push a trimmed line. Returns whether it was stored.
    pub fn push_line(&self, line: String) -> bool {
        self.lock().buffer.push(line)
    }

    /// Open the readiness gate. Returns `true` only on the first call.
    pub fn mark_ready(&self) -> bool {
        let first = {
            let mut state = self.lock();
            let first = !state.ready;
            state.ready = true;
            first
        };
        if first {
            self.ready_set.notify_waiters();
        }
        first
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn request_stop(&self) {
        self.lock().stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop
    }

    pub fn mark_reader_exited(&self) {
        self.lock().reader_alive = false;
        // Readiness waiters must not sleep on a gate that can no longer open.
        self.ready_set.notify_waiters();
    }

    pub fn reader_alive(&self) -> bool {
        self.lock().reader_alive
    }

    pub fn drain(&self) -> Vec<String> {
        self.lock().buffer.drain()
    }

    pub fn ready_set(&self) -> &Notify {
        &self.ready_set
    }
}
