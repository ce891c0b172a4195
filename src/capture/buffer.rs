use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::capture::frame::Frame;

/// Bounded frame queue decoupling capture cadence from analysis cadence.
///
/// Overflow policy is drop-oldest: the pipeline offers newest-data-wins
/// semantics, not lossless delivery. Surviving frames keep FIFO order.
pub struct FrameBuffer {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
}

struct Inner {
    queue: VecDeque<Frame>,
    total_frames: u64,
    dropped_frames: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BufferStatus {
    pub occupancy: usize,
    pub capacity: usize,
    pub total_frames: u64,
    pub dropped_frames: u64,
}

impl FrameBuffer {
    pub const DEFAULT_CAPACITY: usize = 30;

    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                total_frames: 0,
                dropped_frames: 0,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Non-blocking insert. When the buffer is full the single oldest entry
    /// is evicted before the new frame goes in.
    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().expect("frame buffer lock poisoned");
        if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
            inner.dropped_frames += 1;
        }
        inner.queue.push_back(frame);
        inner.total_frames += 1;
        drop(inner);
        self.available.notify_one();
    }

    /// Blocks up to `timeout` for the next frame, `None` on timeout.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        let mut inner = self.inner.lock().expect("frame buffer lock poisoned");
        loop {
            if let Some(frame) = inner.queue.pop_front() {
                return Some(frame);
            }
            let (guard, wait) = self
                .available
                .wait_timeout(inner, timeout)
                .expect("frame buffer lock poisoned");
            inner = guard;
            if wait.timed_out() {
                return inner.queue.pop_front();
            }
        }
    }

    /// Discards everything but the most recent frame and returns it, for
    /// consumers that only care about "now".
    pub fn drain_latest(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().expect("frame buffer lock poisoned");
        let latest = inner.queue.pop_back();
        inner.queue.clear();
        latest
    }

    /// Empties the queue, used on shutdown.
    pub fn drain(&self) -> Vec<Frame> {
        let mut inner = self.inner.lock().expect("frame buffer lock poisoned");
        inner.queue.drain(..).collect()
    }

    pub fn status(&self) -> BufferStatus {
        let inner = self.inner.lock().expect("frame buffer lock poisoned");
        BufferStatus {
            occupancy: inner.queue.len(),
            capacity: self.capacity,
            total_frames: inner.total_frames,
            dropped_frames: inner.dropped_frames,
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
