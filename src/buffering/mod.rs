//! Frame hand-off between the capture and processing threads.
//!
//! `FrameQueue` is the only state shared between the two threads. The
//! producer side never blocks; the consumer side blocks in [`FrameQueue::pop`]
//! until a frame arrives or the queue is closed. `close()` wakes a parked
//! consumer immediately — shutdown never waits for the next natural wake-up.

pub mod frame;

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::error::{CaptureError, Result};
use frame::PcmFrame;

/// Result of a non-blocking [`FrameQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame was enqueued in FIFO order.
    Enqueued,
    /// The bounded queue was full; the incoming frame was discarded.
    /// Frames already accepted keep their order — the drop policy never
    /// reorders or duplicates.
    Dropped,
}

struct QueueState {
    frames: VecDeque<PcmFrame>,
    closed: bool,
    dropped: u64,
}

/// Bounded or unbounded FIFO hand-off for one producer and one consumer.
///
/// The default (capacity `None`) is unbounded: no frame is ever dropped and
/// backpressure is bounded only by memory, matching the latency-over-loss
/// choice of the capture path. A bounded queue instead discards the incoming
/// frame when full and counts the drop.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: Option<usize>,
}

impl FrameQueue {
    /// Queue that grows without limit. Never drops a frame.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// Queue holding at most `capacity` frames; see [`PushOutcome::Dropped`]
    /// for the overflow policy.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a frame without blocking.
    ///
    /// # Errors
    /// `CaptureError::QueueClosed` once [`close`](Self::close) has been called.
    pub fn push(&self, frame: PcmFrame) -> Result<PushOutcome> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CaptureError::QueueClosed);
        }
        if let Some(cap) = self.capacity {
            if state.frames.len() >= cap {
                state.dropped += 1;
                warn!(
                    capacity = cap,
                    dropped_total = state.dropped,
                    "frame queue full: dropped incoming frame"
                );
                return Ok(PushOutcome::Dropped);
            }
        }
        state.frames.push_back(frame);
        drop(state);
        self.available.notify_one();
        Ok(PushOutcome::Enqueued)
    }

    /// Dequeue the oldest frame, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed *and* drained — remaining
    /// frames are always delivered before the shutdown signal.
    pub fn pop(&self) -> Option<PcmFrame> {
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Dequeue without blocking.
    pub fn try_pop(&self) -> Option<PcmFrame> {
        self.state.lock().frames.pop_front()
    }

    /// Close the queue and wake any parked consumer.
    ///
    /// Idempotent. After close, `push` fails and `pop` drains then returns
    /// `None`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Frames currently waiting to be consumed.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames discarded by the bounded overflow policy.
    pub fn dropped_frames(&self) -> u64 {
        self.state.lock().dropped
    }
}
