//! Bounded sample queue between a writer thread and the device callback.
//!
//! - the writer blocks in [`SampleQueue::push_blocking`] while the queue is full
//! - the CPAL callback drains it without blocking via [`SampleQueue::pop_into`]
//!
//! `close()` wakes every waiter so shutdown and device errors never leave a writer
//! parked forever.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Thread-safe bounded FIFO of mono `i16` samples.
///
/// A single [`Condvar`] is used as a general "state changed" signal; the `closed`
/// flag lives under the same mutex as the samples to avoid lost wakeups.
pub struct SampleQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
    capacity: usize,
}

struct QueueInner {
    samples: VecDeque<i16>,
    closed: bool,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current buffered samples (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the queue closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    /// Drop every buffered sample and wake blocked writers.
    pub fn clear(&self) {
        self.lock().samples.clear();
        self.cv.notify_all();
    }

    /// Push all of `samples`, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted;
    /// the remainder is dropped.
    pub fn push_blocking(&self, samples: &[i16]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.closed {
                return false;
            }

            let room = self.capacity - g.samples.len();
            let end = (offset + room).min(samples.len());
            g.samples.extend(&samples[offset..end]);
            offset = end;

            drop(g);
            self.cv.notify_all();
        }
        !self.is_closed()
    }

    /// Move up to `max` samples into `out` without blocking.
    ///
    /// Returns the number of samples moved; `0` means the queue is currently empty.
    pub fn pop_into(&self, out: &mut Vec<i16>, max: usize) -> usize {
        let mut g = self.lock();
        let take = g.samples.len().min(max);
        out.extend(g.samples.drain(..take));
        drop(g);
        if take > 0 {
            self.cv.notify_all();
        }
        take
    }

    /// Block until the queue is empty.
    ///
    /// Returns `false` if the queue was closed while samples were still buffered.
    pub fn wait_until_empty(&self) -> bool {
        let mut g = self.lock();
        while !g.samples.is_empty() && !g.closed {
            g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
        }
        g.samples.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_then_pop_preserves_order() {
        let q = SampleQueue::new(8);
        assert!(q.push_blocking(&[1, 2, 3]));
        let mut out = Vec::new();
        assert_eq!(q.pop_into(&mut out, 2), 2);
        assert_eq!(q.pop_into(&mut out, 10), 1);
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(q.pop_into(&mut out, 10), 0);
    }

    #[test]
    fn full_queue_blocks_writer_until_drained() {
        let q = Arc::new(SampleQueue::new(4));
        let writer = {
            let q = q.clone();
            thread::spawn(move || q.push_blocking(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]))
        };

        let mut out = Vec::new();
        while out.len() < 10 {
            q.pop_into(&mut out, 3);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(writer.join().unwrap());
        assert_eq!(out, (1..=10).collect::<Vec<i16>>());
    }

    #[test]
    fn close_releases_blocked_writer() {
        let q = Arc::new(SampleQueue::new(2));
        let writer = {
            let q = q.clone();
            thread::spawn(move || q.push_blocking(&[1, 2, 3, 4]))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(!writer.join().unwrap());
        assert!(q.is_closed());
    }

    #[test]
    fn clear_discards_pending_samples() {
        let q = SampleQueue::new(16);
        q.push_blocking(&[5; 10]);
        q.clear();
        assert!(q.is_empty());
        assert!(q.wait_until_empty());
    }

    #[test]
    fn wait_until_empty_reports_closed_backlog() {
        let q = SampleQueue::new(16);
        q.push_blocking(&[5; 4]);
        q.close();
        assert!(!q.wait_until_empty());
    }
}
