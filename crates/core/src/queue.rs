//! Concurrent hand-off queue for annotated samples.
//!
//! Decouples the demux/inference side from the render side: the producer
//! pushes finished [`Sample`]s, the consumer peeks and pops on its render
//! tick. Backed by a mutex-guarded deque with a condvar so a consumer can
//! wait for data with a bounded timeout instead of spinning.
//!
//! The queue owns every sample it holds: pushed samples belong to the queue
//! until popped, and closing the queue discards whatever is left.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::sample::Sample;

/// FIFO of annotated samples shared between one producer and one consumer.
pub struct SampleQueue {
    samples: Mutex<VecDeque<Sample>>,
    available: Condvar,
    eos: AtomicBool,
    closed: AtomicBool,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            eos: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a sample. Returns false when the queue is closed, in which
    /// case the sample is dropped.
    pub fn push(&self, sample: Sample) -> bool {
        let mut samples = self.samples.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        samples.push_back(sample);
        self.available.notify_one();
        true
    }

    /// Take the oldest sample, if any.
    pub fn pop(&self) -> Option<Sample> {
        self.samples.lock().pop_front()
    }

    /// Take the oldest sample, waiting up to `timeout` for one to arrive.
    ///
    /// Returns immediately with `None` when the queue is empty and either
    /// end-of-stream is marked or the queue is closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Sample> {
        let mut samples = self.samples.lock();
        if samples.is_empty() {
            if self.eos.load(Ordering::Acquire) || self.closed.load(Ordering::Acquire) {
                return None;
            }
            let result = self.available.wait_for(&mut samples, timeout);
            if result.timed_out() && samples.is_empty() {
                return None;
            }
        }
        samples.pop_front()
    }

    /// Presentation timestamp of the oldest sample without removing it.
    pub fn peek_pts(&self) -> Option<i64> {
        self.samples.lock().front().map(|s| s.pts_us())
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark that no further samples will arrive. Wakes blocked consumers.
    pub fn mark_eos(&self) {
        // Flag flips under the lock so a consumer between its empty check
        // and its wait cannot miss the wakeup.
        let _samples = self.samples.lock();
        self.eos.store(true, Ordering::Release);
        self.available.notify_all();
    }

    /// Whether end-of-stream has been marked.
    pub fn is_eos(&self) -> bool {
        self.eos.load(Ordering::Acquire)
    }

    /// Close the queue: discard buffered samples, refuse further pushes, and
    /// wake every waiter. Returns how many samples were discarded.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut samples = self.samples.lock();
            self.closed.store(true, Ordering::Release);
            let n = samples.len();
            samples.clear();
            n
        };
        self.available.notify_all();
        if discarded > 0 {
            tracing::debug!(discarded, "sample queue closed");
        }
        discarded
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::AccessUnit;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn make_sample(pts_us: i64) -> Sample {
        Sample::pending(AccessUnit::new(pts_us, vec![0u8; 2]))
    }

    #[test]
    fn fifo_order() {
        let q = SampleQueue::new();
        for pts in [0, 100, 200] {
            assert!(q.push(make_sample(pts)));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().map(|s| s.pts_us()), Some(0));
        assert_eq!(q.pop().map(|s| s.pts_us()), Some(100));
        assert_eq!(q.pop().map(|s| s.pts_us()), Some(200));
        assert_eq!(q.pop().map(|s| s.pts_us()), None);
    }

    #[test]
    fn peek_does_not_remove() {
        let q = SampleQueue::new();
        q.push(make_sample(42));
        assert_eq!(q.peek_pts(), Some(42));
        assert_eq!(q.peek_pts(), Some(42));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn pop_timeout_waits_then_gives_up() {
        let q = SampleQueue::new();
        let start = Instant::now();
        assert!(q.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn pop_timeout_woken_by_push() {
        let q = Arc::new(SampleQueue::new());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.push(make_sample(7));
            })
        };
        let sample = q.pop_timeout(Duration::from_secs(2));
        assert_eq!(sample.map(|s| s.pts_us()), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn eos_returns_none_without_waiting() {
        let q = SampleQueue::new();
        q.mark_eos();
        let start = Instant::now();
        assert!(q.pop_timeout(Duration::from_secs(5)).is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn eos_drains_remaining_samples_first() {
        let q = SampleQueue::new();
        q.push(make_sample(1));
        q.mark_eos();
        assert!(q.is_eos());
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).map(|s| s.pts_us()), Some(1));
        assert!(q.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn close_discards_and_refuses() {
        let q = SampleQueue::new();
        q.push(make_sample(1));
        q.push(make_sample(2));
        assert_eq!(q.close(), 2);
        assert!(q.is_closed());
        assert!(q.is_empty());
        assert!(!q.push(make_sample(3)), "push after close must be refused");
        assert_eq!(q.close(), 0, "second close discards nothing");
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let q = Arc::new(SampleQueue::new());
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.pop_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        q.close();
        let start = Instant::now();
        assert!(consumer.join().unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1), "close must wake the waiter");
    }

    #[test]
    fn threaded_transfer_preserves_order() {
        let q = Arc::new(SampleQueue::new());
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for pts in 0..200 {
                    assert!(q.push(make_sample(pts)));
                    if pts % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                q.mark_eos();
            })
        };

        let mut received = Vec::new();
        while let Some(sample) = q.pop_timeout(Duration::from_secs(2)) {
            received.push(sample.pts_us());
        }
        producer.join().unwrap();

        assert_eq!(received.len(), 200);
        assert!(received.windows(2).all(|w| w[0] < w[1]), "order must hold");
    }
}
