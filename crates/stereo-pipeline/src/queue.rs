//! The bounded evict-oldest message queue.
//!
//! The producer never blocks indefinitely: pushing into a full queue drops
//! the oldest message first. Ordering among surviving messages is FIFO by
//! enqueue time. The consumer can drain to the newest message when it falls
//! behind, because a fresh depth map matters more than showing every frame.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::time::Duration;

#[derive(Clone)]
pub struct BoundedLatestQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> BoundedLatestQueue<T> {
    /// `capacity` must be at least 1 (enforced by `SupervisorConfig`).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue `msg`, evicting the oldest queued message when full.
    /// Returns how many messages were evicted (0 or 1 in the single-producer
    /// topology).
    pub fn push_evicting(&self, msg: T) -> usize {
        let mut msg = msg;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    msg = back;
                    if self.rx.try_recv().is_ok() {
                        evicted += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Block up to `timeout` for one message, then drain to the newest.
    pub fn recv_latest(&self, timeout: Duration) -> Option<T> {
        let mut latest = self.rx.recv_timeout(timeout).ok()?;
        while let Ok(next) = self.rx.try_recv() {
            latest = next;
        }
        Some(latest)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_producer_leaves_only_the_newest() {
        let queue = BoundedLatestQueue::new(1);
        let mut evicted = 0;
        for i in 0..5 {
            evicted += queue.push_evicting(i);
        }
        assert_eq!(evicted, 4);
        assert_eq!(queue.recv_timeout(Duration::from_millis(10)), Some(4));
        assert!(queue.is_empty());
    }

    #[test]
    fn fifo_order_among_survivors() {
        let queue = BoundedLatestQueue::new(3);
        for i in 0..5 {
            queue.push_evicting(i);
        }
        // 0 and 1 were evicted; 2, 3, 4 remain in enqueue order.
        assert_eq!(queue.try_recv(), Some(2));
        assert_eq!(queue.try_recv(), Some(3));
        assert_eq!(queue.try_recv(), Some(4));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn recv_latest_drains_backlog() {
        let queue = BoundedLatestQueue::new(4);
        for i in 0..4 {
            queue.push_evicting(i);
        }
        assert_eq!(queue.recv_latest(Duration::from_millis(10)), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn recv_latest_times_out_when_empty() {
        let queue: BoundedLatestQueue<u32> = BoundedLatestQueue::new(2);
        assert_eq!(queue.recv_latest(Duration::from_millis(5)), None);
    }

    #[test]
    fn producer_never_blocks_across_threads() {
        let queue = BoundedLatestQueue::new(1);
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    queue.push_evicting(i);
                }
            })
        };
        producer.join().expect("producer finishes without a consumer");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_recv(), Some(999));
    }
}
