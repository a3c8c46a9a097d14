//! Bounded work queue and results queue connecting the pipeline stages
//!
//! The work queue is a bounded `tokio::sync::mpsc` channel whose single
//! receiver is shared by every worker behind an async mutex. Capacity is the
//! backpressure mechanism: a full queue suspends the generator. The results
//! queue is unbounded with a single consumer (the sink).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::app::id::CandidateId;
use crate::app::models::FetchResult;

/// Outcome of a bounded wait on the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkPoll {
    /// A candidate was dequeued
    Item(CandidateId),
    /// Nothing arrived within the timeout
    Empty,
    /// All senders are gone and the queue is drained
    Closed,
}

/// Producer half of the work queue
#[derive(Debug, Clone)]
pub struct WorkSender {
    tx: mpsc::Sender<CandidateId>,
    depth: Arc<AtomicUsize>,
}

impl WorkSender {
    /// Enqueue a candidate, waiting while the queue is full
    ///
    /// The depth gauge is raised between reserving the slot and publishing
    /// the item, so a receiver can never take an item it has not counted.
    pub async fn send(&self, id: CandidateId) -> Result<(), CandidateId> {
        let permit = self.tx.reserve().await.map_err(|_| id)?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        permit.send(id);
        Ok(())
    }

    /// Number of queued, not yet dequeued, items
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer half of the work queue, shared by all workers
#[derive(Debug, Clone)]
pub struct WorkReceiver {
    rx: Arc<Mutex<mpsc::Receiver<CandidateId>>>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl WorkReceiver {
    /// Wait up to `timeout` for the next candidate
    pub async fn recv_timeout(&self, timeout: Duration) -> WorkPoll {
        let wait = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(id)) => {
                self.settle_depth(1);
                WorkPoll::Item(id)
            }
            Ok(None) => WorkPoll::Closed,
            Err(_) => WorkPoll::Empty,
        }
    }

    /// Drop every queued item that no worker has taken yet
    ///
    /// Returns the number discarded.
    pub async fn discard_pending(&self) -> usize {
        let mut rx = self.rx.lock().await;
        rx.close();
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        self.settle_depth(discarded);
        discarded
    }

    fn settle_depth(&self, taken: usize) {
        self.depth.fetch_sub(taken, Ordering::Relaxed);
    }

    /// Number of queued items
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Create a bounded work queue
pub fn work_queue(capacity: usize) -> (WorkSender, WorkReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let depth = Arc::new(AtomicUsize::new(0));
    (
        WorkSender {
            tx,
            depth: depth.clone(),
        },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
            depth,
            capacity,
        },
    )
}

/// Producer half of the results queue
pub type ResultSender = mpsc::UnboundedSender<FetchResult>;

/// Consumer half of the results queue
pub type ResultReceiver = mpsc::UnboundedReceiver<FetchResult>;

/// Create the results queue
pub fn result_queue() -> (ResultSender, ResultReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order_and_close() {
        let (tx, rx) = work_queue(4);
        for id in [3u64, 1, 2] {
            tx.send(id).await.unwrap();
        }
        assert_eq!(tx.depth(), 3);
        drop(tx);

        let timeout = Duration::from_millis(20);
        assert_eq!(rx.recv_timeout(timeout).await, WorkPoll::Item(3));
        assert_eq!(rx.recv_timeout(timeout).await, WorkPoll::Item(1));
        assert_eq!(rx.recv_timeout(timeout).await, WorkPoll::Item(2));
        assert_eq!(rx.recv_timeout(timeout).await, WorkPoll::Closed);
    }

    #[tokio::test]
    async fn test_empty_poll_times_out() {
        let (_tx, rx) = work_queue(1);
        let poll = rx.recv_timeout(Duration::from_millis(10)).await;
        assert_eq!(poll, WorkPoll::Empty);
    }

    #[tokio::test]
    async fn test_discard_pending_closes_queue() {
        let (tx, rx) = work_queue(8);
        for id in 0..5u64 {
            tx.send(id).await.unwrap();
        }

        assert_eq!(rx.discard_pending().await, 5);
        assert_eq!(rx.depth(), 0);
        assert_eq!(tx.send(99).await, Err(99));
        assert_eq!(rx.depth(), 0);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)).await,
            WorkPoll::Closed
        );
    }

    #[tokio::test]
    async fn test_shared_receiver_across_workers() {
        let (tx, rx) = work_queue(16);
        for id in 0..10u64 {
            tx.send(id).await.unwrap();
        }
        drop(tx);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let rx = rx.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let WorkPoll::Item(id) = rx.recv_timeout(Duration::from_millis(50)).await {
                    got.push(id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    /// Test the depth gauge settles at zero under contention
    ///
    /// Verifies that concurrent senders and receivers on a single-slot
    /// queue leave no residue in the gauge once everything is drained.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_depth_returns_to_zero_after_concurrent_drain() {
        const ITEMS: u64 = 20_000;
        let (tx, rx) = work_queue(1);

        let producer = tokio::spawn(async move {
            for id in 0..ITEMS {
                tx.send(id).await.unwrap();
            }
        });

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let rx = rx.clone();
            consumers.push(tokio::spawn(async move {
                let mut taken = 0u64;
                loop {
                    match rx.recv_timeout(Duration::from_millis(200)).await {
                        WorkPoll::Item(_) => taken += 1,
                        WorkPoll::Empty => continue,
                        WorkPoll::Closed => break,
                    }
                }
                taken
            }));
        }

        producer.await.unwrap();
        let mut consumed = 0;
        for consumer in consumers {
            consumed += consumer.await.unwrap();
        }

        assert_eq!(consumed, ITEMS);
        assert_eq!(rx.depth(), 0);
    }
}
