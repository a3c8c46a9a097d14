//! Candidate identifier generation
//!
//! [`IdGenerator`] walks a `(timestamp, counter)` cursor forward one step at a
//! time, encodes each position with a fixed section, and yields only ids that
//! are not already in the [`SeenIdSet`]. The producer side ([`IdGenerator::produce`])
//! pushes the sequence into the bounded work queue and suspends while the queue
//! is full.

use std::collections::HashSet;

use tokio::sync::watch;
use tracing::{debug, info};

use super::{encode, CandidateId, Section};
use crate::app::coordinator::PipelineState;
use crate::app::queue::WorkSender;
use crate::constants::id::COUNTER_SPAN;

/// Ids already dispatched or already persisted
pub type SeenIdSet = HashSet<CandidateId>;

/// Lazy, non-restartable sequence of unseen candidate ids
#[derive(Debug)]
pub struct IdGenerator {
    timestamp: u32,
    counter: u16,
    section: Section,
    seen: SeenIdSet,
    exhausted: bool,
    emitted: u64,
    skipped: u64,
}

/// Counters reported by the producer when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub emitted: u64,
    pub skipped: u64,
    /// Cursor position the next run would resume from
    pub cursor: (u32, u16),
}

impl IdGenerator {
    /// Start at `(start_timestamp, 0)` with the given section and seen set
    pub fn new(start_timestamp: u32, section: Section, seen: SeenIdSet) -> Self {
        Self {
            timestamp: start_timestamp,
            counter: 0,
            section,
            seen,
            exhausted: false,
            emitted: 0,
            skipped: 0,
        }
    }

    /// Current cursor position (not yet encoded)
    pub fn cursor(&self) -> (u32, u16) {
        (self.timestamp, self.counter)
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn advance(&mut self) {
        self.counter += 1;
        if self.counter >= COUNTER_SPAN {
            self.counter = 0;
            match self.timestamp.checked_add(1) {
                Some(next) => self.timestamp = next,
                None => self.exhausted = true,
            }
        }
    }

    /// Feed the bounded work queue until cancelled or the id space runs out
    ///
    /// Suspends on a full queue. Any state other than `Running` stops
    /// production; dropping the sender on return closes the queue so workers
    /// can drain what is left.
    pub async fn produce(
        mut self,
        work_tx: WorkSender,
        mut state_rx: watch::Receiver<PipelineState>,
    ) -> ProducerStats {
        info!(
            "Generator starting at timestamp {} with section {}",
            self.timestamp, self.section
        );

        while *state_rx.borrow() == PipelineState::Running {
            let Some(id) = self.next() else {
                info!("Identifier space exhausted, generator stopping");
                break;
            };

            tokio::select! {
                sent = work_tx.send(id) => {
                    if sent.is_err() {
                        debug!("Work queue closed, generator stopping");
                        break;
                    }
                }
                changed = state_rx.changed() => {
                    // The id was marked seen but never queued; it is not
                    // persisted, so the next run regenerates it.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let stats = ProducerStats {
            emitted: self.emitted,
            skipped: self.skipped,
            cursor: self.cursor(),
        };
        info!(
            "Generator stopped: {} emitted, {} skipped, next cursor {:?}",
            stats.emitted, stats.skipped, stats.cursor
        );
        stats
    }
}

impl Iterator for IdGenerator {
    type Item = CandidateId;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            let id = encode(self.timestamp, self.counter, self.section);
            self.advance();

            if self.seen.insert(id) {
                self.emitted += 1;
                return Some(id);
            }
            self.skipped += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::id::decode;
    use crate::app::queue::work_queue;
    use std::time::Duration;

    fn majority() -> Section {
        Section::from_bit_string("0000000000000000000001").unwrap()
    }

    #[test]
    fn test_first_candidates_from_start() {
        let generator = IdGenerator::new(1_700_000_000, majority(), SeenIdSet::new());
        let ids: Vec<_> = generator.take(5).collect();

        assert_eq!(ids.len(), 5);
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 5);

        for (expected_counter, id) in ids.iter().enumerate() {
            let parts = decode(*id);
            assert_eq!(parts.timestamp, 1_700_000_000);
            assert_eq!(parts.sub_second_counter as usize, expected_counter);
            assert_eq!(parts.section, majority());
        }
    }

    #[test]
    fn test_counter_rolls_over_into_next_second() {
        let ids: Vec<_> = IdGenerator::new(10, majority(), SeenIdSet::new())
            .take(1026)
            .collect();

        let last_of_first_second = decode(ids[1023]);
        assert_eq!(last_of_first_second.timestamp, 10);
        assert_eq!(last_of_first_second.sub_second_counter, 1023);

        let first_of_next = decode(ids[1024]);
        assert_eq!(first_of_next.timestamp, 11);
        assert_eq!(first_of_next.sub_second_counter, 0);
        assert_eq!(decode(ids[1025]).sub_second_counter, 1);
    }

    #[test]
    fn test_generation_is_monotonic() {
        let ids: Vec<_> = IdGenerator::new(1_600_000_000, majority(), SeenIdSet::new())
            .take(3000)
            .collect();

        for pair in ids.windows(2) {
            let a = decode(pair[0]);
            let b = decode(pair[1]);
            assert!(
                (a.timestamp, a.sub_second_counter) < (b.timestamp, b.sub_second_counter),
                "{a} should precede {b}"
            );
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_seen_prefix_is_skipped() {
        let expected: Vec<_> = IdGenerator::new(1_700_000_000, majority(), SeenIdSet::new())
            .take(10)
            .collect();

        let k = 4;
        let seen: SeenIdSet = expected[..k].iter().copied().collect();
        let mut generator = IdGenerator::new(1_700_000_000, majority(), seen);
        let resumed: Vec<_> = generator.by_ref().take(10 - k).collect();

        assert_eq!(resumed, expected[k..].to_vec());
        assert_eq!(generator.skipped(), k as u64);
        assert_eq!(generator.emitted(), (10 - k) as u64);
    }

    #[test]
    fn test_seen_ids_in_the_middle_are_skipped() {
        let expected: Vec<_> = IdGenerator::new(50, majority(), SeenIdSet::new())
            .take(6)
            .collect();

        let seen: SeenIdSet = [expected[2], expected[3]].into_iter().collect();
        let got: Vec<_> = IdGenerator::new(50, majority(), seen).take(4).collect();

        assert_eq!(got, vec![expected[0], expected[1], expected[4], expected[5]]);
    }

    #[test]
    fn test_exhaustion_at_end_of_timestamp_range() {
        let mut generator = IdGenerator::new(u32::MAX, majority(), SeenIdSet::new());
        assert_eq!(generator.by_ref().count(), 1024);
        assert_eq!(generator.next(), None);
    }

    /// Test producer backpressure
    ///
    /// With nobody consuming, the producer fills the queue to capacity and
    /// then suspends instead of generating further ids.
    #[tokio::test]
    async fn test_producer_suspends_on_full_queue() {
        let (work_tx, work_rx) = work_queue(3);
        let (state_tx, state_rx) = watch::channel(PipelineState::Running);
        let generator = IdGenerator::new(1_700_000_000, majority(), SeenIdSet::new());

        let handle = tokio::spawn(generator.produce(work_tx, state_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(work_rx.depth(), 3);
        assert!(!handle.is_finished());

        state_tx.send(PipelineState::Draining).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Three queued plus the one held while blocked on the full queue
        assert_eq!(stats.emitted, 4);
        assert_eq!(work_rx.depth(), 3);
    }
}
