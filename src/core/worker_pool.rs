//! Fixed pool of worker threads driving one scheduling session.
//!
//! Workers are created once per session, receive the session's shared
//! resources at start-up, and pull items from a channel in submission order.
//! Each item's result lands in its own slot, which the orchestrating thread
//! waits on with a per-item timeout.

mod native;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::WorkItem;

pub(crate) use native::WorkerPool;

/// Item counts of a session, logged once collection is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SessionTally {
    pub workers: usize,
    pub dispatched: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Counters bumped by the workers as items move through them.
#[derive(Debug, Default)]
pub(crate) struct TallyCounters {
    pub dispatched: AtomicU64,
    pub running: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

impl TallyCounters {
    pub fn tally(&self, workers: usize) -> SessionTally {
        SessionTally {
            workers,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Move one item from running to its outcome bucket.
    pub fn finish(&self, ok: bool) {
        let bucket = if ok { &self.succeeded } else { &self.failed };
        bucket.fetch_add(1, Ordering::Relaxed);
        self.running.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An item on its way to a worker, tagged with its submission index.
#[derive(Debug)]
pub(crate) struct WorkerTask<P> {
    pub index: usize,
    pub item: WorkItem<P>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_moves_item_out_of_running() {
        let counters = TallyCounters::default();
        counters.dispatched.fetch_add(3, Ordering::Relaxed);
        counters.running.fetch_add(2, Ordering::Relaxed);
        counters.finish(true);
        counters.finish(false);

        assert_eq!(
            counters.tally(2),
            SessionTally {
                workers: 2,
                dispatched: 3,
                running: 0,
                succeeded: 1,
                failed: 1,
            }
        );
    }
}
