//! Writes that cells request during a tick but that must land after the
//! parallel phase has joined.

use std::sync::{Mutex, PoisonError};

use crate::arena::CellIndex;

/// A queued write: "set `target`'s learnable value to `value`".
///
/// `source` is the cell whose update produced the write; the drain applies
/// records grouped by source slot so the outcome never depends on which
/// worker thread finished first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredMutation {
    pub source: CellIndex,
    pub target: CellIndex,
    pub value: f64,
}

/// Thread-safe append-only queue shared by every update of one tick.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    records: Mutex<Vec<DeferredMutation>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, mutation: DeferredMutation) {
        // A panic elsewhere in the tick must not hide queued records.
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mutation);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the queue, ordered by source slot.
    ///
    /// The sort is stable, so records from one source keep their enqueue order.
    pub fn into_sorted(self) -> Vec<DeferredMutation> {
        let mut records = self
            .records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        records.sort_by_key(|m| m.source.slot());
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(slot: u32) -> CellIndex {
        CellIndex::new(slot, 0)
    }

    #[test]
    fn drain_order_follows_source_slot() {
        let q = DeferredQueue::new();
        q.push(DeferredMutation {
            source: idx(5),
            target: idx(1),
            value: 0.9,
        });
        q.push(DeferredMutation {
            source: idx(2),
            target: idx(1),
            value: 0.4,
        });
        q.push(DeferredMutation {
            source: idx(2),
            target: idx(3),
            value: 0.7,
        });
        assert_eq!(q.len(), 3);

        let drained = q.into_sorted();
        let order: Vec<(u32, u32)> = drained
            .iter()
            .map(|m| (m.source.slot(), m.target.slot()))
            .collect();
        assert_eq!(order, vec![(2, 1), (2, 3), (5, 1)]);
    }

    #[test]
    fn concurrent_pushes_are_all_kept() {
        let q = DeferredQueue::new();
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let q = &q;
                s.spawn(move || {
                    for k in 0..100u32 {
                        q.push(DeferredMutation {
                            source: idx(t),
                            target: idx(k),
                            value: f64::from(k),
                        });
                    }
                });
            }
        });
        assert_eq!(q.into_sorted().len(), 400);
    }
}
