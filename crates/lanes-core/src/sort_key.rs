//! Fractional sort-key allocation.
//!
//! A moved issue gets a key strictly between its new neighbours, so no
//! sibling is ever renumbered:
//!
//! | Landing position | New key |
//! |---|---|
//! | bucket has no other issue | unchanged |
//! | first | `first - offset` |
//! | last | `last + offset` |
//! | between `a` and `b` | `(a + b) / 2` |
//!
//! Neighbours are always read from the bucket as it looks *after* the moved
//! issue has been taken out, so a one-slot move within a bucket lands between
//! the right pair.

use tracing::{debug, warn};

use crate::model::Issue;

/// Gap left before the first or after the last issue of a bucket.
pub const DEFAULT_OFFSET: f64 = 10_000.0;

/// How an issue moves relative to the destination bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Reorder inside one bucket. `to` is the final index once the issue
    /// has been removed from `from`.
    Within { from: usize, to: usize },
    /// Move into a bucket the issue is not part of yet.
    Across { to: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKeyAllocator {
    offset: f64,
}

impl Default for SortKeyAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSET)
    }
}

impl SortKeyAllocator {
    #[must_use]
    pub const fn new(offset: f64) -> Self {
        Self { offset }
    }

    #[must_use]
    pub const fn offset(&self) -> f64 {
        self.offset
    }

    /// Key for an issue landing at `index` among `neighbors` (keys of the
    /// destination without the moved issue). `current` is kept when there
    /// is nothing to position against.
    #[must_use]
    pub fn between(&self, neighbors: &[f64], index: usize, current: f64) -> f64 {
        let (Some(first), Some(last)) = (neighbors.first(), neighbors.last()) else {
            return current;
        };
        if index == 0 {
            return first - self.offset;
        }
        if index >= neighbors.len() {
            return last + self.offset;
        }

        let (before, after) = (neighbors[index - 1], neighbors[index]);
        let key = f64::midpoint(before, after);
        if key <= before || key >= after {
            warn!(before, after, "sort keys exhausted between neighbours");
        }
        key
    }

    /// New key for `bucket[from]` (within) or an outside issue (across)
    /// dropped into `bucket`.
    #[must_use]
    pub fn allocate(&self, bucket: &[Issue], moving: &Issue, placement: Placement) -> f64 {
        let (neighbors, to): (Vec<f64>, usize) = match placement {
            Placement::Within { from, to } => {
                if from == to {
                    return moving.sort_order;
                }
                let rest = bucket
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != from)
                    .map(|(_, issue)| issue.sort_order)
                    .collect();
                (rest, to)
            }
            Placement::Across { to } => (bucket.iter().map(|i| i.sort_order).collect(), to),
        };

        let key = self.between(&neighbors, to, moving.sort_order);
        debug!(
            issue = %moving.id,
            ?placement,
            old = moving.sort_order,
            new = key,
            "allocated sort key"
        );
        key
    }
}
