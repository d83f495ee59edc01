use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::aggregate::GlobalCount;

/// A (key, count) pair with a total order: higher count ranks first, equal
/// counts rank the lexicographically smaller key first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

impl Ord for RankedEntry {
    // "greater" means "ranks earlier": compare counts, and for equal counts
    // the smaller key wins, hence the flipped key comparison.
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the top `n` entries of a global count, best rank first.
///
/// Uses a bounded min-heap of size `n`: O(k log n) over k distinct keys,
/// instead of the O(k log k) full sort, since `n` is usually small against
/// a large key space. The total order on entries makes the output
/// deterministic no matter how the map iterates.
pub fn top_n(global: &GlobalCount, n: usize) -> Vec<RankedEntry> {
    if n == 0 {
        return Vec::new();
    }

    // (count, Reverse(key)) orders exactly like RankedEntry; keeping
    // borrowed keys in the heap defers allocation to the surviving n.
    let cap = n.saturating_add(1).min(global.distinct() + 1);
    let mut heap: BinaryHeap<Reverse<(u64, Reverse<&str>)>> = BinaryHeap::with_capacity(cap);
    for (key, count) in global.iter() {
        heap.push(Reverse((count, Reverse(key))));
        if heap.len() > n {
            heap.pop();
        }
    }

    let mut entries: Vec<RankedEntry> = heap
        .into_iter()
        .map(|Reverse((count, Reverse(key)))| RankedEntry {
            key: key.to_string(),
            count,
        })
        .collect();
    entries.sort_unstable_by(|a, b| b.cmp(a));
    entries
}
