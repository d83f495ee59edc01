use ahash::AHashMap;

/// One worker's frequency map over a single batch.
///
/// Produced by exactly one worker, consumed exactly once by the aggregator.
pub type PartialCount = AHashMap<String, u64>;

/// Merges partial counts into the global frequency map.
///
/// All merges go through a single owner (the aggregator thread during a
/// pipeline run), so no locking is needed. Integer addition makes the merge
/// commutative and associative: arrival order never changes the result.
#[derive(Debug, Default)]
pub struct Aggregator {
    counts: AHashMap<String, u64>,
    merges: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partial count into the global map, summing per key
    pub fn merge(&mut self, partial: PartialCount) {
        for (key, count) in partial {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.merges += 1;
    }

    /// Number of partials merged so far
    pub fn merges(&self) -> u64 {
        self.merges
    }

    /// Consume the aggregator and return the read-only result
    pub fn finalize(self) -> GlobalCount {
        GlobalCount {
            counts: self.counts,
        }
    }
}

/// The merged frequency map across all batches, immutable after
/// [`Aggregator::finalize`].
#[derive(Debug)]
pub struct GlobalCount {
    counts: AHashMap<String, u64>,
}

impl GlobalCount {
    /// Count for a key, zero if absent
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over (key, count) pairs in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
