use std::collections::HashSet;
use taxonav_taxonomy::Candidate;

/// One numbered slice of a candidate set, presented in a single call.
///
/// Numbering is batch-local and 1-based: option `1` is `items[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position of this batch
    pub ordinal: usize,
    /// Number of batches the candidate set was split into
    pub total: usize,
    pub items: Vec<Candidate>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map a 1-based option number to its leaf name
    pub fn leaf_for(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.items.get(idx))
            .map(|candidate| candidate.leaf.as_str())
    }

    /// Map validated option numbers to leaf names, keeping their order.
    /// Numbers outside `1..=len` are skipped.
    pub fn resolve(&self, numbers: &[usize]) -> Vec<String> {
        numbers
            .iter()
            .filter_map(|&number| self.leaf_for(number))
            .map(str::to_string)
            .collect()
    }
}

/// Splits candidate sets into fixed-size batches and merges per-batch picks
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Partition `candidates` in order. Every candidate lands in exactly one
    /// batch; only the last batch may be short.
    pub fn split(&self, candidates: Vec<Candidate>) -> Vec<Batch> {
        let total = candidates.len().div_ceil(self.batch_size);
        let mut batches = Vec::with_capacity(total);
        let mut remaining = candidates.into_iter().peekable();

        while remaining.peek().is_some() {
            let items: Vec<Candidate> = remaining.by_ref().take(self.batch_size).collect();
            batches.push(Batch {
                ordinal: batches.len() + 1,
                total,
                items,
            });
        }

        batches
    }

    /// Concatenate per-batch picks, dropping repeats but keeping the
    /// position of each name's first occurrence
    pub fn reassemble<I>(picks: I) -> Vec<String>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut seen = HashSet::new();
        picks
            .into_iter()
            .flatten()
            .filter(|leaf| seen.insert(leaf.clone()))
            .collect()
    }
}
