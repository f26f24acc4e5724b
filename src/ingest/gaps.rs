//! Missing-range detection over the sequence ledger

use std::fmt;

/// Inclusive range of block numbers absent from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Gap {
    pub start: u64,
    pub end: u64,
}

impl Gap {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "gap start {} after end {}", start, end);
        Self { start, end }
    }

    /// Number of blocks in the gap
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}..=#{}", self.start, self.end)
    }
}

/// Compute the gaps in `stored`, sorted by start.
///
/// Emits a leading gap down to block 0 and every interior hole. With
/// `known_head`, also the tail above the highest stored block; an empty
/// ledger yields `[0, known_head]`, or nothing without a head.
pub fn detect_gaps(stored: &[u64], known_head: Option<u64>) -> Vec<Gap> {
    let mut numbers = stored.to_vec();
    numbers.sort_unstable();
    numbers.dedup();

    let (Some(&first), Some(&last)) = (numbers.first(), numbers.last()) else {
        return known_head.map(|head| Gap::new(0, head)).into_iter().collect();
    };

    let mut gaps = Vec::new();

    if first > 0 {
        gaps.push(Gap::new(0, first - 1));
    }

    gaps.extend(
        numbers
            .windows(2)
            .filter(|pair| pair[1] > pair[0] + 1)
            .map(|pair| Gap::new(pair[0] + 1, pair[1] - 1)),
    );

    if let Some(head) = known_head.filter(|&head| head > last) {
        gaps.push(Gap::new(last + 1, head));
    }

    gaps
}

/// Total number of missing blocks across gaps
pub fn missing_blocks(gaps: &[Gap]) -> u64 {
    gaps.iter().map(Gap::len).sum()
}
