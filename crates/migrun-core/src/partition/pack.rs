//! Longest-processing-time-first bin packing.
//!
//! Sequence length stands in for processing time. Items are expected longest
//! first; each goes to the currently smallest bin, ties broken by lowest bin id.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packing {
    /// Item indices per bin, in assignment order.
    pub bins: Vec<Vec<usize>>,
    /// Total length per bin.
    pub sizes: Vec<u64>,
}

/// Pack `lengths` into `n` bins (`n` is clamped to at least 1).
pub fn pack(lengths: &[u64], n: usize) -> Packing {
    let n = n.max(1);
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = (0..n).map(|i| Reverse((0, i))).collect();
    let mut bins = vec![Vec::new(); n];
    let mut sizes = vec![0u64; n];
    for (i, &len) in lengths.iter().enumerate() {
        let Some(Reverse((size, bin))) = heap.pop() else {
            break;
        };
        let size = size + len;
        bins[bin].push(i);
        sizes[bin] = size;
        heap.push(Reverse((size, bin)));
    }
    Packing { bins, sizes }
}

/// Mean squared deviation of `sizes` from `goal`.
pub fn mse(sizes: &[u64], goal: u64) -> f64 {
    if sizes.is_empty() {
        return 0.0;
    }
    let sum: f64 = sizes
        .iter()
        .map(|&s| {
            let d = goal as f64 - s as f64;
            d * d
        })
        .sum();
    sum / sizes.len() as f64
}

/// Bin count in `1..=max` whose packing is closest to `goal` (first minimum wins).
pub fn best_bin_count(lengths: &[u64], goal: u64, max: usize) -> usize {
    let mut best = 1;
    let mut best_loss = f64::INFINITY;
    for n in 1..=max.max(1) {
        let loss = mse(&pack(lengths, n).sizes, goal);
        tracing::debug!(bins = n, mse = loss as u64, "bin count candidate");
        if loss < best_loss {
            best = n;
            best_loss = loss;
        }
    }
    best
}
