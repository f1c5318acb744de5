//! Two-level exclusive prefix sum
//!
//! Block-local scans run in parallel, followed by a scan over the block sums
//! and a parallel add-back pass. Each stage completes before the next starts.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::swarm::constants::grid::BLOCK_SIZE;

/// Exclusive scan of `counts` into `offsets`.
///
/// `offsets` must have `counts.len() + 1` entries; the final entry receives the
/// grand total. Returns the total.
pub fn exclusive_scan(counts: &[AtomicU32], offsets: &mut [u32]) -> u32 {
    debug_assert_eq!(offsets.len(), counts.len() + 1);
    let cells = counts.len();

    // Per-block scan, collecting each block's sum
    let mut block_sums: Vec<u32> = offsets[..cells]
        .par_chunks_mut(BLOCK_SIZE)
        .zip(counts.par_chunks(BLOCK_SIZE))
        .map(|(out, block)| {
            let mut running = 0u32;
            for (slot, count) in out.iter_mut().zip(block) {
                *slot = running;
                running += count.load(Ordering::Relaxed);
            }
            running
        })
        .collect();

    // Scan over block sums
    let total = exclusive_scan_in_place(&mut block_sums);

    // Add each block's base back onto its lanes
    offsets[..cells]
        .par_chunks_mut(BLOCK_SIZE)
        .zip(block_sums.par_iter())
        .for_each(|(out, &base)| {
            if base != 0 {
                out.iter_mut().for_each(|slot| *slot += base);
            }
        });

    offsets[cells] = total;
    total
}

/// Serial exclusive scan, returning the total
pub fn exclusive_scan_in_place(values: &mut [u32]) -> u32 {
    let mut running = 0u32;
    for value in values.iter_mut() {
        let count = *value;
        *value = running;
        running += count;
    }
    running
}
