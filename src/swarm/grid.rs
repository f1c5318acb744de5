//! Uniform spatial grid built by a parallel counting sort
//!
//! Every step the agent array is bucketed into fixed-size cells:
//! 1. clear the per-cell counters
//! 2. histogram: each lane computes its cell id and bumps that cell's counter
//! 3. two-level exclusive prefix sum over the counters (see [`scan`])
//! 4. scatter: each lane claims a unique slot with a fetch-add on its cell's
//!    cursor and records its own index there, then the rearranged copy is
//!    gathered slot by slot
//!
//! Each pass is a rayon dispatch that returns only once every lane finished,
//! so later passes never observe a partial write.
//!
//! The layout is derived once from the world bound and the cell size and
//! never changes afterwards.
//!
//! [`scan`]: crate::swarm::scan

use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::swarm::agent::Agent;
use crate::swarm::constants::grid::{MAX_TOTAL_CELLS, SLACK_CELLS};
use crate::swarm::error::{GridError, SimulationError};
use crate::swarm::scan;
use crate::util::vec2::Vec2;

/// Anything that can be bucketed by position
pub trait Positioned {
    fn position(&self) -> Vec2;
}

impl Positioned for Agent {
    #[inline]
    fn position(&self) -> Vec2 {
        self.position
    }
}

/// Fixed grid dimensions and cell-id arithmetic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    cell_size: f32,
    inv_cell_size: f32,
    dim_x: u32,
    dim_y: u32,
}

impl GridLayout {
    /// Derive a layout covering `[-x_bound, x_bound] × [-y_bound, y_bound]` plus slack
    pub fn new(x_bound: f32, y_bound: f32, cell_size: f32) -> Result<Self, GridError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(GridError::InvalidCellSize(cell_size));
        }
        if !(x_bound.is_finite() && y_bound.is_finite() && x_bound > 0.0 && y_bound > 0.0) {
            return Err(GridError::InvalidBounds(x_bound, y_bound));
        }

        let span_x = (x_bound as f64 * 2.0 / cell_size as f64).floor();
        let span_y = (y_bound as f64 * 2.0 / cell_size as f64).floor();
        let dim_x = span_x as u64 + SLACK_CELLS as u64;
        let dim_y = span_y as u64 + SLACK_CELLS as u64;
        let total = dim_x.saturating_mul(dim_y);
        if dim_x > u32::MAX as u64 || dim_y > u32::MAX as u64 || total > MAX_TOTAL_CELLS {
            return Err(GridError::TooManyCells(total));
        }

        Ok(Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            dim_x: dim_x as u32,
            dim_y: dim_y as u32,
        })
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        (self.dim_x, self.dim_y)
    }

    #[inline]
    pub fn total_cells(&self) -> usize {
        self.dim_x as usize * self.dim_y as usize
    }

    /// Grid coordinates of a world position, clamped into the grid.
    ///
    /// Computed in saturating `i64` so far-out or non-finite positions cannot
    /// overflow; a NaN coordinate lands in the centre column/row.
    #[inline]
    pub fn cell_coords(&self, position: Vec2) -> (u32, u32) {
        let gx = ((position.x * self.inv_cell_size).floor() as i64).saturating_add((self.dim_x / 2) as i64);
        let gy = ((position.y * self.inv_cell_size).floor() as i64).saturating_add((self.dim_y / 2) as i64);
        (
            gx.clamp(0, self.dim_x as i64 - 1) as u32,
            gy.clamp(0, self.dim_y as i64 - 1) as u32,
        )
    }

    #[inline]
    pub fn coords_to_index(&self, x: u32, y: u32) -> u32 {
        y * self.dim_x + x
    }

    #[inline]
    pub fn cell_index(&self, position: Vec2) -> u32 {
        let (x, y) = self.cell_coords(position);
        self.coords_to_index(x, y)
    }

    /// Rows of the square block of cells within `reach` cells of `position`,
    /// clipped to the grid. Each row is `(y, x_first, x_last)`.
    pub fn block_rows(&self, position: Vec2, reach: u32) -> impl Iterator<Item = (u32, u32, u32)> {
        let (cx, cy) = self.cell_coords(position);
        let x0 = cx.saturating_sub(reach);
        let x1 = cx.saturating_add(reach).min(self.dim_x - 1);
        let y0 = cy.saturating_sub(reach);
        let y1 = cy.saturating_add(reach).min(self.dim_y - 1);
        (y0..=y1).map(move |y| (y, x0, x1))
    }
}

/// Counting-sort grid: per-cell offsets into a rearranged copy of the input
#[derive(Debug)]
pub struct SpatialGrid {
    layout: GridLayout,
    /// Histogram counters, one per cell
    counts: Vec<AtomicU32>,
    /// Running scatter cursors, seeded from the offsets
    cursors: Vec<AtomicU32>,
    /// Exclusive offsets, `total_cells + 1` entries
    offsets: Vec<u32>,
    /// Cell id of each input element from the histogram pass
    cell_keys: Vec<u32>,
    /// Input index for each destination slot, written by the claiming lane
    sources: Vec<AtomicU32>,
    len: usize,
}

impl SpatialGrid {
    pub fn new(layout: GridLayout) -> Self {
        let cells = layout.total_cells();
        Self {
            layout,
            counts: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            cursors: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            offsets: vec![0; cells + 1],
            cell_keys: Vec::new(),
            sources: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Number of elements bucketed by the last rebuild
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset table from the last rebuild (`total_cells + 1` entries)
    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Slice range of a single cell in the rearranged array
    #[inline]
    pub fn cell_range(&self, cell: u32) -> Range<usize> {
        let cell = cell as usize;
        self.offsets[cell] as usize..self.offsets[cell + 1] as usize
    }

    /// Ranges of the rearranged array covering every cell within `reach` cells
    /// of `position`. Cells of one row are contiguous, so each row is one range.
    pub fn block_ranges(&self, position: Vec2, reach: u32) -> impl Iterator<Item = Range<usize>> + '_ {
        self.layout.block_rows(position, reach).map(move |(y, x0, x1)| {
            let first = self.layout.coords_to_index(x0, y) as usize;
            let last = self.layout.coords_to_index(x1, y) as usize;
            self.offsets[first] as usize..self.offsets[last + 1] as usize
        })
    }

    /// Rebuild from `input`, writing the cell-ordered copy into `output`.
    ///
    /// `capacity` is the caller's allocated slot count for `output`; an input
    /// larger than that is an invariant violation (buffers must be grown first).
    pub fn rebuild<T>(&mut self, input: &[T], output: &mut Vec<T>, capacity: usize) -> Result<(), SimulationError>
    where
        T: Positioned + Copy + Send + Sync,
    {
        if input.len() > capacity || input.len() > u32::MAX as usize {
            return Err(SimulationError::CapacityViolation {
                required: input.len(),
                capacity,
            });
        }

        let layout = self.layout;

        // Clear
        self.counts.par_iter().for_each(|c| c.store(0, Ordering::Relaxed));

        // Histogram
        let counts = &self.counts;
        self.cell_keys.clear();
        self.cell_keys.par_extend(input.par_iter().map(|item| {
            let cell = layout.cell_index(item.position());
            counts[cell as usize].fetch_add(1, Ordering::Relaxed);
            cell
        }));

        // Prefix sum
        let total = scan::exclusive_scan(&self.counts, &mut self.offsets);
        debug_assert_eq!(total as usize, input.len());

        // Scatter: claim slots
        let offsets = &self.offsets;
        self.cursors
            .par_iter()
            .zip(offsets.par_iter())
            .for_each(|(cursor, &start)| cursor.store(start, Ordering::Relaxed));

        // Slots form a permutation of 0..len, so every source entry is
        // overwritten before the gather reads it
        self.sources.resize_with(input.len(), || AtomicU32::new(0));
        let cursors = &self.cursors;
        let sources = &self.sources;
        self.cell_keys.par_iter().enumerate().for_each(|(index, &cell)| {
            let slot = cursors[cell as usize].fetch_add(1, Ordering::Relaxed);
            sources[slot as usize].store(index as u32, Ordering::Relaxed);
        });

        // Scatter: copy
        output.clear();
        output.par_extend(
            self.sources
                .par_iter()
                .map(|src| input[src.load(Ordering::Relaxed) as usize]),
        );

        self.len = input.len();
        Ok(())
    }

    /// Occupancy statistics from the last rebuild
    pub fn stats(&self) -> GridStats {
        let (non_empty_cells, max_per_cell) = self
            .offsets
            .par_windows(2)
            .map(|w| w[1] - w[0])
            .fold(|| (0usize, 0u32), |(n, m), c| (n + (c > 0) as usize, m.max(c)))
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1.max(b.1)));

        GridStats {
            non_empty_cells,
            total_entities: self.len,
            max_per_cell: max_per_cell as usize,
        }
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridStats {
    pub non_empty_cells: usize,
    pub total_entities: usize,
    pub max_per_cell: usize,
}
