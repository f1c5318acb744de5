//! Engine-wide constants grouped by concern

/// Spatial grid constants
pub mod grid {
    /// Lanes per block in the two-level prefix sum
    pub const BLOCK_SIZE: usize = 512;
    /// Extra cells added to each axis so agents briefly outside the nominal
    /// world bound still land in a real cell
    pub const SLACK_CELLS: u32 = 30;
    /// Hard ceiling on total cells. Each cell costs three `u32` tables, so
    /// this bounds a grid at roughly 800 MB.
    pub const MAX_TOTAL_CELLS: u64 = 1 << 26;
}

/// Population and buffer constants
pub mod population {
    /// Maximum populations sharing one merged (combat) simulator
    pub const MAX_MERGED_POPULATIONS: usize = 6;
    /// Agents accounted for in a fresh simulator's first allocation
    pub const INITIAL_AGENT_CAPACITY: usize = 2048;
    /// Growth multiplier applied to the required count when buffers are too small
    pub const GROWTH_FACTOR: usize = 2;
    /// Default number of corpses retained for display
    pub const DEFAULT_CORPSE_CAPACITY: usize = 2048;
}

/// Flocking constants
pub mod flocking {
    /// Population size at which the separation force is applied at its configured weight
    pub const SEPARATION_REFERENCE_POPULATION: f32 = 1000.0;
    /// Fixed simulation step used by the demo runner and benchmarks
    pub const DT: f32 = 1.0 / 30.0;
    /// Steps per second for the demo runner
    pub const TICK_RATE: u32 = 30;
}
