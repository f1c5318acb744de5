//! Failure taxonomy for the swarm engine
//!
//! Grid and buffer invariant violations are fatal for the step that detects
//! them. Transfer and resize rejections are recoverable and leave every
//! simulator untouched.

use crate::swarm::agent::ColonyId;

/// Unrecoverable fault inside a simulation step
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("capacity violation: {required} agents required but buffers hold {capacity}")]
    CapacityViolation { required: usize, capacity: usize },
    #[error("agent owner tag {0} has no population in this simulator")]
    OrphanedAgent(u8),
}

/// Invalid grid construction parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f32),
    #[error("world bounds must be positive and finite, got ({0}, {1})")]
    InvalidBounds(f32, f32),
    #[error("grid of {0} cells exceeds the supported maximum")]
    TooManyCells(u64),
}

/// Rejected explicit buffer resize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("cannot shrink buffers to {requested}: {live} agents are held")]
    ShrinkBelowLive { requested: usize, live: usize },
}

/// Rejected transfer request; no agents were moved
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransferError {
    #[error("colony {0} is not present in this simulator")]
    UnknownColony(ColonyId),
    #[error("colony {0} is already present in this simulator")]
    DuplicateColony(ColonyId),
    #[error("colony {colony} has {available} live agents, {requested} requested")]
    InsufficientAgents {
        colony: ColonyId,
        requested: usize,
        available: usize,
    },
    #[error("simulator already hosts the maximum of {0} populations")]
    SimulatorFull(usize),
    #[error("cannot create destination simulator: {0}")]
    Simulator(#[from] GridError),
}
