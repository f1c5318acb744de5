//! Horde Swarm
//!
//! Grid-accelerated boid flocking for colonies of rats, with population
//! control and agent transfer between colony and combat simulators.
//!
//! # Features
//!
//! - `corpses` - Retain recently killed agents in a bounded ring for display (enabled by default)

pub mod config;
pub mod swarm;
pub mod util;
