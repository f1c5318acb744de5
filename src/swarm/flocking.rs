//! Flocking force evaluator
//!
//! One data-parallel pass over the rearranged agent array. Each live agent
//! scans the 3×3 block of cells around it and steers by:
//! - cohesion toward the centroid of same-owner neighbours
//! - separation from same-owner neighbours closer than `min_distance`
//! - alignment with the mean same-owner neighbour velocity
//! - seeking its population target, or the nearest enemy in merged simulators
//! - pushes out of POI circles and away from the world edge
//!
//! Agents of other owners never contribute flocking forces; they are only seen
//! for target acquisition.
//!
//! Death signalling happens in the same pass: every owner has a kill quota
//! that its live lanes race to decrement. Winning lanes are emitted dead and
//! unmoved. Agents that arrive dead are compacted out of the output.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::swarm::agent::Agent;
use crate::swarm::constants::flocking::SEPARATION_REFERENCE_POPULATION;
use crate::swarm::constants::population::MAX_MERGED_POPULATIONS;
use crate::swarm::error::SimulationError;
use crate::swarm::grid::SpatialGrid;
use crate::swarm::poi::PoiField;
use crate::swarm::population::{KillQuotas, SpawnSettings};
use crate::util::vec2::Vec2;

// ============================================================================
// Parameters
// ============================================================================

/// Tuning for one simulator kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlockingParams {
    /// Neighbour radius; also the grid cell size
    pub visual_range: f32,
    pub min_distance: f32,
    pub cohesion_factor: f32,
    pub separation_factor: f32,
    pub alignment_factor: f32,
    pub target_factor: f32,
    /// Distance inside which seeking slows down
    pub arrival_radius: f32,
    pub poi_factor: f32,
    pub edge_margin: f32,
    pub edge_factor: f32,
    /// Max heading change (radians per second)
    pub turn_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub separation_scale_min: f32,
    pub separation_scale_max: f32,
    /// Radius around the population centre new agents appear in
    pub spawn_radius: f32,
}

impl FlockingParams {
    /// Tight, slow-turning hordes roaming the map
    pub fn colony() -> Self {
        Self {
            visual_range: 0.5,
            min_distance: 0.15,
            cohesion_factor: 2.0,
            separation_factor: 1.0,
            alignment_factor: 5.0,
            target_factor: 0.5,
            arrival_radius: 1.0,
            poi_factor: 8.0,
            edge_margin: 0.5,
            edge_factor: 4.0,
            turn_speed: 2.4,
            min_speed: 1.5,
            max_speed: 2.0,
            separation_scale_min: 1.0,
            separation_scale_max: 8.0,
            spawn_radius: 1.0,
        }
    }

    /// Loose, fast-turning swarms charging at each other
    pub fn combat() -> Self {
        Self {
            visual_range: 50.0,
            min_distance: 0.4,
            cohesion_factor: 3.0,
            separation_factor: 100.0,
            alignment_factor: 0.1,
            target_factor: 50.0,
            arrival_radius: 0.5,
            poi_factor: 8.0,
            edge_margin: 0.5,
            edge_factor: 4.0,
            turn_speed: 24.0,
            min_speed: 0.4,
            max_speed: 2.0,
            separation_scale_min: 1.0,
            separation_scale_max: 8.0,
            spawn_radius: 2.0,
        }
    }

    #[inline]
    pub fn visual_range_sq(&self) -> f32 {
        self.visual_range * self.visual_range
    }

    #[inline]
    pub fn min_distance_sq(&self) -> f32 {
        self.min_distance * self.min_distance
    }

    /// Separation multiplier for `total` agents in the simulator
    pub fn separation_scale(&self, total: usize) -> f32 {
        (total as f32 / SEPARATION_REFERENCE_POPULATION).clamp(self.separation_scale_min, self.separation_scale_max)
    }

    pub fn spawn_settings(&self) -> SpawnSettings {
        SpawnSettings {
            radius: self.spawn_radius,
            min_speed: self.min_speed,
            max_speed: self.max_speed,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.visual_range.is_finite() && self.visual_range > 0.0) {
            return Err("visual_range must be positive".to_string());
        }
        if self.min_distance < 0.0 || self.min_distance > self.visual_range {
            return Err("min_distance must be within [0, visual_range]".to_string());
        }
        if self.min_speed < 0.0 || self.min_speed > self.max_speed {
            return Err("min_speed must be within [0, max_speed]".to_string());
        }
        if self.turn_speed <= 0.0 {
            return Err("turn_speed must be positive".to_string());
        }
        if self.arrival_radius <= 0.0 {
            return Err("arrival_radius must be positive".to_string());
        }
        if self.separation_scale_min <= 0.0 || self.separation_scale_min > self.separation_scale_max {
            return Err("separation scale range must be positive and ordered".to_string());
        }
        if self.spawn_radius < 0.0 {
            return Err("spawn_radius cannot be negative".to_string());
        }
        Ok(())
    }
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self::colony()
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Read-only inputs of one evaluation pass
pub struct StepContext<'a> {
    pub grid: &'a SpatialGrid,
    pub params: &'a FlockingParams,
    pub pois: &'a PoiField,
    /// Seek target per owner slot; `None` for unused slots
    pub targets: &'a [Option<Vec2>; MAX_MERGED_POPULATIONS],
    /// Half-extent of the world
    pub world_bound: Vec2,
    /// Whether enemies are visible for target acquisition
    pub merged: bool,
    /// Agents in the simulator, used for separation scaling
    pub total_agents: usize,
    pub dt: f32,
}

/// Per-owner results of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Agents flipped dead this pass
    pub killed: KillQuotas,
    /// Live agents after the pass
    pub alive: [u32; MAX_MERGED_POPULATIONS],
    /// Dead agents dropped from the previous pass
    pub compacted: usize,
}

/// Evaluate every agent of `input` (the rearranged array the grid indexes)
/// into `output`, applying the kill `quotas`.
pub fn evaluate(
    ctx: &StepContext<'_>,
    input: &[Agent],
    quotas: &KillQuotas,
    output: &mut Vec<Agent>,
) -> Result<Evaluation, SimulationError> {
    if let Some(orphan) = input
        .par_iter()
        .find_any(|a| a.alive && ctx.targets.get(a.owner.index()).copied().flatten().is_none())
    {
        return Err(SimulationError::OrphanedAgent(orphan.owner.0));
    }

    let remaining: [AtomicU32; MAX_MERGED_POPULATIONS] = quotas.map(AtomicU32::new);
    let scale = ctx.params.separation_scale(ctx.total_agents);

    output.clear();
    output.par_extend(input.par_iter().filter_map(|agent| {
        if !agent.alive {
            return None;
        }

        let quota = &remaining[agent.owner.index()];
        if quota.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |q| q.checked_sub(1)).is_ok() {
            return Some(agent.as_corpse());
        }

        Some(steer(ctx, input, agent, scale))
    }));

    let mut evaluation = Evaluation {
        compacted: input.len() - output.len(),
        ..Default::default()
    };
    for (slot, (requested, left)) in evaluation.killed.iter_mut().zip(quotas.iter().zip(remaining.iter())) {
        *slot = requested - left.load(Ordering::Relaxed);
    }
    evaluation.alive = output
        .par_iter()
        .fold(
            || [0u32; MAX_MERGED_POPULATIONS],
            |mut counts, agent| {
                if agent.alive {
                    counts[agent.owner.index()] += 1;
                }
                counts
            },
        )
        .reduce(
            || [0u32; MAX_MERGED_POPULATIONS],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    Ok(evaluation)
}

/// Accumulated neighbourhood of one agent
#[derive(Default)]
struct Neighbourhood {
    position_sum: Vec2,
    velocity_sum: Vec2,
    count: u32,
    separation: Vec2,
    /// Squared distance and position of the closest enemy
    nearest_enemy: Option<(f32, Vec2)>,
}

fn gather(ctx: &StepContext<'_>, input: &[Agent], agent: &Agent) -> Neighbourhood {
    let visual_sq = ctx.params.visual_range_sq();
    let min_sq = ctx.params.min_distance_sq();
    let mut hood = Neighbourhood::default();

    for range in ctx.grid.block_ranges(agent.position, 1) {
        for other in &input[range] {
            if !other.alive {
                continue;
            }
            let diff = agent.position - other.position;
            let dist_sq = diff.length_sq();
            if dist_sq <= 0.0 || dist_sq >= visual_sq {
                continue;
            }

            if other.owner == agent.owner {
                hood.position_sum += other.position;
                hood.velocity_sum += other.velocity;
                hood.count += 1;
                if dist_sq < min_sq {
                    hood.separation += diff / dist_sq;
                }
            } else if ctx.merged && hood.nearest_enemy.map_or(true, |(best, _)| dist_sq < best) {
                hood.nearest_enemy = Some((dist_sq, other.position));
            }
        }
    }

    hood
}

fn steer(ctx: &StepContext<'_>, input: &[Agent], agent: &Agent, separation_scale: f32) -> Agent {
    let p = ctx.params;
    let dt = ctx.dt;
    let position = agent.position;
    let hood = gather(ctx, input, agent);

    let mut velocity = agent.velocity;

    if hood.count > 0 {
        let n = hood.count as f32;
        velocity += (hood.position_sum / n - position) * p.cohesion_factor * dt;
        velocity += (hood.velocity_sum / n - agent.velocity) * p.alignment_factor * dt;
    }
    velocity += hood.separation * p.separation_factor * separation_scale * dt;

    // Seek
    let target = match hood.nearest_enemy {
        Some((_, enemy)) => enemy,
        None => ctx.targets[agent.owner.index()].unwrap_or(position),
    };
    let to_target = target - position;
    let distance = to_target.length();
    if distance > 0.0 {
        let desired = to_target / distance * p.max_speed * (distance / p.arrival_radius).min(1.0);
        let blend = (p.target_factor * dt).min(1.0);
        velocity += (desired - velocity) * blend;
    }

    velocity += ctx.pois.push_from(position) * p.poi_factor * dt;

    // World edge
    let nudge = p.edge_factor * dt;
    let inner = ctx.world_bound - Vec2::splat(p.edge_margin);
    if position.x > inner.x {
        velocity.x -= nudge;
    } else if position.x < -inner.x {
        velocity.x += nudge;
    }
    if position.y > inner.y {
        velocity.y -= nudge;
    } else if position.y < -inner.y {
        velocity.y += nudge;
    }

    let mut velocity = agent
        .velocity
        .turn_towards(velocity, p.turn_speed * dt)
        .clamp_length_min_max(p.min_speed, p.max_speed);
    if !velocity.is_finite() {
        velocity = Vec2::ZERO;
    }

    Agent {
        position: position + velocity * dt,
        velocity,
        ..*agent
    }
}
