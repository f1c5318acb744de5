//! Population size controller
//!
//! Every step each population's alive count is brought to the externally
//! supplied authoritative count: surplus agents get a kill quota for the
//! evaluator, deficits are filled with freshly spawned agents. Buffers are
//! grown before any of that reaches the grid builder.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::swarm::agent::{Agent, ColonyId, OwnerTag};
use crate::swarm::bounds::Aabb;
use crate::swarm::buffers::AgentBuffers;
use crate::swarm::constants::population::MAX_MERGED_POPULATIONS;
use crate::swarm::poi::PoiField;
use crate::util::vec2::Vec2;

/// Spawn attempts before accepting a position inside a POI
const SPAWN_ATTEMPTS: usize = 4;

/// One owner's bookkeeping inside a simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub colony: ColonyId,
    pub tag: OwnerTag,
    /// Live agents after the last step
    pub previous_alive: u32,
    /// Authoritative alive count requested by the owner
    pub alive_target: u32,
    /// Agents killed over this population's lifetime in this simulator
    pub total_deaths: u64,
    /// Seek target
    pub target: Vec2,
    /// Last known box around the live agents
    pub bounds: Aabb,
}

impl Population {
    pub fn new(colony: ColonyId, tag: OwnerTag, alive_target: u32, target: Vec2) -> Self {
        Self {
            colony,
            tag,
            previous_alive: 0,
            alive_target,
            total_deaths: 0,
            target,
            bounds: Aabb::EMPTY,
        }
    }

    /// Agents to kill this step
    #[inline]
    pub fn pending_kills(&self) -> u32 {
        self.previous_alive.saturating_sub(self.alive_target)
    }

    /// Agents to spawn this step
    #[inline]
    pub fn pending_spawns(&self) -> u32 {
        self.alive_target.saturating_sub(self.previous_alive)
    }

    /// Lower the authoritative count by `count`, saturating at zero
    pub fn kill(&mut self, count: u32) {
        self.alive_target = self.alive_target.saturating_sub(count);
    }

    /// Give up `count` live agents to another owner or simulator.
    ///
    /// The agents left behind keep as many of the pending kills as they can
    /// still serve; the returned remainder travels with the departing agents.
    /// Pending spawns stay here.
    pub fn release(&mut self, count: u32) -> u32 {
        let kills = self.pending_kills();
        let spawns = self.pending_spawns();
        let remaining = self.previous_alive.saturating_sub(count);
        let kept = kills.min(remaining);

        self.previous_alive = remaining;
        self.alive_target = remaining - kept + spawns;
        kills - kept
    }

    /// Take in `count` live agents carrying `kills` pending kills
    pub fn receive(&mut self, count: u32, kills: u32) {
        self.previous_alive += count;
        self.alive_target = self.alive_target.saturating_add(count).saturating_sub(kills);
    }

    /// Where new agents appear: the centre of the last box, or the target
    pub fn spawn_center(&self) -> Vec2 {
        if self.bounds.is_empty() {
            self.target
        } else {
            self.bounds.center()
        }
    }

    /// Fold in the result of an evaluated step
    pub fn record_step(&mut self, killed: u32, alive: u32) {
        self.total_deaths += killed as u64;
        self.previous_alive = alive;
    }
}

/// Per-slot kill quotas for one step
pub type KillQuotas = [u32; MAX_MERGED_POPULATIONS];

/// Outcome of a reconcile pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub quotas: KillQuotas,
    pub spawned: usize,
    pub grew: bool,
}

impl Reconciliation {
    pub fn total_kills(&self) -> u32 {
        self.quotas.iter().sum()
    }
}

/// Spawn placement settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSettings {
    pub radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
}

/// Reconciles alive counts and owns the spawn RNG
#[derive(Debug)]
pub struct PopulationController {
    rng: StdRng,
    spawn: SpawnSettings,
}

impl PopulationController {
    pub fn new(seed: u64, spawn: SpawnSettings) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spawn,
        }
    }

    /// Compute kill quotas, grow the buffers to fit spawns, then append the
    /// spawned agents to the front arena. Spawned agents count towards
    /// `previous_alive` right away, so a second pass spawns nothing.
    pub fn reconcile(
        &mut self,
        populations: &mut [Population],
        buffers: &mut AgentBuffers,
        pois: &PoiField,
    ) -> Reconciliation {
        let mut report = Reconciliation::default();

        let spawns: u64 = populations.iter().map(|p| p.pending_spawns() as u64).sum();
        let required = buffers.len().saturating_add(spawns as usize);
        report.grew = buffers.ensure_capacity(required);

        for population in populations {
            if let Some(quota) = report.quotas.get_mut(population.tag.index()) {
                *quota = population.pending_kills();
            }

            let count = population.pending_spawns() as usize;
            if count == 0 {
                continue;
            }
            let center = population.spawn_center();
            let front = buffers.front_mut();
            front.reserve(count);
            for _ in 0..count {
                let agent = self.spawn_agent(center, population.tag, pois);
                front.push(agent);
            }
            population.previous_alive += count as u32;
            report.spawned += count;
        }

        if report.spawned > 0 || report.total_kills() > 0 {
            tracing::debug!(
                spawned = report.spawned,
                kills = report.total_kills(),
                capacity = buffers.capacity(),
                "Populations reconciled"
            );
        }

        report
    }

    fn spawn_agent(&mut self, center: Vec2, owner: OwnerTag, pois: &PoiField) -> Agent {
        let mut position = center;
        for _ in 0..SPAWN_ATTEMPTS {
            let angle = self.rng.gen_range(0.0..TAU);
            // sqrt gives a uniform density over the disc
            let distance = self.spawn.radius * self.rng.gen::<f32>().sqrt();
            position = center + Vec2::from_angle(angle) * distance;
            if !pois.contains(position) {
                break;
            }
        }

        let heading = self.rng.gen_range(0.0..TAU);
        let speed = if self.spawn.max_speed > self.spawn.min_speed {
            self.rng.gen_range(self.spawn.min_speed..=self.spawn.max_speed)
        } else {
            self.spawn.max_speed
        };

        Agent::new(position, Vec2::from_angle(heading) * speed, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::poi::Poi;
    use uuid::Uuid;

    fn settings() -> SpawnSettings {
        SpawnSettings {
            radius: 2.0,
            min_speed: 0.5,
            max_speed: 1.0,
        }
    }

    #[test]
    fn test_pending_counts() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 10, Vec2::ZERO);
        assert_eq!(pop.pending_spawns(), 10);
        assert_eq!(pop.pending_kills(), 0);

        pop.record_step(0, 10);
        pop.kill(4);
        assert_eq!(pop.alive_target, 6);
        assert_eq!(pop.pending_kills(), 4);
        assert_eq!(pop.pending_spawns(), 0);

        pop.kill(100);
        assert_eq!(pop.alive_target, 0);
    }

    #[test]
    fn test_release_splits_pending_kills() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 40, Vec2::ZERO);
        pop.record_step(0, 40);
        pop.kill(10);

        // Five stay behind and can only serve five of the ten kills
        let carried = pop.release(35);
        assert_eq!(carried, 5);
        assert_eq!(pop.previous_alive, 5);
        assert_eq!(pop.pending_kills(), 5);

        let mut other = Population::new(Uuid::new_v4(), OwnerTag(1), 0, Vec2::ZERO);
        other.receive(35, carried);
        assert_eq!(other.previous_alive, 35);
        assert_eq!(other.alive_target, 30);
    }

    #[test]
    fn test_release_keeps_kills_when_enough_remain() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 40, Vec2::ZERO);
        pop.record_step(0, 40);
        pop.kill(10);

        assert_eq!(pop.release(5), 0);
        assert_eq!(pop.previous_alive, 35);
        assert_eq!(pop.alive_target, 25);
    }

    #[test]
    fn test_release_keeps_pending_spawns() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 20, Vec2::ZERO);
        pop.record_step(0, 10);

        assert_eq!(pop.release(4), 0);
        assert_eq!(pop.previous_alive, 6);
        assert_eq!(pop.pending_spawns(), 10);
    }

    #[test]
    fn test_record_step_accumulates_deaths() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 5, Vec2::ZERO);
        pop.record_step(3, 7);
        pop.record_step(2, 5);
        assert_eq!(pop.total_deaths, 5);
        assert_eq!(pop.previous_alive, 5);
    }

    #[test]
    fn test_spawn_center_prefers_bounds() {
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 5, Vec2::new(9.0, 9.0));
        assert_eq!(pop.spawn_center(), Vec2::new(9.0, 9.0));

        pop.bounds = Aabb::new(Vec2::new(-2.0, -2.0), Vec2::new(0.0, 2.0));
        assert_eq!(pop.spawn_center(), Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_reconcile_spawns_and_grows() {
        let mut controller = PopulationController::new(7, settings());
        let mut buffers = AgentBuffers::with_capacity(4);
        let mut pops = vec![
            Population::new(Uuid::new_v4(), OwnerTag(0), 6, Vec2::new(5.0, 5.0)),
            Population::new(Uuid::new_v4(), OwnerTag(1), 3, Vec2::new(-5.0, 0.0)),
        ];

        let report = controller.reconcile(&mut pops, &mut buffers, &PoiField::empty());

        assert!(report.grew);
        assert_eq!(report.spawned, 9);
        assert_eq!(buffers.capacity(), 18);
        assert_eq!(buffers.live_count_of(OwnerTag(0)), 6);
        assert_eq!(buffers.live_count_of(OwnerTag(1)), 3);

        for agent in buffers.front().iter().filter(|a| a.owner == OwnerTag(0)) {
            assert!(agent.position.distance_sq_to(Vec2::new(5.0, 5.0)) <= 4.0 + 1e-4);
            let speed = agent.velocity.length();
            assert!((0.5 - 1e-4..=1.0 + 1e-4).contains(&speed));
        }
    }

    #[test]
    fn test_reconcile_sets_kill_quotas() {
        let mut controller = PopulationController::new(1, settings());
        let mut buffers = AgentBuffers::with_capacity(16);
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(2), 8, Vec2::ZERO);
        controller.reconcile(std::slice::from_mut(&mut pop), &mut buffers, &PoiField::empty());
        pop.record_step(0, 8);
        pop.kill(3);

        let report = controller.reconcile(std::slice::from_mut(&mut pop), &mut buffers, &PoiField::empty());
        assert_eq!(report.quotas[2], 3);
        assert_eq!(report.spawned, 0);
        assert!(!report.grew);
    }

    #[test]
    fn test_spawns_avoid_poi() {
        let mut controller = PopulationController::new(3, settings());
        let mut buffers = AgentBuffers::with_capacity(256);
        // POI covering the inner half of the spawn disc
        let pois = PoiField::build(vec![Poi::new(Vec2::ZERO, 1.0)], 16.0, 16.0, 2.0).unwrap();
        let mut pop = Population::new(Uuid::new_v4(), OwnerTag(0), 200, Vec2::ZERO);

        controller.reconcile(std::slice::from_mut(&mut pop), &mut buffers, &pois);

        let inside = buffers.front().iter().filter(|a| pois.contains(a.position)).count();
        // A quarter of the disc area, retried four times
        assert!(inside < 10, "{} agents spawned inside the POI", inside);
    }

    #[test]
    fn test_spawns_are_reproducible() {
        let pop = Population::new(Uuid::new_v4(), OwnerTag(0), 20, Vec2::ZERO);
        let run = |seed| {
            let mut controller = PopulationController::new(seed, settings());
            let mut buffers = AgentBuffers::with_capacity(32);
            let mut pop = pop.clone();
            controller.reconcile(std::slice::from_mut(&mut pop), &mut buffers, &PoiField::empty());
            buffers.front().to_vec()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_reconcile_twice_spawns_once() {
        let mut controller = PopulationController::new(5, settings());
        let mut buffers = AgentBuffers::with_capacity(8);
        let mut pops = vec![Population::new(Uuid::new_v4(), OwnerTag(0), 12, Vec2::ZERO)];

        assert_eq!(controller.reconcile(&mut pops, &mut buffers, &PoiField::empty()).spawned, 12);
        assert_eq!(pops[0].previous_alive, 12);

        let again = controller.reconcile(&mut pops, &mut buffers, &PoiField::empty());
        assert_eq!(again.spawned, 0);
        assert_eq!(again.total_kills(), 0);
        assert_eq!(buffers.len(), 12);
    }
}
