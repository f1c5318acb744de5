//! Simulator instances
//!
//! A simulator owns one agent arena pair, one grid, one corpse ring and the
//! records of the populations it hosts. A solo simulator drives a single
//! colony; a merged simulator hosts up to [`MAX_MERGED_POPULATIONS`] owners
//! that can see each other for targeting.
//!
//! Step order: reconcile → grid rebuild → evaluate → corpse capture → bounds.

use hashbrown::HashMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::Arc;
use uuid::Uuid;

use crate::swarm::agent::{Agent, ColonyId, OwnerTag};
use crate::swarm::bounds::{Aabb, BoundsTracker};
use crate::swarm::buffers::{AgentBuffers, CorpseRing};
use crate::swarm::constants::flocking::TICK_RATE;
use crate::swarm::constants::population::{DEFAULT_CORPSE_CAPACITY, INITIAL_AGENT_CAPACITY, MAX_MERGED_POPULATIONS};
use crate::swarm::error::{BufferError, GridError, SimulationError, TransferError};
use crate::swarm::flocking::{self, FlockingParams, StepContext};
use crate::swarm::grid::{GridLayout, GridStats, SpatialGrid};
use crate::swarm::performance::{StepMonitor, StepStatus, StepTiming};
use crate::swarm::poi::PoiField;
use crate::swarm::population::{Population, PopulationController, Reconciliation};
use crate::util::vec2::Vec2;

pub type SimulatorId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorKind {
    /// One colony roaming the map
    Solo,
    /// Several owners sharing one grid (combat)
    Merged,
}

impl SimulatorKind {
    pub fn max_populations(&self) -> usize {
        match self {
            SimulatorKind::Solo => 1,
            SimulatorKind::Merged => MAX_MERGED_POPULATIONS,
        }
    }
}

/// Construction settings for a simulator
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorSettings {
    /// Half-extent of the world on each axis
    pub world_bound: Vec2,
    pub params: FlockingParams,
    pub initial_capacity: usize,
    pub corpse_capacity: usize,
    /// Spawn RNG seed
    pub seed: u64,
}

impl SimulatorSettings {
    pub fn colony() -> Self {
        Self {
            world_bound: Vec2::splat(256.0),
            params: FlockingParams::colony(),
            initial_capacity: INITIAL_AGENT_CAPACITY,
            corpse_capacity: 0,
            seed: 0,
        }
    }

    pub fn combat() -> Self {
        Self {
            world_bound: Vec2::splat(256.0),
            params: FlockingParams::combat(),
            initial_capacity: INITIAL_AGENT_CAPACITY,
            corpse_capacity: DEFAULT_CORPSE_CAPACITY,
            seed: 0,
        }
    }
}

/// What one call to [`Simulator::step`] did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepReport {
    pub step: u64,
    /// Agents held after the step, dead ones awaiting compaction included
    pub agents: usize,
    pub alive: usize,
    pub spawned: usize,
    pub killed: u32,
    pub compacted: usize,
    pub grew: bool,
    /// Paused or empty simulator; nothing moved
    pub skipped: bool,
}

/// Serializable snapshot of one population
#[derive(Debug, Clone, Serialize)]
pub struct PopulationSummary {
    pub colony: ColonyId,
    pub alive: u32,
    pub alive_target: u32,
    pub total_deaths: u64,
    pub bounds: Option<Aabb>,
}

/// Serializable snapshot of a simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorSummary {
    pub id: SimulatorId,
    pub kind: SimulatorKind,
    pub steps: u64,
    pub capacity: usize,
    pub corpses: usize,
    pub aggregate_bounds: Option<Aabb>,
    pub timing: StepTiming,
    pub populations: Vec<PopulationSummary>,
}

pub struct Simulator {
    pub(crate) id: SimulatorId,
    pub(crate) kind: SimulatorKind,
    pub(crate) settings: SimulatorSettings,
    pub(crate) populations: SmallVec<[Population; MAX_MERGED_POPULATIONS]>,
    pub(crate) tags: HashMap<ColonyId, OwnerTag>,
    pub(crate) buffers: AgentBuffers,
    pub(crate) corpses: CorpseRing,
    grid: SpatialGrid,
    /// Set when `front` changed outside a step; point queries fall back to a scan
    pub(crate) grid_stale: bool,
    controller: PopulationController,
    bounds: BoundsTracker,
    pub(crate) pois: Arc<PoiField>,
    monitor: StepMonitor,
    paused: bool,
    steps: u64,
}

impl Simulator {
    /// A simulator hosting a single colony of `alive` agents seeking `target`
    pub fn solo(
        colony: ColonyId,
        alive: u32,
        target: Vec2,
        settings: SimulatorSettings,
        pois: Arc<PoiField>,
    ) -> Result<Self, GridError> {
        let mut sim = Self::new(SimulatorKind::Solo, settings, pois)?;
        let tag = OwnerTag(0);
        sim.populations.push(Population::new(colony, tag, alive, target));
        sim.tags.insert(colony, tag);
        Ok(sim)
    }

    /// An empty combat simulator; owners join through the transfer protocol
    pub fn merged(settings: SimulatorSettings, pois: Arc<PoiField>) -> Result<Self, GridError> {
        Self::new(SimulatorKind::Merged, settings, pois)
    }

    pub(crate) fn new(kind: SimulatorKind, settings: SimulatorSettings, pois: Arc<PoiField>) -> Result<Self, GridError> {
        let layout = GridLayout::new(
            settings.world_bound.x,
            settings.world_bound.y,
            settings.params.visual_range,
        )?;
        let id = Uuid::new_v4();

        tracing::debug!(
            %id,
            ?kind,
            dims = ?layout.dims(),
            capacity = settings.initial_capacity,
            "Simulator created"
        );

        Ok(Self {
            id,
            kind,
            buffers: AgentBuffers::with_capacity(settings.initial_capacity),
            corpses: CorpseRing::new(settings.corpse_capacity),
            grid: SpatialGrid::new(layout),
            grid_stale: true,
            controller: PopulationController::new(settings.seed, settings.params.spawn_settings()),
            bounds: BoundsTracker::new(),
            pois,
            monitor: StepMonitor::new(TICK_RATE),
            paused: false,
            steps: 0,
            populations: SmallVec::new(),
            tags: HashMap::new(),
            settings,
        })
    }

    // ------------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------------

    /// Bring every population to its authoritative count: set kill quotas and
    /// spawn missing agents, growing the buffers first.
    pub fn reconcile(&mut self) -> Reconciliation {
        self.controller
            .reconcile(&mut self.populations, &mut self.buffers, &self.pois)
    }

    /// Advance one step of `dt` seconds.
    ///
    /// An error means the simulator's invariants are broken and it must not be
    /// stepped again.
    pub fn step(&mut self, dt: f32) -> Result<StepReport, SimulationError> {
        if self.paused {
            return Ok(StepReport {
                step: self.steps,
                agents: self.buffers.len(),
                skipped: true,
                ..Default::default()
            });
        }

        self.monitor.step_start();
        let reconciliation = self.reconcile();

        if self.buffers.is_empty() {
            self.monitor.step_end(0);
            return Ok(StepReport {
                step: self.steps,
                grew: reconciliation.grew,
                skipped: true,
                ..Default::default()
            });
        }

        // front -> back, sorted by cell
        let (input, output, capacity) = self.buffers.sort_pass();
        self.grid.rebuild(input, output, capacity)?;
        self.grid_stale = false;

        let mut targets = [None; MAX_MERGED_POPULATIONS];
        for population in &self.populations {
            targets[population.tag.index()] = Some(population.target);
        }

        // back -> front, integrated
        let ctx = StepContext {
            grid: &self.grid,
            params: &self.settings.params,
            pois: &self.pois,
            targets: &targets,
            world_bound: self.settings.world_bound,
            merged: self.kind == SimulatorKind::Merged,
            total_agents: self.buffers.back().len(),
            dt,
        };
        let (input, output) = self.buffers.eval_pass();
        let evaluation = flocking::evaluate(&ctx, input, &reconciliation.quotas, output)?;

        // Agents still dead in `front` are exactly this step's kills
        self.corpses
            .extend(self.buffers.front().iter().filter(|a| !a.alive).copied());

        for population in self.populations.iter_mut() {
            let slot = population.tag.index();
            population.record_step(evaluation.killed[slot], evaluation.alive[slot]);
        }

        self.bounds.collect(
            self.buffers.front(),
            self.populations.iter_mut().map(|p| (p.tag, &mut p.bounds)),
        );

        self.steps += 1;
        let alive: usize = evaluation.alive.iter().map(|&n| n as usize).sum();
        self.monitor.step_end(alive);

        let report = StepReport {
            step: self.steps,
            agents: self.buffers.len(),
            alive,
            spawned: reconciliation.spawned,
            killed: evaluation.killed.iter().sum(),
            compacted: evaluation.compacted,
            grew: reconciliation.grew,
            skipped: false,
        };

        tracing::debug!(
            sim = %self.id,
            step = report.step,
            alive = report.alive,
            killed = report.killed,
            spawned = report.spawned,
            compacted = report.compacted,
            "Simulator stepped"
        );

        Ok(report)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn id(&self) -> SimulatorId {
        self.id
    }

    pub fn kind(&self) -> SimulatorKind {
        self.kind
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn population(&self, colony: ColonyId) -> Option<&Population> {
        let tag = self.tags.get(&colony)?;
        self.populations.iter().find(|p| p.tag == *tag)
    }

    pub(crate) fn population_mut(&mut self, colony: ColonyId) -> Option<&mut Population> {
        let tag = *self.tags.get(&colony)?;
        self.populations.iter_mut().find(|p| p.tag == tag)
    }

    pub fn contains_colony(&self, colony: ColonyId) -> bool {
        self.tags.contains_key(&colony)
    }

    pub fn tag_of(&self, colony: ColonyId) -> Option<OwnerTag> {
        self.tags.get(&colony).copied()
    }

    /// Live agents of `colony` after the last step or transfer
    pub fn alive_count(&self, colony: ColonyId) -> Option<u32> {
        self.population(colony).map(|p| p.previous_alive)
    }

    pub fn total_alive(&self) -> usize {
        self.populations.iter().map(|p| p.previous_alive as usize).sum()
    }

    pub fn total_deaths(&self, colony: ColonyId) -> Option<u64> {
        self.population(colony).map(|p| p.total_deaths)
    }

    /// Last known box of `colony`; `None` until it has had a live agent
    pub fn bounds(&self, colony: ColonyId) -> Option<Aabb> {
        self.population(colony)
            .map(|p| p.bounds)
            .filter(|b| !b.is_empty())
    }

    pub fn aggregate_bounds(&self) -> Option<Aabb> {
        self.bounds.aggregate()
    }

    /// Integrated agent state, dead agents awaiting compaction included
    pub fn agents(&self) -> &[Agent] {
        self.buffers.front()
    }

    pub fn corpses(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.corpses.iter()
    }

    pub fn corpse_count(&self) -> usize {
        self.corpses.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffers.capacity()
    }

    pub fn grid_stats(&self) -> GridStats {
        self.grid.stats()
    }

    pub fn step_status(&self) -> StepStatus {
        self.monitor.status()
    }

    /// One-line timing report, e.g. for logs
    pub fn step_status_message(&self) -> String {
        self.monitor.status_message()
    }

    pub fn is_full(&self) -> bool {
        self.populations.len() >= self.kind.max_populations()
    }

    /// Whether any live agent of `colony` lies within `radius` of `point`.
    ///
    /// Uses the grid over the last rearranged array, so it sees positions as
    /// of the previous rebuild. After a transfer the grid is stale and the
    /// current agents are scanned linearly instead.
    pub fn contains_point(&self, colony: ColonyId, point: Vec2, radius: f32) -> bool {
        let Some(population) = self.population(colony) else {
            return false;
        };
        if population.bounds.is_empty() || !population.bounds.expanded(radius).contains(point) {
            return false;
        }

        let tag = population.tag;
        let radius_sq = radius * radius;
        let hit = |a: &Agent| a.is_live_member(tag) && a.position.distance_sq_to(point) <= radius_sq;

        let sorted = self.buffers.back();
        if self.grid_stale || self.grid.len() != sorted.len() {
            return self.buffers.front().iter().any(hit);
        }

        let reach = (radius / self.grid.layout().cell_size()).ceil().max(1.0) as u32;
        self.grid
            .block_ranges(point, reach)
            .any(|range| sorted[range].iter().any(hit))
    }

    pub fn summary(&self) -> SimulatorSummary {
        SimulatorSummary {
            id: self.id,
            kind: self.kind,
            steps: self.steps,
            capacity: self.capacity(),
            corpses: self.corpses.len(),
            aggregate_bounds: self.aggregate_bounds(),
            timing: self.monitor.timing(),
            populations: self
                .populations
                .iter()
                .map(|p| PopulationSummary {
                    colony: p.colony,
                    alive: p.previous_alive,
                    alive_target: p.alive_target,
                    total_deaths: p.total_deaths,
                    bounds: (!p.bounds.is_empty()).then_some(p.bounds),
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Collaborator inputs
    // ------------------------------------------------------------------------

    /// Set the authoritative alive count of `colony`
    pub fn set_alive_target(&mut self, colony: ColonyId, alive: u32) -> Result<(), TransferError> {
        let population = self
            .population_mut(colony)
            .ok_or(TransferError::UnknownColony(colony))?;
        population.alive_target = alive;
        Ok(())
    }

    pub fn set_target(&mut self, colony: ColonyId, target: Vec2) -> Result<(), TransferError> {
        let population = self
            .population_mut(colony)
            .ok_or(TransferError::UnknownColony(colony))?;
        population.target = target;
        Ok(())
    }

    /// Kill `count` agents of `colony` over the next step, saturating at zero
    pub fn kill(&mut self, colony: ColonyId, count: u32) -> Result<(), TransferError> {
        let population = self
            .population_mut(colony)
            .ok_or(TransferError::UnknownColony(colony))?;
        population.kill(count);
        Ok(())
    }

    /// Explicitly shrink the agent buffers
    pub fn shrink_to(&mut self, capacity: usize) -> Result<(), BufferError> {
        self.buffers.shrink_to(capacity)?;
        self.grid_stale = true;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transfer support
    // ------------------------------------------------------------------------

    /// Lowest owner slot not used by any population
    pub(crate) fn free_tag(&self) -> Option<OwnerTag> {
        (0..self.kind.max_populations())
            .filter_map(OwnerTag::from_index)
            .find(|tag| self.populations.iter().all(|p| p.tag != *tag))
    }

    pub(crate) fn insert_population(&mut self, population: Population) {
        self.tags.insert(population.colony, population.tag);
        self.populations.push(population);
    }

    pub(crate) fn take_population(&mut self, colony: ColonyId) -> Option<Population> {
        let tag = self.tags.remove(&colony)?;
        let index = self.populations.iter().position(|p| p.tag == tag)?;
        Some(self.populations.remove(index))
    }

    /// Re-derive boxes from the current agents after a transfer
    pub(crate) fn refresh_bounds(&mut self) {
        self.bounds.collect(
            self.buffers.front(),
            self.populations.iter_mut().map(|p| (p.tag, &mut p.bounds)),
        );
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("populations", &self.populations.len())
            .field("agents", &self.buffers.len())
            .field("capacity", &self.buffers.capacity())
            .field("steps", &self.steps)
            .field("paused", &self.paused)
            .finish()
    }
}
