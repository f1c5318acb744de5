//! Transfer protocol
//!
//! The only code path that rewrites an agent's owner tag. Agents are always
//! copied between arenas, never shared, so an agent is live in at most one
//! simulator at a time.
//!
//! Every request is validated against both sides before anything moves; a
//! rejected request leaves both simulators exactly as they were. Any accepted
//! transfer marks the grids involved stale until their next step.
//!
//! Owner lifecycle: `Unattached → Solo → Merged → Solo | Eliminated`.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::swarm::agent::{Agent, ColonyId, OwnerTag};
use crate::swarm::bounds::Aabb;
use crate::swarm::error::TransferError;
use crate::swarm::population::Population;
use crate::swarm::simulator::{Simulator, SimulatorKind};
use crate::util::vec2::Vec2;

/// Agents handed between simulators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBatch {
    pub colony: ColonyId,
    /// Live agents
    pub agents: Vec<Agent>,
    /// Recent corpses of the same owner
    pub corpses: Vec<Agent>,
    pub target: Vec2,
    pub total_deaths: u64,
    /// Kills signalled against these agents that no step has applied yet
    #[serde(default)]
    pub pending_kills: u32,
}

impl AgentBatch {
    pub fn new(colony: ColonyId, agents: Vec<Agent>, target: Vec2) -> Self {
        Self {
            colony,
            agents,
            corpses: Vec::new(),
            target,
            total_deaths: 0,
            pending_kills: 0,
        }
    }

    pub fn live_count(&self) -> usize {
        self.agents.iter().filter(|a| a.alive).count()
    }
}

/// Where an owner currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OwnerPhase {
    Unattached,
    Solo,
    Merged,
    Eliminated,
}

/// Result of pulling an owner out of a combat simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Survivors were handed back to the colony simulator
    Returned { alive: u32, corpses: usize },
    /// No live agents remained; the owner was dropped
    Eliminated { total_deaths: u64 },
}

impl LeaveOutcome {
    pub fn phase(&self) -> OwnerPhase {
        match self {
            LeaveOutcome::Returned { .. } => OwnerPhase::Solo,
            LeaveOutcome::Eliminated { .. } => OwnerPhase::Eliminated,
        }
    }
}

impl Simulator {
    pub fn phase_of(&self, colony: ColonyId) -> OwnerPhase {
        match (self.contains_colony(colony), self.kind()) {
            (false, _) => OwnerPhase::Unattached,
            (true, SimulatorKind::Solo) => OwnerPhase::Solo,
            (true, SimulatorKind::Merged) => OwnerPhase::Merged,
        }
    }

    /// Live agents of `colony` currently held (not last step's count)
    fn held_live(&self, colony: ColonyId) -> Result<(OwnerTag, usize), TransferError> {
        let tag = self.tag_of(colony).ok_or(TransferError::UnknownColony(colony))?;
        Ok((tag, self.buffers.live_count_of(tag)))
    }

    fn check_can_host(&self, colony: ColonyId) -> Result<(), TransferError> {
        if self.contains_colony(colony) {
            return Err(TransferError::DuplicateColony(colony));
        }
        if self.is_full() {
            return Err(TransferError::SimulatorFull(self.kind().max_populations()));
        }
        Ok(())
    }

    fn check_available(&self, colony: ColonyId, count: usize) -> Result<OwnerTag, TransferError> {
        let (tag, available) = self.held_live(colony)?;
        if count > available {
            return Err(TransferError::InsufficientAgents {
                colony,
                requested: count,
                available,
            });
        }
        Ok(tag)
    }

    fn after_transfer(&mut self) {
        self.grid_stale = true;
        self.refresh_bounds();
    }

    /// Copy the batch's live agents into `front` and its corpses into the
    /// ring under `tag`. Returns the live count and the corpses kept.
    fn receive_agents(&mut self, tag: OwnerTag, agents: Vec<Agent>, corpses: Vec<Agent>) -> (u32, usize) {
        let (live, dead): (Vec<Agent>, Vec<Agent>) = agents.into_iter().partition(|a| a.alive);
        let alive = live.len() as u32;

        self.buffers.ensure_capacity(self.buffers.len() + live.len());
        self.buffers
            .front_mut()
            .extend(live.into_iter().map(|a| Agent { owner: tag, ..a }));

        let offered = dead.len() + corpses.len();
        let kept = self
            .corpses
            .extend(dead.into_iter().chain(corpses).map(|c| Agent { owner: tag, ..c }));
        if kept < offered {
            tracing::debug!(
                sim = %self.id(),
                owner = tag.0,
                offered,
                kept,
                "Corpses discarded on transfer"
            );
        }
        (alive, kept)
    }

    /// Add a new owner with the batch's agents and corpses.
    ///
    /// Buffers grow before the copy. Dead agents in `batch.agents` are treated
    /// as corpses. Pending kills carried by the batch are applied on the next
    /// step here.
    pub fn merge_in(&mut self, batch: AgentBatch) -> Result<OwnerTag, TransferError> {
        self.merge_batch(batch).map(|(tag, _)| tag)
    }

    fn merge_batch(&mut self, batch: AgentBatch) -> Result<(OwnerTag, usize), TransferError> {
        self.check_can_host(batch.colony)?;
        let tag = self
            .free_tag()
            .ok_or(TransferError::SimulatorFull(self.kind().max_populations()))?;

        let (alive, kept) = self.receive_agents(tag, batch.agents, batch.corpses);

        let mut population = Population::new(batch.colony, tag, 0, batch.target);
        population.receive(alive, batch.pending_kills);
        population.total_deaths = batch.total_deaths;
        self.insert_population(population);
        self.after_transfer();

        tracing::info!(
            sim = %self.id(),
            colony = %batch.colony,
            owner = tag.0,
            alive,
            pending_kills = batch.pending_kills.min(alive),
            "Population merged in"
        );
        Ok((tag, kept))
    }

    /// Fold a batch into an owner already present. Returns the corpses kept.
    fn absorb(&mut self, batch: AgentBatch) -> Result<usize, TransferError> {
        let tag = self
            .tag_of(batch.colony)
            .ok_or(TransferError::UnknownColony(batch.colony))?;

        let (alive, kept) = self.receive_agents(tag, batch.agents, batch.corpses);
        if let Some(population) = self.population_mut(batch.colony) {
            population.receive(alive, batch.pending_kills);
            population.total_deaths += batch.total_deaths;
        }
        self.after_transfer();
        Ok(kept)
    }

    /// Remove the last `count` live agents of `colony` in buffer order
    fn take_last_live(&mut self, tag: OwnerTag, count: usize) -> Vec<Agent> {
        let front = self.buffers.front_mut();
        let mut seen = 0;
        let mut cut = front.len();
        while seen < count && cut > 0 {
            cut -= 1;
            if front[cut].is_live_member(tag) {
                seen += 1;
            }
        }

        let tail = front.split_off(cut);
        let (moved, kept): (Vec<Agent>, Vec<Agent>) = tail.into_iter().partition(|a| a.is_live_member(tag));
        front.extend(kept);
        moved
    }

    /// Remove `count` live agents of `colony`. The population stays, even
    /// when emptied.
    ///
    /// Pending kills the remaining agents cannot serve leave with the batch.
    pub fn split_out(&mut self, colony: ColonyId, count: usize) -> Result<AgentBatch, TransferError> {
        let tag = self.check_available(colony, count)?;

        let moved = self.take_last_live(tag, count);
        let mut batch = AgentBatch::new(colony, Vec::new(), Vec2::ZERO);
        if let Some(population) = self.population_mut(colony) {
            batch.pending_kills = population.release(moved.len() as u32);
            batch.target = population.target;
        }
        batch.agents = moved;
        self.after_transfer();

        tracing::info!(
            sim = %self.id(),
            colony = %colony,
            count = batch.agents.len(),
            pending_kills = batch.pending_kills,
            "Agents split out"
        );
        Ok(batch)
    }

    /// Drop the owner, returning its record, live agents and corpses
    fn detach(&mut self, colony: ColonyId) -> Result<(Population, Vec<Agent>, Vec<Agent>), TransferError> {
        let population = self
            .take_population(colony)
            .ok_or(TransferError::UnknownColony(colony))?;
        let tag = population.tag;

        let mut live = Vec::new();
        self.buffers.front_mut().retain(|a| {
            if a.owner != tag {
                return true;
            }
            if a.alive {
                live.push(*a);
            }
            false
        });
        let corpses = self.corpses.take_owner(tag);
        self.after_transfer();
        Ok((population, live, corpses))
    }

    /// Remove `colony` with its live agents and its own corpses. Other
    /// owners' corpses stay.
    pub fn retrieve(&mut self, colony: ColonyId) -> Result<AgentBatch, TransferError> {
        let (population, agents, corpses) = self.detach(colony)?;

        tracing::info!(
            sim = %self.id(),
            colony = %colony,
            alive = agents.len(),
            corpses = corpses.len(),
            "Population retrieved"
        );

        let pending_kills = population.pending_kills().min(agents.len() as u32);
        Ok(AgentBatch {
            colony,
            agents,
            corpses,
            target: population.target,
            total_deaths: population.total_deaths,
            pending_kills,
        })
    }

    /// Discard `colony` and everything it owns, returning its final record
    pub fn remove_population(&mut self, colony: ColonyId) -> Result<Population, TransferError> {
        let (population, agents, corpses) = self.detach(colony)?;
        tracing::info!(
            sim = %self.id(),
            colony = %colony,
            discarded = agents.len() + corpses.len(),
            "Population removed"
        );
        Ok(population)
    }

    /// Move `count` live agents of `colony` into a new owner `new_colony`
    /// inside this simulator
    pub fn split_population(
        &mut self,
        colony: ColonyId,
        new_colony: ColonyId,
        count: usize,
    ) -> Result<OwnerTag, TransferError> {
        let from = self.check_available(colony, count)?;
        self.check_can_host(new_colony)?;
        let to = self
            .free_tag()
            .ok_or(TransferError::SimulatorFull(self.kind().max_populations()))?;

        let mut moved = 0usize;
        for agent in self.buffers.front_mut().iter_mut().rev() {
            if moved == count {
                break;
            }
            if agent.is_live_member(from) {
                agent.owner = to;
                moved += 1;
            }
        }

        let mut target = Vec2::ZERO;
        let mut carried = 0;
        if let Some(source) = self.population_mut(colony) {
            carried = source.release(moved as u32);
            target = source.target;
        }
        let mut split = Population::new(new_colony, to, 0, target);
        split.receive(moved as u32, carried);
        self.insert_population(split);
        self.after_transfer();

        tracing::info!(
            sim = %self.id(),
            from = %colony,
            to = %new_colony,
            count,
            "Population split"
        );
        Ok(to)
    }
}

/// Move `count` live agents of `colony` from `src` to `dst`. The owner is
/// created in `dst` if it is not there yet.
pub fn transfer(src: &mut Simulator, dst: &mut Simulator, colony: ColonyId, count: usize) -> Result<(), TransferError> {
    src.check_available(colony, count)?;
    if !dst.contains_colony(colony) {
        dst.check_can_host(colony)?;
    }

    let batch = src.split_out(colony, count)?;
    if dst.contains_colony(colony) {
        dst.absorb(batch)?;
    } else {
        dst.merge_in(batch)?;
    }
    Ok(())
}

/// Move the whole of `colony` from its solo simulator into `combat`
pub fn join_combat(colony_sim: &mut Simulator, combat: &mut Simulator, colony: ColonyId) -> Result<OwnerTag, TransferError> {
    colony_sim.held_live(colony)?;
    combat.check_can_host(colony)?;

    let batch = colony_sim.retrieve(colony)?;
    combat.merge_in(batch)
}

/// Pull `colony` out of `combat`: survivors return to `colony_sim`, a colony
/// with no survivors anywhere is eliminated.
///
/// When `colony_sim` still hosts part of the colony (after a partial
/// `transfer`) the survivors rejoin that population. `corpses` counts what
/// the colony simulator's ring actually kept.
pub fn leave_combat(combat: &mut Simulator, colony_sim: &mut Simulator, colony: ColonyId) -> Result<LeaveOutcome, TransferError> {
    let (_, live) = combat.held_live(colony)?;
    let rejoining = colony_sim.contains_colony(colony);
    if live > 0 && !rejoining {
        colony_sim.check_can_host(colony)?;
    }

    let batch = combat.retrieve(colony)?;
    if live == 0 && !rejoining {
        tracing::info!(colony = %colony, deaths = batch.total_deaths, "Colony eliminated in combat");
        return Ok(LeaveOutcome::Eliminated {
            total_deaths: batch.total_deaths,
        });
    }

    let alive = batch.agents.len() as u32;
    let corpses = if rejoining {
        colony_sim.absorb(batch)?
    } else {
        colony_sim.merge_batch(batch)?.1
    };
    Ok(LeaveOutcome::Returned { alive, corpses })
}

/// Split `count` agents of `colony` off into a new solo simulator owned by
/// `new_colony`, sharing the source's settings and POI field
pub fn split_to_new_simulator(
    src: &mut Simulator,
    colony: ColonyId,
    new_colony: ColonyId,
    count: usize,
) -> Result<Simulator, TransferError> {
    src.check_available(colony, count)?;
    let mut settings = src.settings().clone();
    settings.seed = settings.seed.wrapping_add(1);
    let mut fresh = Simulator::new(SimulatorKind::Solo, settings, Arc::clone(&src.pois))?;

    let mut batch = src.split_out(colony, count)?;
    batch.colony = new_colony;
    fresh.merge_in(batch)?;
    Ok(fresh)
}

/// Lock two shared simulators in a fixed address order.
///
/// Guards come back in argument order. Returns `None` when both handles point
/// at the same simulator.
pub fn lock_pair<'a>(
    a: &'a Arc<Mutex<Simulator>>,
    b: &'a Arc<Mutex<Simulator>>,
) -> Option<(MutexGuard<'a, Simulator>, MutexGuard<'a, Simulator>)> {
    if Arc::ptr_eq(a, b) {
        return None;
    }
    if Arc::as_ptr(a) < Arc::as_ptr(b) {
        let first = a.lock();
        let second = b.lock();
        Some((first, second))
    } else {
        let second = b.lock();
        let first = a.lock();
        Some((first, second))
    }
}

/// Union of the boxes of several colonies, as used for combat range checks
pub fn combined_bounds(sim: &Simulator, colonies: &[ColonyId]) -> Option<Aabb> {
    let combined = colonies
        .iter()
        .filter_map(|c| sim.bounds(*c))
        .fold(Aabb::EMPTY, Aabb::union);
    (!combined.is_empty()).then_some(combined)
}
