//! Agent arenas
//!
//! Two named arenas per simulator with a fixed pass discipline:
//!
//! | pass          | reads   | writes  |
//! |---------------|---------|---------|
//! | grid rebuild  | `front` | `back`  |
//! | evaluation    | `back`  | `front` |
//!
//! After a step `front` holds the integrated state (what renderers, bounds and
//! transfers see) and `back` holds the rearranged copy the grid offsets index
//! into (what point queries see, one step behind).

use std::collections::VecDeque;

use crate::swarm::agent::{Agent, OwnerTag};
use crate::swarm::constants::population::GROWTH_FACTOR;
use crate::swarm::error::BufferError;

#[derive(Debug, Default)]
pub struct AgentBuffers {
    front: Vec<Agent>,
    back: Vec<Agent>,
    /// Slots reserved in both arenas
    capacity: usize,
}

impl AgentBuffers {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            front: Vec::with_capacity(capacity),
            back: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Agents held in `front`, including dead ones awaiting compaction
    #[inline]
    pub fn len(&self) -> usize {
        self.front.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.front.is_empty()
    }

    #[inline]
    pub fn front(&self) -> &[Agent] {
        &self.front
    }

    #[inline]
    pub fn front_mut(&mut self) -> &mut Vec<Agent> {
        &mut self.front
    }

    /// Rearranged copy from the last grid rebuild
    #[inline]
    pub fn back(&self) -> &[Agent] {
        &self.back
    }

    pub fn live_count(&self) -> usize {
        self.front.iter().filter(|a| a.alive).count()
    }

    pub fn live_count_of(&self, owner: OwnerTag) -> usize {
        self.front.iter().filter(|a| a.is_live_member(owner)).count()
    }

    /// Grow both arenas to `required * GROWTH_FACTOR` if they hold fewer than
    /// `required` slots. Existing agents keep their data. Returns whether the
    /// buffers grew.
    pub fn ensure_capacity(&mut self, required: usize) -> bool {
        if self.capacity >= required {
            return false;
        }

        let old = self.capacity;
        let new_capacity = required.saturating_mul(GROWTH_FACTOR);
        self.front.reserve_exact(new_capacity.saturating_sub(self.front.len()));
        self.back.reserve_exact(new_capacity.saturating_sub(self.back.len()));
        self.capacity = new_capacity;

        tracing::info!(
            old_capacity = old,
            new_capacity,
            required,
            "Agent buffers grown"
        );
        true
    }

    /// Explicitly shrink to `capacity` slots.
    ///
    /// Dead agents still waiting for compaction are dropped first. Requests
    /// below the live count are refused and leave the buffers untouched.
    pub fn shrink_to(&mut self, capacity: usize) -> Result<(), BufferError> {
        let live = self.live_count();
        if capacity < live {
            tracing::warn!(requested = capacity, live, "Rejected shrink below live count");
            return Err(BufferError::ShrinkBelowLive {
                requested: capacity,
                live,
            });
        }

        self.front.retain(|a| a.alive);
        self.back.clear();
        self.front.shrink_to(capacity);
        self.back.shrink_to(capacity);
        self.capacity = capacity;

        tracing::info!(capacity, live, "Agent buffers shrunk");
        Ok(())
    }

    /// Borrow split for the grid rebuild: `front` as input, `back` as output
    pub fn sort_pass(&mut self) -> (&[Agent], &mut Vec<Agent>, usize) {
        (&self.front, &mut self.back, self.capacity)
    }

    /// Borrow split for evaluation: `back` as input, `front` as output
    pub fn eval_pass(&mut self) -> (&[Agent], &mut Vec<Agent>) {
        (&self.back, &mut self.front)
    }
}

/// Bounded ring of recently dead agents
#[derive(Debug)]
pub struct CorpseRing {
    corpses: VecDeque<Agent>,
    capacity: usize,
}

impl CorpseRing {
    /// Without the `corpses` feature the ring never retains anything
    pub fn new(capacity: usize) -> Self {
        let capacity = if cfg!(feature = "corpses") { capacity } else { 0 };
        Self {
            corpses: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.corpses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.corpses.is_empty()
    }

    /// Store a corpse, overwriting the oldest one when full. Returns false
    /// when the ring keeps nothing.
    pub fn push(&mut self, agent: Agent) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.corpses.len() == self.capacity {
            self.corpses.pop_front();
        }
        self.corpses.push_back(agent.as_corpse());
        true
    }

    /// Push every corpse, returning how many the ring now holds out of them
    pub fn extend<I: IntoIterator<Item = Agent>>(&mut self, agents: I) -> usize {
        let mut stored = 0;
        for agent in agents {
            if self.push(agent) {
                stored += 1;
            }
        }
        stored.min(self.capacity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> + '_ {
        self.corpses.iter()
    }

    pub fn count_of(&self, owner: OwnerTag) -> usize {
        self.corpses.iter().filter(|c| c.owner == owner).count()
    }

    /// Remove and return every corpse of `owner`, oldest first
    pub fn take_owner(&mut self, owner: OwnerTag) -> Vec<Agent> {
        let mut taken = Vec::new();
        self.corpses.retain(|c| {
            if c.owner == owner {
                taken.push(*c);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn clear(&mut self) {
        self.corpses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    fn agent(i: usize, owner: u8) -> Agent {
        Agent::new(Vec2::new(i as f32, 0.0), Vec2::new(0.0, 1.0), OwnerTag(owner))
    }

    #[test]
    fn test_growth_doubles_required() {
        let mut buffers = AgentBuffers::with_capacity(2048);
        buffers.front_mut().extend((0..2048).map(|i| agent(i, 0)));

        assert!(!buffers.ensure_capacity(2048));
        assert!(buffers.ensure_capacity(5000));
        assert_eq!(buffers.capacity(), 10_000);

        // Contents survive the reallocation
        assert_eq!(buffers.len(), 2048);
        for (i, a) in buffers.front().iter().enumerate() {
            assert_eq!(a.position.x, i as f32);
        }
    }

    #[test]
    fn test_shrink_rejects_below_live() {
        let mut buffers = AgentBuffers::with_capacity(64);
        buffers.front_mut().extend((0..10).map(|i| agent(i, 0)));

        let err = buffers.shrink_to(9).unwrap_err();
        assert_eq!(err, BufferError::ShrinkBelowLive { requested: 9, live: 10 });
        assert_eq!(buffers.capacity(), 64);
        assert_eq!(buffers.len(), 10);
    }

    #[test]
    fn test_shrink_drops_pending_dead() {
        let mut buffers = AgentBuffers::with_capacity(64);
        buffers.front_mut().extend((0..10).map(|i| agent(i, 0)));
        buffers.front_mut()[3].alive = false;
        buffers.front_mut()[7].alive = false;

        buffers.shrink_to(8).unwrap();
        assert_eq!(buffers.capacity(), 8);
        assert_eq!(buffers.len(), 8);
        assert_eq!(buffers.live_count(), 8);
    }

    #[test]
    fn test_live_count_of_owner() {
        let mut buffers = AgentBuffers::with_capacity(16);
        buffers.front_mut().extend((0..6).map(|i| agent(i, (i % 2) as u8)));
        buffers.front_mut()[0].alive = false;

        assert_eq!(buffers.live_count_of(OwnerTag(0)), 2);
        assert_eq!(buffers.live_count_of(OwnerTag(1)), 3);
    }

    #[cfg(feature = "corpses")]
    #[test]
    fn test_corpse_ring_overwrites_oldest() {
        let mut ring = CorpseRing::new(3);
        assert_eq!(ring.extend((0..5).map(|i| agent(i, 0))), 3);

        assert_eq!(ring.len(), 3);
        let xs: Vec<f32> = ring.iter().map(|c| c.position.x).collect();
        assert_eq!(xs, vec![2.0, 3.0, 4.0]);
        assert!(ring.iter().all(|c| !c.alive));
    }

    #[cfg(feature = "corpses")]
    #[test]
    fn test_corpse_ring_take_owner() {
        let mut ring = CorpseRing::new(10);
        ring.extend((0..6).map(|i| agent(i, (i % 3) as u8)));

        let taken = ring.take_owner(OwnerTag(1));
        assert_eq!(taken.len(), 2);
        assert!(taken.iter().all(|c| c.owner == OwnerTag(1)));
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.count_of(OwnerTag(1)), 0);
        assert_eq!(ring.count_of(OwnerTag(2)), 2);
    }

    #[test]
    fn test_zero_capacity_ring_keeps_nothing() {
        let mut ring = CorpseRing::new(0);
        assert!(!ring.push(agent(0, 0)));
        assert_eq!(ring.extend((0..4).map(|i| agent(i, 0))), 0);
        assert!(ring.is_empty());
    }
}
