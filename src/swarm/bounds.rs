//! Per-owner axis-aligned bounding boxes
//!
//! Each collection cycle folds the alive positions of every owner in
//! parallel. An owner with no alive agents keeps its previous box; it is never
//! collapsed to a point at the origin.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::swarm::agent::{Agent, OwnerTag};
use crate::swarm::constants::population::MAX_MERGED_POPULATIONS;
use crate::util::vec2::Vec2;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// Accumulator start value; contains nothing and vanishes under `encapsulate`
    pub const EMPTY: Aabb = Aabb {
        min: Vec2::splat(f32::INFINITY),
        max: Vec2::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_point(point: Vec2) -> Self {
        Self { min: point, max: point }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    #[inline]
    pub fn include_point(&mut self, point: Vec2) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow to cover `other`
    #[inline]
    pub fn encapsulate(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn union(mut self, other: Aabb) -> Aabb {
        self.encapsulate(&other);
        self
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Half-size along each axis
    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

type OwnerBoxes = [Aabb; MAX_MERGED_POPULATIONS];

/// Fold alive positions into one box per owner slot
pub fn fold_owner_bounds(agents: &[Agent]) -> OwnerBoxes {
    agents
        .par_iter()
        .fold(
            || [Aabb::EMPTY; MAX_MERGED_POPULATIONS],
            |mut boxes, agent| {
                if agent.alive {
                    if let Some(slot) = boxes.get_mut(agent.owner.index()) {
                        slot.include_point(agent.position);
                    }
                }
                boxes
            },
        )
        .reduce(
            || [Aabb::EMPTY; MAX_MERGED_POPULATIONS],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    x.encapsulate(y);
                }
                a
            },
        )
}

/// Refreshes per-owner boxes and the aggregate box
#[derive(Debug, Default)]
pub struct BoundsTracker {
    aggregate: Aabb,
    cycles: u64,
}

impl BoundsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box around every owner, in population order
    pub fn aggregate(&self) -> Option<Aabb> {
        (!self.aggregate.is_empty()).then_some(self.aggregate)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one collection cycle.
    ///
    /// `owners` yields each population's slot and its stored box in population
    /// order. Boxes of owners with no alive agent are left as they were.
    pub fn collect<'a, I>(&mut self, agents: &[Agent], owners: I)
    where
        I: IntoIterator<Item = (OwnerTag, &'a mut Aabb)>,
    {
        let fresh = fold_owner_bounds(agents);

        let mut aggregate = Aabb::EMPTY;
        for (tag, stored) in owners {
            if let Some(current) = fresh.get(tag.index()) {
                if !current.is_empty() {
                    *stored = *current;
                }
            }
            aggregate.encapsulate(stored);
        }

        self.aggregate = aggregate;
        self.cycles += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(x: f32, y: f32, owner: u8) -> Agent {
        Agent::new(Vec2::new(x, y), Vec2::ZERO, OwnerTag(owner))
    }

    #[test]
    fn test_empty_sentinel() {
        let mut b = Aabb::EMPTY;
        assert!(b.is_empty());
        assert!(!b.contains(Vec2::ZERO));

        b.encapsulate(&Aabb::EMPTY);
        assert!(b.is_empty());

        b.include_point(Vec2::new(1.0, -2.0));
        assert_eq!(b, Aabb::from_point(Vec2::new(1.0, -2.0)));
    }

    #[test]
    fn test_center_and_extents() {
        let b = Aabb::new(Vec2::new(-2.0, 0.0), Vec2::new(4.0, 2.0));
        assert_eq!(b.center(), Vec2::new(1.0, 1.0));
        assert_eq!(b.extents(), Vec2::new(3.0, 1.0));
        assert!(b.contains(Vec2::new(4.0, 2.0)));
        assert!(b.intersects(&Aabb::new(Vec2::new(3.0, 1.0), Vec2::new(9.0, 9.0))));
        assert!(!b.intersects(&Aabb::EMPTY));
    }

    #[test]
    fn test_fold_ignores_dead_agents() {
        let mut agents = vec![agent(0.0, 0.0, 0), agent(2.0, 3.0, 0), agent(100.0, 100.0, 0), agent(-5.0, 1.0, 1)];
        agents[2].alive = false;

        let boxes = fold_owner_bounds(&agents);
        assert_eq!(boxes[0], Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 3.0)));
        assert_eq!(boxes[1], Aabb::from_point(Vec2::new(-5.0, 1.0)));
        assert!(boxes[2].is_empty());
    }

    #[test]
    fn test_stale_box_kept_when_owner_empty() {
        let mut tracker = BoundsTracker::new();
        let mut first = Aabb::EMPTY;
        let mut second = Aabb::EMPTY;

        let agents = vec![agent(1.0, 1.0, 0), agent(3.0, 2.0, 0), agent(-1.0, -1.0, 1)];
        tracker.collect(&agents, [(OwnerTag(0), &mut first), (OwnerTag(1), &mut second)]);
        let before = second;

        // Owner 1 loses its last agent
        let mut next = agents.clone();
        next[2].alive = false;
        next[0].position = Vec2::new(0.0, 0.0);
        tracker.collect(&next, [(OwnerTag(0), &mut first), (OwnerTag(1), &mut second)]);

        assert_eq!(second, before);
        assert!(!second.is_empty());
        assert_eq!(first, Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(3.0, 2.0)));
        assert_eq!(tracker.cycles(), 2);
    }

    #[test]
    fn test_aggregate_covers_owners() {
        let mut tracker = BoundsTracker::new();
        let mut a = Aabb::EMPTY;
        let mut b = Aabb::EMPTY;
        let agents = vec![agent(-4.0, 0.0, 0), agent(6.0, 2.0, 1), agent(1.0, -3.0, 1)];

        tracker.collect(&agents, [(OwnerTag(0), &mut a), (OwnerTag(1), &mut b)]);

        assert_eq!(
            tracker.aggregate(),
            Some(Aabb::new(Vec2::new(-4.0, -3.0), Vec2::new(6.0, 2.0)))
        );
    }

    #[test]
    fn test_owner_never_seen_has_no_box() {
        let mut tracker = BoundsTracker::new();
        let mut a = Aabb::EMPTY;
        tracker.collect(&[], [(OwnerTag(0), &mut a)]);

        assert!(a.is_empty());
        assert_eq!(tracker.aggregate(), None);
    }
}
