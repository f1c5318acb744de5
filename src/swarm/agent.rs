//! Agent records
//!
//! An agent is one simulated rat. It carries only what the flocking passes
//! need; everything else about its colony lives in the owning [`Population`].
//!
//! [`Population`]: crate::swarm::population::Population

use serde::{Deserialize, Serialize};

use crate::swarm::constants::population::MAX_MERGED_POPULATIONS;
use crate::util::vec2::Vec2;

/// Global colony identifier (a horde, or a combat sub-population)
pub type ColonyId = uuid::Uuid;

/// Simulator-local population slot an agent belongs to.
///
/// Only the transfer protocol rewrites this tag; it is always paired with a
/// copy of the agent between arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OwnerTag(pub u8);

impl OwnerTag {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Build a tag from a slot index, if it is a valid slot
    pub fn from_index(index: usize) -> Option<Self> {
        (index < MAX_MERGED_POPULATIONS).then_some(Self(index as u8))
    }
}

/// One simulated agent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Agent {
    pub position: Vec2,
    pub velocity: Vec2,
    pub owner: OwnerTag,
    pub alive: bool,
}

impl Agent {
    pub fn new(position: Vec2, velocity: Vec2, owner: OwnerTag) -> Self {
        Self {
            position,
            velocity,
            owner,
            alive: true,
        }
    }

    /// Alive and owned by `owner`
    #[inline]
    pub fn is_live_member(&self, owner: OwnerTag) -> bool {
        self.alive && self.owner == owner
    }

    /// Copy of this agent flagged dead, as stored in the corpse ring
    #[inline]
    pub fn as_corpse(&self) -> Self {
        Self {
            alive: false,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_tag_bounds() {
        assert_eq!(OwnerTag::from_index(0), Some(OwnerTag(0)));
        assert_eq!(
            OwnerTag::from_index(MAX_MERGED_POPULATIONS - 1).map(OwnerTag::index),
            Some(MAX_MERGED_POPULATIONS - 1)
        );
        assert_eq!(OwnerTag::from_index(MAX_MERGED_POPULATIONS), None);
    }

    #[test]
    fn test_corpse_copy_keeps_state() {
        let agent = Agent::new(Vec2::new(1.0, 2.0), Vec2::new(0.5, 0.0), OwnerTag(3));
        let corpse = agent.as_corpse();

        assert!(agent.alive);
        assert!(!corpse.alive);
        assert_eq!(corpse.position, agent.position);
        assert_eq!(corpse.owner, OwnerTag(3));
        assert!(!corpse.is_live_member(OwnerTag(3)));
    }
}
