//! Economy and resource management.
//!
//! Two currencies, minerals and gas, are gathered from matching resource
//! nodes and spent on units and buildings. All amounts are integers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PlayerId};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::races::Race;

/// Amount extracted per gather event.
pub const GATHER_AMOUNT: u32 = 10;

/// Resource node kinds. Each kind credits its own currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Mineral field, credits minerals.
    Minerals,
    /// Gas vent, credits gas.
    Gas,
}

/// A bundle of both currencies. Used for ledgers and for costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Minerals.
    pub minerals: u32,
    /// Gas.
    pub gas: u32,
}

impl Resources {
    /// Create a new bundle.
    #[must_use]
    pub const fn new(minerals: u32, gas: u32) -> Self {
        Self { minerals, gas }
    }

    /// Nothing.
    pub const ZERO: Self = Self::new(0, 0);

    /// Amount held of one currency.
    #[must_use]
    pub const fn amount(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Minerals => self.minerals,
            ResourceKind::Gas => self.gas,
        }
    }

    /// Check if this ledger covers `cost` in every currency.
    #[must_use]
    pub const fn can_afford(&self, cost: &Self) -> bool {
        self.minerals >= cost.minerals && self.gas >= cost.gas
    }

    /// Spend `cost` if affordable.
    ///
    /// Returns true if the transaction succeeded. On failure the ledger is
    /// unchanged.
    pub fn spend(&mut self, cost: &Self) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.minerals -= cost.minerals;
        self.gas -= cost.gas;
        true
    }

    /// Credit one currency.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        match kind {
            ResourceKind::Minerals => self.minerals = self.minerals.saturating_add(amount),
            ResourceKind::Gas => self.gas = self.gas.saturating_add(amount),
        }
    }

    /// A percentage of this bundle, rounded down per currency and
    /// saturating at `u32::MAX`.
    #[must_use]
    pub const fn percent(&self, percent: u32) -> Self {
        Self {
            minerals: scale_percent(self.minerals, percent),
            gas: scale_percent(self.gas, percent),
        }
    }
}

const fn scale_percent(amount: u32, percent: u32) -> u32 {
    let scaled = amount as u64 * percent as u64 / 100;
    if scaled > u32::MAX as u64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

impl std::ops::Add for Resources {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            minerals: self.minerals.saturating_add(rhs.minerals),
            gas: self.gas.saturating_add(rhs.gas),
        }
    }
}

impl std::ops::AddAssign for Resources {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// A resource node that workers gather from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Entity id.
    pub id: EntityId,
    /// Which currency this node yields.
    pub kind: ResourceKind,
    /// Remaining amount in this node.
    pub remaining: u32,
    /// Position in world space.
    pub position: Vec2Fixed,
    /// Footprint radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

impl ResourceNode {
    /// Create a new resource node.
    #[must_use]
    pub const fn new(
        id: EntityId,
        kind: ResourceKind,
        remaining: u32,
        position: Vec2Fixed,
        radius: Fixed,
    ) -> Self {
        Self {
            id,
            kind,
            remaining,
            position,
            radius,
        }
    }

    /// Check if this node is depleted.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.remaining == 0
    }

    /// Extract resources from this node.
    ///
    /// Returns the actual amount extracted (may be less than requested if node is nearly depleted).
    pub fn extract(&mut self, requested: u32) -> u32 {
        let extracted = requested.min(self.remaining);
        self.remaining -= extracted;
        extracted
    }
}

/// A participant in the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player id.
    pub id: PlayerId,
    /// Race, resolved once into a template table.
    pub race: Race,
    /// Current stockpile.
    pub ledger: Resources,
    /// Live units owned by this player.
    pub units: BTreeSet<EntityId>,
    /// Completed buildings owned by this player.
    pub buildings: BTreeSet<EntityId>,
    /// Construction sites owned by this player.
    #[serde(default)]
    pub sites: BTreeSet<EntityId>,
}

impl Player {
    /// Create a new player with a starting stockpile.
    #[must_use]
    pub fn new(id: PlayerId, race: Race, ledger: Resources) -> Self {
        Self {
            id,
            race,
            ledger,
            units: BTreeSet::new(),
            buildings: BTreeSet::new(),
            sites: BTreeSet::new(),
        }
    }

    /// A player with no units, buildings or construction sites has been
    /// eliminated.
    #[must_use]
    pub fn is_eliminated(&self) -> bool {
        self.units.is_empty() && self.buildings.is_empty() && self.sites.is_empty()
    }

    /// Move a finished site over to the completed buildings.
    pub fn complete_site(&mut self, id: EntityId) {
        self.sites.remove(&id);
        self.buildings.insert(id);
    }

    /// Forget a building, finished or not.
    pub fn remove_building(&mut self, id: EntityId) {
        self.sites.remove(&id);
        self.buildings.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_spend() {
        let mut ledger = Resources::new(100, 20);

        assert!(ledger.spend(&Resources::new(60, 20)));
        assert_eq!(ledger, Resources::new(40, 0));

        assert!(!ledger.spend(&Resources::new(50, 0)));
        assert_eq!(ledger, Resources::new(40, 0));
    }

    #[test]
    fn test_resources_percent_rounds_down() {
        let cost = Resources::new(75, 25);
        assert_eq!(cost.percent(50), Resources::new(37, 12));
    }

    #[test]
    fn test_resources_percent_does_not_overflow() {
        let hoard = Resources::new(u32::MAX, 3_000_000_000);
        assert_eq!(hoard.percent(50), Resources::new(u32::MAX / 2, 1_500_000_000));
        assert_eq!(hoard.percent(200).minerals, u32::MAX);
    }

    #[test]
    fn test_resources_add_by_kind() {
        let mut ledger = Resources::ZERO;
        ledger.add(ResourceKind::Minerals, 10);
        ledger.add(ResourceKind::Gas, 4);
        assert_eq!(ledger.amount(ResourceKind::Minerals), 10);
        assert_eq!(ledger.amount(ResourceKind::Gas), 4);
    }

    #[test]
    fn test_resource_node_extraction() {
        let mut node = ResourceNode::new(
            1,
            ResourceKind::Minerals,
            25,
            Vec2Fixed::ZERO,
            Fixed::from_num(12),
        );

        assert_eq!(node.extract(GATHER_AMOUNT), 10);
        assert_eq!(node.extract(GATHER_AMOUNT), 10);
        assert!(!node.is_depleted());
        assert_eq!(node.extract(GATHER_AMOUNT), 5);
        assert!(node.is_depleted());
        assert_eq!(node.extract(GATHER_AMOUNT), 0);
    }

    #[test]
    fn test_player_elimination() {
        let mut player = Player::new(1, Race::Vanguard, Resources::ZERO);
        assert!(player.is_eliminated());
        player.units.insert(7);
        assert!(!player.is_eliminated());
    }

    #[test]
    fn test_site_owner_is_not_eliminated() {
        let mut player = Player::new(1, Race::Vanguard, Resources::ZERO);
        player.sites.insert(9);
        assert!(!player.is_eliminated());

        player.complete_site(9);
        assert!(player.sites.is_empty());
        assert!(player.buildings.contains(&9));

        player.remove_building(9);
        assert!(player.is_eliminated());
    }
}
