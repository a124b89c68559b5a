//! Races and their template tables.
//!
//! Each race resolves once into a [`RaceProfile`] holding its unit and
//! building templates. Behavior code looks templates up by kind; it never
//! branches on a race name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::math::{fixed_decimal_serde, Fixed};

/// Playable races.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Race {
    /// Balanced, repairable structures.
    #[default]
    Vanguard,
    /// Cheap and numerous; structures regenerate on their own.
    Swarm,
    /// Expensive, durable units.
    Ascendant,
}

impl Race {
    /// All races.
    pub const ALL: [Self; 3] = [Self::Vanguard, Self::Swarm, Self::Ascendant];

    /// Stable name used in snapshots.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Vanguard => "vanguard",
            Self::Swarm => "swarm",
            Self::Ascendant => "ascendant",
        }
    }

    /// Parse a snapshot name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|race| race.name() == name)
    }
}

/// Unit kinds shared by every race.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum UnitKind {
    /// Gathers resources and constructs buildings.
    Worker,
    /// Melee line unit.
    #[default]
    Infantry,
    /// Fires projectiles from range.
    Ranged,
}

impl UnitKind {
    /// All unit kinds.
    pub const ALL: [Self; 3] = [Self::Worker, Self::Infantry, Self::Ranged];

    /// Stable name used in snapshots.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Infantry => "infantry",
            Self::Ranged => "ranged",
        }
    }

    /// Parse a snapshot name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Building kinds shared by every race.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum BuildingKind {
    /// Town center; trains workers.
    #[default]
    Base,
    /// Trains combat units.
    Barracks,
}

impl BuildingKind {
    /// All building kinds.
    pub const ALL: [Self; 2] = [Self::Base, Self::Barracks];

    /// Stable name used in snapshots.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Barracks => "barracks",
        }
    }

    /// Parse a snapshot name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Weapon stats of a unit template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackTemplate {
    /// Attack range in world units.
    #[serde(with = "fixed_decimal_serde")]
    pub range: Fixed,
    /// Damage per hit.
    pub damage: u32,
    /// Attacks per second.
    #[serde(with = "fixed_decimal_serde")]
    pub attack_speed: Fixed,
}

/// Static description of a unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Production cost.
    pub cost: Resources,
    /// Production time in seconds.
    pub build_seconds: u32,
    /// Maximum health.
    pub health: u32,
    /// Movement speed in world units per second.
    #[serde(with = "fixed_decimal_serde")]
    pub speed: Fixed,
    /// Collision radius.
    #[serde(with = "fixed_decimal_serde")]
    pub radius: Fixed,
    /// Weapon, if the unit can fight.
    pub attack: Option<AttackTemplate>,
    /// Can gather resources.
    pub gathers: bool,
    /// Can construct buildings.
    pub builds: bool,
}

/// Static description of a building type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingTemplate {
    /// Construction cost.
    pub cost: Resources,
    /// Construction time in seconds.
    pub build_seconds: u32,
    /// Maximum health.
    pub health: u32,
    /// Footprint size (diameter).
    #[serde(with = "fixed_decimal_serde")]
    pub size: Fixed,
    /// Unit kinds this building trains.
    pub produces: Vec<UnitKind>,
    /// Regenerates without an auto-repair toggle.
    pub healing: bool,
    /// Health restored per second while healing.
    pub heal_per_second: u32,
}

impl BuildingTemplate {
    /// Footprint radius.
    #[must_use]
    pub fn radius(&self) -> Fixed {
        self.size / Fixed::from_num(2)
    }
}

/// All templates of one race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceProfile {
    /// Unit templates by kind.
    pub units: BTreeMap<UnitKind, UnitTemplate>,
    /// Building templates by kind.
    pub buildings: BTreeMap<BuildingKind, BuildingTemplate>,
}

impl RaceProfile {
    /// Unit template lookup.
    #[must_use]
    pub fn unit(&self, kind: UnitKind) -> Option<&UnitTemplate> {
        self.units.get(&kind)
    }

    /// Building template lookup.
    #[must_use]
    pub fn building(&self, kind: BuildingKind) -> Option<&BuildingTemplate> {
        self.buildings.get(&kind)
    }
}

/// Template tables for every race.
///
/// The game ships [`Catalog::standard`]; designers can override it with a
/// RON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Profiles by race.
    pub races: BTreeMap<Race, RaceProfile>,
}

impl Catalog {
    /// The built-in tables.
    #[must_use]
    pub fn standard() -> Self {
        let races = [
            (Race::Vanguard, vanguard()),
            (Race::Swarm, swarm()),
            (Race::Ascendant, ascendant()),
        ]
        .into_iter()
        .collect();
        Self { races }
    }

    /// Parse a catalog from RON.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e| GameError::DataParseError(e.to_string()))
    }

    /// Profile lookup.
    #[must_use]
    pub fn profile(&self, race: Race) -> Option<&RaceProfile> {
        self.races.get(&race)
    }

    /// Unit template lookup.
    pub fn unit(&self, race: Race, kind: UnitKind) -> Result<&UnitTemplate> {
        self.profile(race)
            .and_then(|profile| profile.unit(kind))
            .ok_or_else(|| GameError::MissingTemplate {
                race: race.name().to_string(),
                kind: kind.name().to_string(),
            })
    }

    /// Building template lookup.
    pub fn building(&self, race: Race, kind: BuildingKind) -> Result<&BuildingTemplate> {
        self.profile(race)
            .and_then(|profile| profile.building(kind))
            .ok_or_else(|| GameError::MissingTemplate {
                race: race.name().to_string(),
                kind: kind.name().to_string(),
            })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn fx(value: i32) -> Fixed {
    Fixed::from_num(value)
}

fn worker(cost: u32, health: u32, speed: i32) -> UnitTemplate {
    UnitTemplate {
        cost: Resources::new(cost, 0),
        build_seconds: 12,
        health,
        speed: fx(speed),
        radius: fx(8),
        attack: Some(AttackTemplate {
            range: fx(10),
            damage: 5,
            attack_speed: Fixed::ONE,
        }),
        gathers: true,
        builds: true,
    }
}

fn infantry(cost: u32, health: u32, damage: u32, build_seconds: u32) -> UnitTemplate {
    UnitTemplate {
        cost: Resources::new(cost, 0),
        build_seconds,
        health,
        speed: fx(55),
        radius: fx(10),
        attack: Some(AttackTemplate {
            range: fx(16),
            damage,
            attack_speed: Fixed::from_num(1.25),
        }),
        gathers: false,
        builds: false,
    }
}

fn ranged(cost: Resources, health: u32, damage: u32, range: i32) -> UnitTemplate {
    UnitTemplate {
        cost,
        build_seconds: 18,
        health,
        speed: fx(50),
        radius: fx(10),
        attack: Some(AttackTemplate {
            range: fx(range),
            damage,
            attack_speed: Fixed::from_num(0.8),
        }),
        gathers: false,
        builds: false,
    }
}

fn structures(
    base_health: u32,
    barracks_health: u32,
    healing: bool,
    heal_per_second: u32,
) -> BTreeMap<BuildingKind, BuildingTemplate> {
    [
        (
            BuildingKind::Base,
            BuildingTemplate {
                cost: Resources::new(400, 0),
                build_seconds: 60,
                health: base_health,
                size: fx(80),
                produces: vec![UnitKind::Worker],
                healing,
                heal_per_second,
            },
        ),
        (
            BuildingKind::Barracks,
            BuildingTemplate {
                cost: Resources::new(150, 0),
                build_seconds: 40,
                health: barracks_health,
                size: fx(64),
                produces: vec![UnitKind::Infantry, UnitKind::Ranged],
                healing,
                heal_per_second,
            },
        ),
    ]
    .into_iter()
    .collect()
}

fn vanguard() -> RaceProfile {
    RaceProfile {
        units: [
            (UnitKind::Worker, worker(50, 40, 60)),
            (UnitKind::Infantry, infantry(50, 60, 8, 15)),
            (
                UnitKind::Ranged,
                ranged(Resources::new(75, 25), 45, 10, 120),
            ),
        ]
        .into_iter()
        .collect(),
        buildings: structures(1500, 1000, false, 8),
    }
}

fn swarm() -> RaceProfile {
    RaceProfile {
        units: [
            (UnitKind::Worker, worker(50, 35, 65)),
            (UnitKind::Infantry, infantry(35, 40, 6, 10)),
            (UnitKind::Ranged, ranged(Resources::new(60, 20), 40, 9, 100)),
        ]
        .into_iter()
        .collect(),
        buildings: structures(1300, 850, true, 5),
    }
}

fn ascendant() -> RaceProfile {
    RaceProfile {
        units: [
            (UnitKind::Worker, worker(50, 45, 55)),
            (UnitKind::Infantry, infantry(80, 100, 12, 20)),
            (
                UnitKind::Ranged,
                ranged(Resources::new(100, 50), 70, 14, 140),
            ),
        ]
        .into_iter()
        .collect(),
        buildings: structures(1700, 1100, false, 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for race in Race::ALL {
            assert_eq!(Race::from_name(race.name()), Some(race));
        }
        for kind in UnitKind::ALL {
            assert_eq!(UnitKind::from_name(kind.name()), Some(kind));
        }
        for kind in BuildingKind::ALL {
            assert_eq!(BuildingKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(Race::from_name("martian"), None);
    }

    #[test]
    fn test_standard_catalog_is_complete() {
        let catalog = Catalog::standard();
        for race in Race::ALL {
            for kind in UnitKind::ALL {
                assert!(catalog.unit(race, kind).is_ok(), "{race:?} {kind:?}");
            }
            for kind in BuildingKind::ALL {
                assert!(catalog.building(race, kind).is_ok(), "{race:?} {kind:?}");
            }
        }
    }

    #[test]
    fn test_only_swarm_structures_heal_innately() {
        let catalog = Catalog::standard();
        let base = |race| catalog.building(race, BuildingKind::Base).unwrap().healing;
        assert!(base(Race::Swarm));
        assert!(!base(Race::Vanguard));
        assert!(!base(Race::Ascendant));
    }

    #[test]
    fn test_catalog_ron_round_trip() {
        let catalog = Catalog::standard();
        let text = ron::to_string(&catalog).unwrap();
        let parsed = Catalog::from_ron_str(&text).unwrap();
        assert_eq!(parsed, catalog);
    }

    #[test]
    fn test_missing_template_error() {
        let catalog = Catalog {
            races: BTreeMap::new(),
        };
        let err = catalog.unit(Race::Swarm, UnitKind::Worker).unwrap_err();
        assert!(err.to_string().contains("swarm"));
    }
}
