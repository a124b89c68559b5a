//! Entity data definitions.
//!
//! Components are pure data. Behavior lives in [`crate::units`],
//! [`crate::buildings`] and [`crate::simulation`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::races::{AttackTemplate, BuildingKind, Race, UnitKind, UnitTemplate};
use crate::simulation::{seconds_to_ticks, TICK_RATE};

/// Unique identifier for entities. Units, buildings, projectiles and
/// resource nodes share one id space.
pub type EntityId = u64;

/// Player identifier.
pub type PlayerId = u8;

/// Attacks with a longer range than this fire projectiles.
pub const MELEE_RANGE: i32 = 20;

/// Ticks a projectile may fly before it fizzles.
pub const PROJECTILE_LIFETIME: u32 = 60;

/// Ticks a projectile lingers after striking.
pub const STRUCK_LIFETIME: u32 = 2;

/// Projectile travel speed in world units per tick.
pub const PROJECTILE_SPEED: i32 = 12;

/// Collision class of an indexed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityClass {
    /// Mobile unit.
    Unit,
    /// Stationary structure.
    Building,
    /// Resource node.
    Resource,
}

/// What a unit is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Another unit.
    Unit(EntityId),
    /// A building.
    Building(EntityId),
    /// A location on the map.
    Point(Vec2Fixed),
}

impl Target {
    /// The referenced entity, if this target is not a point.
    #[must_use]
    pub const fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::Unit(id) | Self::Building(id) => Some(*id),
            Self::Point(_) => None,
        }
    }
}

/// Behavioral state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitState {
    /// Waiting for orders.
    #[default]
    Idle,
    /// Traveling toward a point or target.
    Moving,
    /// Engaging a target in range.
    Attacking,
    /// Extracting from a resource node.
    Gathering,
    /// Constructing a building.
    Building,
    /// Walking between two waypoints.
    Patrolling,
}

impl UnitState {
    /// All states.
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::Moving,
        Self::Attacking,
        Self::Gathering,
        Self::Building,
        Self::Patrolling,
    ];

    /// Stable name used in snapshots.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Moving => "moving",
            Self::Attacking => "attacking",
            Self::Gathering => "gathering",
            Self::Building => "building",
            Self::Patrolling => "patrolling",
        }
    }

    /// Parse a snapshot name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.name() == name)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    ///
    /// Resets issued by a new command are not transitions and bypass this
    /// table.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use UnitState::{Attacking, Building, Gathering, Idle, Moving, Patrolling};

        matches!(
            (self, next),
            (Idle, Moving)
                | (Idle, Patrolling)
                | (Moving, Gathering)
                | (Moving, Attacking)
                | (Moving, Building)
                | (Moving, Idle)
                | (Attacking, Idle)
                | (Attacking, Moving)
                | (Gathering, Idle)
                | (Building, Idle)
        )
    }
}

/// A command that can be issued to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitCommand {
    /// Move to a position.
    Move(Vec2Fixed),
    /// Drop every goal and queued command.
    Stop,
    /// Attack a unit or building.
    Attack(Target),
    /// Gather from a resource node.
    Gather(EntityId),
    /// Walk between two waypoints until told otherwise.
    Patrol(Vec2Fixed, Vec2Fixed),
    /// Found (or join) a construction site.
    Build {
        /// Building to construct.
        kind: BuildingKind,
        /// Site center.
        position: Vec2Fixed,
    },
}

/// Queue of commands for a unit to execute.
///
/// Commands are executed in order. A unit takes the next command only
/// when it is idle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    /// The queue of pending commands.
    pub commands: VecDeque<UnitCommand>,
}

impl CommandQueue {
    /// Create an empty command queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
        }
    }

    /// Add a command to the back of the queue.
    pub fn push(&mut self, command: UnitCommand) {
        self.commands.push_back(command);
    }

    /// Remove and return the next command.
    pub fn pop(&mut self) -> Option<UnitCommand> {
        self.commands.pop_front()
    }

    /// Clear all commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Iterate in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &UnitCommand> {
        self.commands.iter()
    }
}

/// Health component for damageable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Create a health component at a given level, clamped to `max`.
    #[must_use]
    pub fn with_current(current: u32, max: u32) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Check if entity is at full health.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }

    /// Heal the entity, returning actual amount healed.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let headroom = self.max.saturating_sub(self.current);
        let actual = amount.min(headroom);
        self.current += actual;
        actual
    }

    /// Get health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.max == 0 {
            0
        } else {
            (self.current * 100) / self.max
        }
    }
}

/// Weapon state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProfile {
    /// Attack range in world units, measured to the target's edge.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Damage per hit.
    pub damage: u32,
    /// Ticks between attacks.
    pub cooldown_ticks: u32,
    /// Ticks until the next attack.
    pub cooldown_remaining: u32,
}

impl AttackProfile {
    /// Build from a template. The cooldown is `1 / attack_speed` seconds,
    /// rounded to whole ticks.
    #[must_use]
    pub fn from_template(template: &AttackTemplate) -> Self {
        let cooldown_ticks = if template.attack_speed > Fixed::ZERO {
            (Fixed::from_num(TICK_RATE) / template.attack_speed)
                .round()
                .to_num::<u32>()
                .max(1)
        } else {
            u32::MAX
        };
        Self {
            range: template.range,
            damage: template.damage,
            cooldown_ticks,
            cooldown_remaining: 0,
        }
    }

    /// Melee weapons hit instantly; everything else fires projectiles.
    #[must_use]
    pub fn is_melee(&self) -> bool {
        self.range <= Fixed::from_num(MELEE_RANGE)
    }

    /// Check if ready to attack.
    #[must_use]
    pub const fn can_attack(&self) -> bool {
        self.cooldown_remaining == 0
    }

    /// Reset cooldown after attacking.
    pub fn reset_cooldown(&mut self) {
        self.cooldown_remaining = self.cooldown_ticks;
    }

    /// Tick down the cooldown by one.
    pub fn tick_cooldown(&mut self) {
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
    }
}

/// A pending construction order carried by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    /// What to build.
    pub kind: BuildingKind,
    /// Where to build it.
    pub position: Vec2Fixed,
    /// The site once founded or joined.
    pub site: Option<EntityId>,
}

/// Two waypoints walked alternately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolRoute {
    /// Waypoints A and B.
    pub waypoints: [Vec2Fixed; 2],
    /// Index of the waypoint currently headed for.
    pub heading: usize,
}

impl PatrolRoute {
    /// Start a route heading for `a`.
    #[must_use]
    pub const fn new(a: Vec2Fixed, b: Vec2Fixed) -> Self {
        Self {
            waypoints: [a, b],
            heading: 0,
        }
    }

    /// Waypoint currently headed for.
    #[must_use]
    pub const fn current(&self) -> Vec2Fixed {
        self.waypoints[self.heading % 2]
    }

    /// Swap to the other waypoint.
    pub fn advance(&mut self) {
        self.heading = (self.heading + 1) % 2;
    }
}

/// A mobile unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Entity id.
    pub id: EntityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Race the template came from.
    pub race: Race,
    /// Template kind.
    pub kind: UnitKind,
    /// World position.
    pub position: Vec2Fixed,
    /// Velocity in world units per tick.
    pub velocity: Vec2Fixed,
    /// Collision radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Health.
    pub health: Health,
    /// Base movement speed in world units per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Weapon, if any.
    pub attack: Option<AttackProfile>,
    /// Can gather resources.
    pub gathers: bool,
    /// Can construct buildings.
    pub builds: bool,
    /// Current behavioral state.
    pub state: UnitState,
    /// Attack target or move destination.
    pub target: Option<Target>,
    /// Resource node being gathered.
    pub gather_target: Option<EntityId>,
    /// Construction order in progress.
    pub build_order: Option<BuildOrder>,
    /// Patrol route, while patrolling.
    pub patrol: Option<PatrolRoute>,
    /// Ticks until the next extraction.
    pub gather_timer: u32,
    /// Pending commands.
    pub commands: CommandQueue,
}

impl Unit {
    /// Instantiate a unit from its template.
    #[must_use]
    pub fn from_template(
        id: EntityId,
        owner: PlayerId,
        race: Race,
        kind: UnitKind,
        template: &UnitTemplate,
        position: Vec2Fixed,
    ) -> Self {
        Self {
            id,
            owner,
            race,
            kind,
            position,
            velocity: Vec2Fixed::ZERO,
            radius: template.radius,
            health: Health::new(template.health),
            speed: template.speed / Fixed::from_num(TICK_RATE),
            attack: template.attack.as_ref().map(AttackProfile::from_template),
            gathers: template.gathers,
            builds: template.builds,
            state: UnitState::Idle,
            target: None,
            gather_target: None,
            build_order: None,
            patrol: None,
            gather_timer: 0,
            commands: CommandQueue::new(),
        }
    }

    /// Drop the current goal and return to idle. Queued commands are kept.
    pub fn reset(&mut self) {
        self.state = UnitState::Idle;
        self.target = None;
        self.gather_target = None;
        self.build_order = None;
        self.patrol = None;
        self.gather_timer = 0;
        self.velocity = Vec2Fixed::ZERO;
    }

    /// Ticks between gather extractions.
    #[must_use]
    pub const fn gather_interval() -> u32 {
        seconds_to_ticks(1)
    }
}

/// Something that moves under its own power.
pub trait Movable {
    /// Current position.
    fn position(&self) -> Vec2Fixed;
    /// Collision radius.
    fn radius(&self) -> Fixed;
    /// Base speed in world units per tick.
    fn speed(&self) -> Fixed;
}

/// Something that can deal damage.
pub trait Attacker {
    /// Weapon state, if armed.
    fn attack_profile(&self) -> Option<&AttackProfile>;

    /// Whether this entity can attack at all.
    fn is_armed(&self) -> bool {
        self.attack_profile().is_some()
    }
}

/// Something that gathers and constructs.
pub trait Worker {
    /// Can gather from resource nodes.
    fn can_gather(&self) -> bool;
    /// Can found and construct buildings.
    fn can_build(&self) -> bool;
}

impl Movable for Unit {
    fn position(&self) -> Vec2Fixed {
        self.position
    }

    fn radius(&self) -> Fixed {
        self.radius
    }

    fn speed(&self) -> Fixed {
        self.speed
    }
}

impl Attacker for Unit {
    fn attack_profile(&self) -> Option<&AttackProfile> {
        self.attack.as_ref()
    }
}

impl Worker for Unit {
    fn can_gather(&self) -> bool {
        self.gathers
    }

    fn can_build(&self) -> bool {
        self.builds
    }
}

/// A homing projectile.
///
/// Follows its target's live position. If the target disappears the
/// projectile flies on to the last known position and strikes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity id.
    pub id: EntityId,
    /// Owner of the unit that fired.
    pub owner: PlayerId,
    /// Unit that fired.
    pub source: EntityId,
    /// Where it was fired from.
    pub origin: Vec2Fixed,
    /// Current position.
    pub position: Vec2Fixed,
    /// Homing target.
    pub target: Option<Target>,
    /// Last observed target position.
    pub last_known: Vec2Fixed,
    /// Damage on impact.
    pub damage: u32,
    /// Travel speed per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Ticks until removal.
    pub lifetime: u32,
    /// Whether it has hit (or missed) already.
    pub struck: bool,
}

impl Projectile {
    /// Fire a projectile from `origin` at `target`.
    #[must_use]
    pub fn new(
        id: EntityId,
        owner: PlayerId,
        source: EntityId,
        origin: Vec2Fixed,
        target: Target,
        target_position: Vec2Fixed,
        damage: u32,
    ) -> Self {
        Self {
            id,
            owner,
            source,
            origin,
            position: origin,
            target: Some(target),
            last_known: target_position,
            damage,
            speed: Fixed::from_num(PROJECTILE_SPEED),
            lifetime: PROJECTILE_LIFETIME,
            struck: false,
        }
    }

    /// Mark as struck and collapse the remaining lifetime.
    pub fn strike(&mut self) {
        self.struck = true;
        self.target = None;
        self.lifetime = self.lifetime.min(STRUCK_LIFETIME);
    }

    /// Whether the projectile should be removed.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.lifetime == 0
    }
}
