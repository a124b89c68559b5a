//! Structure lifecycle: construction, production queues and healing.
//!
//! A building starts as a construction site. Workers advance its progress;
//! once complete it can train units through a bounded FIFO queue. The head
//! entry accumulates elapsed ticks and is handed back to the simulation
//! when done, which spawns the unit at the rally point.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Health, PlayerId};
use crate::economy::Resources;
use crate::error::CommandError;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::races::{BuildingKind, BuildingTemplate, Race, UnitKind};
use crate::simulation::{seconds_to_ticks, TICK_RATE};

/// Percentage of an entry's cost returned on cancellation.
pub const CANCEL_REFUND_PERCENT: u32 = 50;

/// Seconds a building must go undamaged before healing resumes.
pub const HEAL_PAUSE_SECONDS: u32 = 3;

/// Gap between a footprint's lower edge and its default rally point.
pub const RALLY_OFFSET: i32 = 12;

/// An item in a production queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionItem {
    /// Unit being trained.
    pub unit_kind: UnitKind,
    /// Cost paid when queued.
    pub cost: Resources,
    /// Elapsed production ticks.
    pub progress: u32,
    /// Total build time in ticks.
    pub total_time: u32,
}

impl ProductionItem {
    /// Create a new production item.
    #[must_use]
    pub const fn new(unit_kind: UnitKind, cost: Resources, total_time: u32) -> Self {
        Self {
            unit_kind,
            cost,
            progress: 0,
            total_time,
        }
    }

    /// Check if production is complete.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.progress >= self.total_time
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total_time == 0 {
            100
        } else {
            (self.progress * 100) / self.total_time
        }
    }

    /// Advance production by one tick.
    pub fn tick(&mut self) {
        if self.progress < self.total_time {
            self.progress += 1;
        }
    }

    /// What cancelling this entry returns, regardless of progress.
    #[must_use]
    pub const fn refund(&self) -> Resources {
        self.cost.percent(CANCEL_REFUND_PERCENT)
    }
}

/// Bounded FIFO of units to train. Only the head advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionQueue {
    /// Queue of items being produced.
    pub queue: VecDeque<ProductionItem>,
    /// Maximum number of items allowed in the queue.
    pub max_queue_size: usize,
}

impl Default for ProductionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionQueue {
    /// Default maximum queue size.
    pub const DEFAULT_MAX_QUEUE_SIZE: usize = 5;

    /// Create a new empty production queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            max_queue_size: Self::DEFAULT_MAX_QUEUE_SIZE,
        }
    }

    /// Check if the queue is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.max_queue_size
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the number of items in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Add an item to the back of the queue.
    pub fn add(&mut self, item: ProductionItem) -> Result<(), CommandError> {
        if self.is_full() {
            return Err(CommandError::QueueFull);
        }
        self.queue.push_back(item);
        Ok(())
    }

    /// Remove the item at `index`.
    pub fn cancel(&mut self, index: usize) -> Option<ProductionItem> {
        self.queue.remove(index)
    }

    /// The item being produced.
    #[must_use]
    pub fn current(&self) -> Option<&ProductionItem> {
        self.queue.front()
    }

    /// Iterate in production order.
    pub fn iter(&self) -> impl Iterator<Item = &ProductionItem> {
        self.queue.iter()
    }

    /// Advance the head by one tick and pop it if finished.
    pub fn advance(&mut self) -> Option<ProductionItem> {
        let head = self.queue.front_mut()?;
        head.tick();
        if head.is_complete() {
            self.queue.pop_front()
        } else {
            None
        }
    }
}

/// A building, finished or under construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Entity id.
    pub id: EntityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Race the template came from.
    pub race: Race,
    /// Template kind.
    pub kind: BuildingKind,
    /// Footprint center.
    pub position: Vec2Fixed,
    /// Footprint diameter.
    #[serde(with = "fixed_serde")]
    pub size: Fixed,
    /// Health.
    pub health: Health,
    /// Whether the building is fully constructed.
    pub is_constructed: bool,
    /// Construction progress in ticks.
    pub construction_progress: u32,
    /// Construction time in ticks.
    pub construction_total: u32,
    /// Units waiting to be trained.
    pub queue: ProductionQueue,
    /// Where trained units appear.
    pub rally_point: Vec2Fixed,
    /// Unit kinds this building trains.
    pub produces: Vec<UnitKind>,
    /// Regenerates on its own.
    pub healing: bool,
    /// Player-toggled repair.
    pub auto_repair: bool,
    /// Health restored per second while healing.
    pub heal_per_second: u32,
    /// Ticks accumulated toward the next heal.
    pub heal_timer: u32,
    /// Tick of the most recent damage.
    pub last_damaged_tick: Option<u64>,
    /// Tick construction last advanced on.
    #[serde(default)]
    pub last_worked_tick: Option<u64>,
}

impl Building {
    /// Found a construction site.
    #[must_use]
    pub fn new_site(
        id: EntityId,
        owner: PlayerId,
        race: Race,
        kind: BuildingKind,
        template: &BuildingTemplate,
        position: Vec2Fixed,
    ) -> Self {
        Self {
            id,
            owner,
            race,
            kind,
            position,
            size: template.size,
            health: Health::new(template.health),
            is_constructed: false,
            construction_progress: 0,
            construction_total: seconds_to_ticks(template.build_seconds),
            queue: ProductionQueue::new(),
            rally_point: Self::default_rally_point(position, template.size),
            produces: template.produces.clone(),
            healing: template.healing,
            auto_repair: false,
            heal_per_second: template.heal_per_second,
            heal_timer: 0,
            last_damaged_tick: None,
            last_worked_tick: None,
        }
    }

    /// Create a fully constructed building.
    #[must_use]
    pub fn constructed(
        id: EntityId,
        owner: PlayerId,
        race: Race,
        kind: BuildingKind,
        template: &BuildingTemplate,
        position: Vec2Fixed,
    ) -> Self {
        let mut building = Self::new_site(id, owner, race, kind, template, position);
        building.is_constructed = true;
        building.construction_progress = building.construction_total;
        building
    }

    /// Directly below the footprint.
    #[must_use]
    pub fn default_rally_point(position: Vec2Fixed, size: Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            position.x,
            position.y + size / Fixed::from_num(2) + Fixed::from_num(RALLY_OFFSET),
        )
    }

    /// Footprint radius.
    #[must_use]
    pub fn radius(&self) -> Fixed {
        self.size / Fixed::from_num(2)
    }

    /// Set the rally point.
    pub fn set_rally_point(&mut self, point: Vec2Fixed) {
        self.rally_point = point;
    }

    /// Flip auto-repair, returning the new setting.
    pub fn toggle_auto_repair(&mut self) -> bool {
        self.auto_repair = !self.auto_repair;
        self.auto_repair
    }

    /// Get construction progress as a percentage (0-100).
    #[must_use]
    pub fn construction_percentage(&self) -> u32 {
        if self.is_constructed || self.construction_total == 0 {
            100
        } else {
            (self.construction_progress * 100) / self.construction_total
        }
    }

    /// Advance construction by `ticks`.
    ///
    /// Returns `true` if construction just completed.
    pub fn advance_construction(&mut self, ticks: u32) -> bool {
        if self.is_constructed {
            return false;
        }
        self.construction_progress = self
            .construction_progress
            .saturating_add(ticks)
            .min(self.construction_total);
        if self.construction_progress >= self.construction_total {
            self.is_constructed = true;
            return true;
        }
        false
    }

    /// Advance construction by one tick of work on `tick`. Progress follows
    /// elapsed time, so extra workers on the same tick add nothing.
    ///
    /// Returns `true` if construction just completed.
    pub fn work_on(&mut self, tick: u64) -> bool {
        if self.last_worked_tick == Some(tick) {
            return false;
        }
        self.last_worked_tick = Some(tick);
        self.advance_construction(1)
    }

    /// Check that `kind` could be queued here right now.
    pub fn check_production(&self, kind: UnitKind) -> Result<(), CommandError> {
        if !self.is_constructed {
            return Err(CommandError::NotConstructed(self.id));
        }
        if !self.can_produce(kind) {
            return Err(CommandError::CannotProduce(self.id));
        }
        if self.queue.is_full() {
            return Err(CommandError::QueueFull);
        }
        Ok(())
    }

    /// Remove entry `index`, returning the refund owed to the owner.
    pub fn cancel_production(&mut self, index: usize) -> Result<Resources, CommandError> {
        self.queue
            .cancel(index)
            .map(|item| item.refund())
            .ok_or(CommandError::NoSuchEntry(index))
    }

    /// Whether healing applies on `tick`.
    #[must_use]
    pub fn is_healing(&self, tick: u64) -> bool {
        let enabled = self.healing || self.auto_repair;
        let calm = self.last_damaged_tick.map_or(true, |damaged| {
            tick.saturating_sub(damaged) >= u64::from(seconds_to_ticks(HEAL_PAUSE_SECONDS))
        });
        enabled && self.is_constructed && !self.health.is_full() && calm
    }

    /// Per-tick update: heal, then advance production.
    ///
    /// Returns the finished production item, if any.
    pub fn update(&mut self, tick: u64) -> Option<ProductionItem> {
        if self.is_healing(tick) {
            self.heal_timer += 1;
            if self.heal_timer >= TICK_RATE {
                self.heal_timer = 0;
                self.health.heal(self.heal_per_second);
            }
        } else {
            self.heal_timer = 0;
        }

        if !self.is_constructed {
            return None;
        }
        self.queue.advance()
    }
}

/// Something that trains units.
pub trait Producer {
    /// Whether this unit kind is on the production list.
    fn can_produce(&self, kind: UnitKind) -> bool;
    /// The production queue.
    fn production_queue(&self) -> &ProductionQueue;
}

impl Producer for Building {
    fn can_produce(&self, kind: UnitKind) -> bool {
        self.produces.contains(&kind)
    }

    fn production_queue(&self) -> &ProductionQueue {
        &self.queue
    }
}
