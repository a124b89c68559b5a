//! Uniform grid spatial index.
//!
//! The index answers proximity queries, resolves unit overlaps and searches
//! for free building sites. Entries are cached at rebuild time, so results
//! may lag the live world by one rebuild interval; callers re-resolve ids
//! against the world before acting on them.

use std::collections::HashMap;

use tracing::warn;

use crate::components::{EntityClass, EntityId, PlayerId, Unit};
use crate::math::{fixed_sqrt, Fixed, Vec2Fixed};
use crate::world::EntityStorage;

/// Candidates tried by [`SpatialIndex::find_valid_placement`] by default.
pub const DEFAULT_PLACEMENT_ATTEMPTS: u32 = 20;

/// Units may overlap by this fraction of their combined radii before the
/// pair counts as overlapping.
const OVERLAP_ALLOWANCE_PERCENT: i32 = 20;

/// A candidate site is rejected when more than this percentage of nearby
/// units overlap it.
const MAX_OVERLAPPING_PERCENT: usize = 20;

/// Cached view of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Entity id.
    pub id: EntityId,
    /// Collision class.
    pub class: EntityClass,
    /// Owning player; resource nodes have none.
    pub owner: Option<PlayerId>,
    /// Position at rebuild time.
    pub position: Vec2Fixed,
    /// Collision radius.
    pub radius: Fixed,
}

/// Which collision classes a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassFilter {
    units: bool,
    buildings: bool,
    resources: bool,
}

impl ClassFilter {
    /// Units only.
    pub const UNITS: Self = Self {
        units: true,
        buildings: false,
        resources: false,
    };
    /// Buildings only.
    pub const BUILDINGS: Self = Self {
        units: false,
        buildings: true,
        resources: false,
    };
    /// Resource nodes only.
    pub const RESOURCES: Self = Self {
        units: false,
        buildings: false,
        resources: true,
    };
    /// Units and buildings.
    pub const ATTACKABLE: Self = Self {
        units: true,
        buildings: true,
        resources: false,
    };
    /// Everything.
    pub const ALL: Self = Self {
        units: true,
        buildings: true,
        resources: true,
    };

    /// Whether `class` passes the filter.
    #[must_use]
    pub const fn allows(&self, class: EntityClass) -> bool {
        match class {
            EntityClass::Unit => self.units,
            EntityClass::Building => self.buildings,
            EntityClass::Resource => self.resources,
        }
    }
}

/// One query hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proximity {
    /// Entity id.
    pub id: EntityId,
    /// Collision class.
    pub class: EntityClass,
    /// Owning player.
    pub owner: Option<PlayerId>,
    /// Cached radius.
    pub radius: Fixed,
    /// Center distance from the query point.
    pub distance: Fixed,
    /// Unit vector from the query point to the entity (zero if coincident).
    pub direction: Vec2Fixed,
}

/// How a placement search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// A valid site was found.
    Found,
    /// Every candidate failed; the position is the original target.
    Exhausted,
}

/// Result of a placement search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Chosen site (or the original target when exhausted).
    pub position: Vec2Fixed,
    /// Candidates evaluated.
    pub attempts: u32,
    /// Whether the search succeeded.
    pub outcome: PlacementOutcome,
}

impl Placement {
    /// Whether a valid site was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.outcome == PlacementOutcome::Found
    }
}

/// Sparse uniform grid over the world bounds.
///
/// Each entry lives in the cell containing its center. Queries widen their
/// cell window by the largest cached radius so edge overlaps are never
/// missed.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: Fixed,
    world_size: Fixed,
    cells: HashMap<(i32, i32), Vec<IndexEntry>>,
    max_radius: Fixed,
    len: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(Fixed::from_num(2048), Fixed::from_num(64))
    }
}

impl SpatialIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new(world_size: Fixed, cell_size: Fixed) -> Self {
        Self {
            cell_size: cell_size.max(Fixed::ONE),
            world_size,
            cells: HashMap::new(),
            max_radius: Fixed::ZERO,
            len: 0,
        }
    }

    /// Edge length of the indexed world.
    #[must_use]
    pub const fn world_size(&self) -> Fixed {
        self.world_size
    }

    /// Number of cached entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the index is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn max_cell(&self) -> i32 {
        (self.world_size / self.cell_size).floor().to_num::<i32>()
    }

    fn cell_coord(&self, position: Vec2Fixed) -> (i32, i32) {
        let max = self.max_cell();
        let axis = |v: Fixed| (v / self.cell_size).floor().to_num::<i32>().clamp(0, max);
        (axis(position.x), axis(position.y))
    }

    /// Clear and refill from `entries`.
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = IndexEntry>) {
        self.cells.clear();
        self.max_radius = Fixed::ZERO;
        self.len = 0;
        for entry in entries {
            self.insert(entry);
        }
    }

    /// Add one entry without a full rebuild.
    pub fn insert(&mut self, entry: IndexEntry) {
        let coord = self.cell_coord(entry.position);
        self.max_radius = self.max_radius.max(entry.radius);
        self.cells.entry(coord).or_default().push(entry);
        self.len += 1;
    }

    /// Drop a cached entry.
    pub fn remove(&mut self, id: EntityId) {
        for cell in self.cells.values_mut() {
            let before = cell.len();
            cell.retain(|entry| entry.id != id);
            self.len -= before - cell.len();
        }
    }

    fn entries_near(&self, point: Vec2Fixed, reach: Fixed) -> impl Iterator<Item = &IndexEntry> {
        let lo = self.cell_coord(point - Vec2Fixed::new(reach, reach));
        let hi = self.cell_coord(point + Vec2Fixed::new(reach, reach));
        (lo.0..=hi.0).flat_map(move |cx| {
            (lo.1..=hi.1).flat_map(move |cy| self.cells.get(&(cx, cy)).into_iter().flatten())
        })
    }

    /// Entries whose center lies within `radius` of `point`, sorted by
    /// distance and then id.
    pub fn query_radius<P>(
        &self,
        point: Vec2Fixed,
        radius: Fixed,
        filter: ClassFilter,
        predicate: P,
    ) -> Vec<Proximity>
    where
        P: Fn(&IndexEntry) -> bool,
    {
        if radius < Fixed::ZERO {
            return Vec::new();
        }
        let radius_sq = radius.saturating_mul(radius);
        let mut hits: Vec<Proximity> = self
            .entries_near(point, radius)
            .filter(|entry| filter.allows(entry.class))
            .filter(|entry| entry.position.distance_squared(point) <= radius_sq)
            .filter(|entry| predicate(entry))
            .map(|entry| {
                let offset = entry.position - point;
                Proximity {
                    id: entry.id,
                    class: entry.class,
                    owner: entry.owner,
                    radius: entry.radius,
                    distance: offset.length(),
                    direction: offset.normalize(),
                }
            })
            .collect();
        hits.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits
    }

    fn in_bounds(&self, position: Vec2Fixed, radius: Fixed) -> bool {
        position.x >= radius
            && position.y >= radius
            && position.x <= self.world_size - radius
            && position.y <= self.world_size - radius
    }

    /// Check a site without searching for alternatives.
    ///
    /// A site is invalid when out of bounds, when it overlaps any building
    /// or resource node at all, or when more than a fifth of the units
    /// within `3 × radius` overlap it past the allowance.
    #[must_use]
    pub fn is_valid_position(
        &self,
        position: Vec2Fixed,
        radius: Fixed,
        exclude_unit: Option<EntityId>,
    ) -> bool {
        if !self.in_bounds(position, radius) {
            return false;
        }

        let blocked = self
            .entries_near(position, radius + self.max_radius)
            .filter(|entry| entry.class != EntityClass::Unit)
            .any(|entry| entry.position.distance(position) < radius + entry.radius);
        if blocked {
            return false;
        }

        let neighborhood = radius * Fixed::from_num(3);
        let allowance = Fixed::from_num(100 - OVERLAP_ALLOWANCE_PERCENT) / Fixed::from_num(100);
        let nearby = self.query_radius(position, neighborhood, ClassFilter::UNITS, |entry| {
            Some(entry.id) != exclude_unit
        });
        let overlapping = nearby
            .iter()
            .filter(|hit| hit.distance < (radius + hit.radius) * allowance)
            .count();

        overlapping * 100 <= nearby.len() * MAX_OVERLAPPING_PERCENT
    }

    /// Search outward from `target` along a golden-angle spiral.
    ///
    /// Candidate 0 is the target itself; candidate `n` sits
    /// `radius × 2 × sqrt(n + 1)` away, each rotated one golden-angle step
    /// from the last. When every candidate fails the original target comes
    /// back with [`PlacementOutcome::Exhausted`].
    #[must_use]
    pub fn find_valid_placement(
        &self,
        target: Vec2Fixed,
        radius: Fixed,
        max_attempts: u32,
    ) -> Placement {
        self.find_valid_placement_excluding(target, radius, max_attempts, None)
    }

    /// [`find_valid_placement`](Self::find_valid_placement) ignoring one
    /// unit, typically the worker standing on the site.
    #[must_use]
    pub fn find_valid_placement_excluding(
        &self,
        target: Vec2Fixed,
        radius: Fixed,
        max_attempts: u32,
        exclude_unit: Option<EntityId>,
    ) -> Placement {
        let mut direction = Vec2Fixed::UNIT_X;
        for attempt in 0..max_attempts {
            let candidate = if attempt == 0 {
                target
            } else {
                direction = direction.rotate_golden();
                let step = radius * Fixed::from_num(2) * fixed_sqrt(Fixed::from_num(attempt + 1));
                target + direction.scale(step)
            };
            if self.is_valid_position(candidate, radius, exclude_unit) {
                return Placement {
                    position: candidate,
                    attempts: attempt + 1,
                    outcome: PlacementOutcome::Found,
                };
            }
        }

        warn!(
            x = target.x.to_num::<f64>(),
            y = target.y.to_num::<f64>(),
            radius = radius.to_num::<f64>(),
            attempts = max_attempts,
            "No valid placement found, falling back to target"
        );
        Placement {
            position: target,
            attempts: max_attempts,
            outcome: PlacementOutcome::Exhausted,
        }
    }

    /// Push apart units that overlap past the allowance while closing in.
    ///
    /// Works on live positions. Each overlapping pair whose relative
    /// velocity points inward gets a symmetric correction: both units move
    /// half the overlap apart and lose the closing part of their velocity.
    pub fn resolve_overlaps(&self, units: &mut EntityStorage<Unit>) {
        let ids = units.sorted_ids();
        let mut live: HashMap<(i32, i32), Vec<EntityId>> = HashMap::new();
        let mut max_radius = Fixed::ZERO;
        for &id in &ids {
            if let Some(unit) = units.get(id) {
                live.entry(self.cell_coord(unit.position))
                    .or_default()
                    .push(id);
                max_radius = max_radius.max(unit.radius);
            }
        }

        let allowance = Fixed::from_num(100 - OVERLAP_ALLOWANCE_PERCENT) / Fixed::from_num(100);
        let reach = (max_radius * Fixed::from_num(2) / self.cell_size)
            .ceil()
            .to_num::<i32>()
            .max(1);

        for &a_id in &ids {
            let Some(a) = units.get(a_id) else { continue };
            let (cx, cy) = self.cell_coord(a.position);
            let mut neighbors: Vec<EntityId> = (-reach..=reach)
                .flat_map(|dx| (-reach..=reach).map(move |dy| (cx + dx, cy + dy)))
                .filter_map(|coord| live.get(&coord))
                .flatten()
                .copied()
                .filter(|&b_id| b_id > a_id)
                .collect();
            neighbors.sort_unstable();

            for b_id in neighbors {
                let (Some(a), Some(b)) = (units.get(a_id), units.get(b_id)) else {
                    continue;
                };
                let limit = (a.radius + b.radius) * allowance;
                let offset = b.position - a.position;
                let distance = offset.length();
                if distance >= limit {
                    continue;
                }
                let normal = if distance == Fixed::ZERO {
                    Vec2Fixed::UNIT_X
                } else {
                    offset.normalize()
                };
                let closing = (b.velocity - a.velocity).dot(normal);
                if closing >= Fixed::ZERO {
                    continue;
                }

                let half_push = normal.scale((limit - distance) / Fixed::from_num(2));
                let half_stop = normal.scale(closing / Fixed::from_num(2));
                let world = self.world_size;
                if let Some(a) = units.get_mut(a_id) {
                    a.position = clamp_circle(a.position - half_push, a.radius, world);
                    a.velocity += half_stop;
                }
                if let Some(b) = units.get_mut(b_id) {
                    b.position = clamp_circle(b.position + half_push, b.radius, world);
                    b.velocity -= half_stop;
                }
            }
        }
    }
}

fn clamp_circle(position: Vec2Fixed, radius: Fixed, world_size: Fixed) -> Vec2Fixed {
    position.clamp(radius, (world_size - radius).max(radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::races::{Catalog, Race, UnitKind};

    fn index() -> SpatialIndex {
        SpatialIndex::new(Fixed::from_num(1000), Fixed::from_num(64))
    }

    fn entry(id: EntityId, class: EntityClass, x: i32, y: i32, radius: i32) -> IndexEntry {
        IndexEntry {
            id,
            class,
            owner: Some(0),
            position: Vec2Fixed::from_ints(x, y),
            radius: Fixed::from_num(radius),
        }
    }

    #[test]
    fn test_empty_index_queries_are_empty() {
        let index = index();
        let hits = index.query_radius(
            Vec2Fixed::from_ints(500, 500),
            Fixed::from_num(300),
            ClassFilter::ALL,
            |_| true,
        );
        assert!(hits.is_empty());
        assert!(index.is_valid_position(Vec2Fixed::from_ints(500, 500), Fixed::from_num(10), None));
    }

    #[test]
    fn test_query_radius_sorted_and_filtered() {
        let mut index = index();
        index.rebuild([
            entry(1, EntityClass::Unit, 130, 100, 8),
            entry(2, EntityClass::Unit, 110, 100, 8),
            entry(3, EntityClass::Building, 105, 100, 30),
            entry(4, EntityClass::Unit, 400, 400, 8),
        ]);

        let hits = index.query_radius(
            Vec2Fixed::from_ints(100, 100),
            Fixed::from_num(50),
            ClassFilter::UNITS,
            |_| true,
        );
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(hits[0].direction.x > Fixed::from_num(0.99));
        assert_eq!(hits[0].direction.y, Fixed::ZERO);

        let all = index.query_radius(
            Vec2Fixed::from_ints(100, 100),
            Fixed::from_num(50),
            ClassFilter::ALL,
            |e| e.id != 2,
        );
        let ids: Vec<_> = all.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_query_spans_cells() {
        let mut index = index();
        index.rebuild([entry(1, EntityClass::Unit, 63, 63, 5), entry(2, EntityClass::Unit, 65, 65, 5)]);
        let hits = index.query_radius(
            Vec2Fixed::from_ints(64, 64),
            Fixed::from_num(3),
            ClassFilter::UNITS,
            |_| true,
        );
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_building_overlap_is_invalid() {
        let mut index = index();
        index.rebuild([entry(1, EntityClass::Building, 500, 500, 40)]);
        let r = Fixed::from_num(20);
        assert!(!index.is_valid_position(Vec2Fixed::from_ints(550, 500), r, None));
        assert!(index.is_valid_position(Vec2Fixed::from_ints(561, 500), r, None));
    }

    #[test]
    fn test_out_of_bounds_is_invalid() {
        let index = index();
        let r = Fixed::from_num(20);
        assert!(!index.is_valid_position(Vec2Fixed::from_ints(10, 500), r, None));
        assert!(!index.is_valid_position(Vec2Fixed::from_ints(500, 990), r, None));
    }

    #[test]
    fn test_unit_crowding_rule() {
        let mut index = index();
        // One of five nearby units overlapping is tolerated (20 %).
        index.rebuild([
            entry(1, EntityClass::Unit, 500, 500, 10),
            entry(2, EntityClass::Unit, 540, 500, 5),
            entry(3, EntityClass::Unit, 460, 500, 5),
            entry(4, EntityClass::Unit, 500, 540, 5),
            entry(5, EntityClass::Unit, 500, 460, 5),
        ]);
        let r = Fixed::from_num(20);
        assert!(index.is_valid_position(Vec2Fixed::from_ints(500, 500), r, None));

        // Two of five is not.
        index.insert(entry(6, EntityClass::Unit, 505, 500, 10));
        index.remove(5);
        assert_eq!(index.len(), 5);
        assert!(!index.is_valid_position(Vec2Fixed::from_ints(500, 500), r, None));
    }

    #[test]
    fn test_excluded_unit_is_ignored() {
        let mut index = index();
        index.rebuild([entry(1, EntityClass::Unit, 500, 500, 10)]);
        let r = Fixed::from_num(10);
        assert!(!index.is_valid_position(Vec2Fixed::from_ints(500, 500), r, None));
        assert!(index.is_valid_position(Vec2Fixed::from_ints(500, 500), r, Some(1)));
    }

    #[test]
    fn test_placement_prefers_target() {
        let index = index();
        let target = Vec2Fixed::from_ints(500, 500);
        let placement = index.find_valid_placement(target, Fixed::from_num(40), 20);
        assert_eq!(placement.position, target);
        assert_eq!(placement.attempts, 1);
        assert!(placement.is_found());
    }

    #[test]
    fn test_placement_spirals_off_blocked_site() {
        let mut index = index();
        index.rebuild([entry(1, EntityClass::Building, 500, 500, 40)]);
        let target = Vec2Fixed::from_ints(520, 500);
        let radius = Fixed::from_num(40);
        let placement = index.find_valid_placement(target, radius, 20);
        assert!(placement.is_found());
        assert!(placement.attempts > 1);
        assert!(placement.position.distance(Vec2Fixed::from_ints(500, 500)) >= radius * 2);
    }

    #[test]
    fn test_placement_exhaustion_returns_target() {
        let mut index = SpatialIndex::new(Fixed::from_num(100), Fixed::from_num(64));
        index.rebuild([entry(1, EntityClass::Building, 50, 50, 40)]);
        let target = Vec2Fixed::from_ints(60, 50);
        let placement = index.find_valid_placement(target, Fixed::from_num(40), 20);
        assert_eq!(placement.outcome, PlacementOutcome::Exhausted);
        assert_eq!(placement.attempts, 20);
        assert_eq!(placement.position, target);
    }

    fn unit_at(id: EntityId, x: i32, velocity: Vec2Fixed) -> Unit {
        let catalog = Catalog::standard();
        let template = catalog.unit(Race::Vanguard, UnitKind::Infantry).unwrap();
        let mut unit = Unit::from_template(
            id,
            0,
            Race::Vanguard,
            UnitKind::Infantry,
            template,
            Vec2Fixed::from_ints(x, 500),
        );
        unit.velocity = velocity;
        unit
    }

    #[test]
    fn test_resolve_overlaps_separates_closing_pair() {
        let index = index();
        let mut units = EntityStorage::new();
        units.insert(1, unit_at(1, 500, Vec2Fixed::from_ints(1, 0)));
        units.insert(2, unit_at(2, 505, Vec2Fixed::from_ints(-1, 0)));

        index.resolve_overlaps(&mut units);

        let a = units.get(1).unwrap();
        let b = units.get(2).unwrap();
        let epsilon = Fixed::from_num(0.001);
        // Combined radius 20, allowance 0.8 -> pushed to 16 apart.
        assert!((b.position.x - a.position.x - Fixed::from_num(16)).abs() < epsilon);
        assert!(a.velocity.x.abs() < epsilon);
        assert!(b.velocity.x.abs() < epsilon);
    }

    #[test]
    fn test_resolve_overlaps_ignores_separating_pair() {
        let index = index();
        let mut units = EntityStorage::new();
        units.insert(1, unit_at(1, 500, Vec2Fixed::from_ints(-1, 0)));
        units.insert(2, unit_at(2, 505, Vec2Fixed::from_ints(1, 0)));

        index.resolve_overlaps(&mut units);

        assert_eq!(units.get(1).unwrap().position.x, Fixed::from_num(500));
        assert_eq!(units.get(2).unwrap().position.x, Fixed::from_num(505));
    }
}
