//! Determinism testing utilities.
//!
//! Identical seeds and command streams must yield identical matches, so
//! replays and headless verification can trust a single state hash.
//!
//! Things that break this:
//!
//! - **Floating-point math**: the tick uses [`skirmish_core::math::Fixed`].
//! - **HashMap iteration order**: storage is walked in sorted id order.
//! - **Unseeded randomness**: AI rolls come from per-player seeded generators.
//!
//! The harness runs the same setup several times (sequentially, on scoped
//! threads, or through a serialize round trip) and compares state hashes.

use std::thread;

use skirmish_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, ticks: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            ticks,
        }
    }

    /// Distinct hashes seen (one for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched.
    ///
    /// # Panics
    ///
    /// Panics with the hash list if runs diverged.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "Simulation is non-deterministic!\n\
             Runs: {}\n\
             Ticks: {}\n\
             Unique hashes: {} (expected 1)\n\
             All hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes
        );
    }
}

/// Run a setup `runs` times for `ticks` steps and compare final hashes.
///
/// Generic over the state so it also covers pieces smaller than a whole
/// [`Simulation`].
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            hash(&state)
        })
        .collect();
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Two runs of a [`Simulation`] setup end in the same state hash.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` copies of a setup on scoped threads.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations_scoped<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    sim.run(num_ticks);
                    sim.state_hash()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, num_ticks)
}

/// Step two copies in lockstep and report the first tick their hashes
/// differ, or `None` if they never do.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut a = setup_fn();
    let mut b = setup_fn();
    if a.state_hash() != b.state_hash() {
        return Some(0);
    }
    (1..=num_ticks).find(|_| {
        a.tick();
        b.tick();
        a.state_hash() != b.state_hash()
    })
}

/// Serialize after `num_ticks`, restore, and check the copy both hashes
/// the same and keeps matching the original for `continue_ticks` more.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64, continue_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    sim.run(num_ticks);

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != sim.state_hash() {
        return false;
    }

    sim.run(continue_ticks);
    restored.run(continue_ticks);
    restored.state_hash() == sim.state_hash()
}

/// Proptest strategies for simulation inputs.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::math::{Fixed, Vec2Fixed};
    use skirmish_core::races::{Race, UnitKind};
    use skirmish_core::simulation::Command;

    /// Coordinate inside a world of edge `size`.
    pub fn arb_coordinate(size: i32) -> impl Strategy<Value = Fixed> {
        (0..size).prop_map(Fixed::from_num)
    }

    /// Position inside a world of edge `size`.
    pub fn arb_position(size: i32) -> impl Strategy<Value = Vec2Fixed> {
        (arb_coordinate(size), arb_coordinate(size)).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Any race.
    pub fn arb_race() -> impl Strategy<Value = Race> {
        prop_oneof![Just(Race::Vanguard), Just(Race::Swarm), Just(Race::Ascendant)]
    }

    /// Any unit kind.
    pub fn arb_unit_kind() -> impl Strategy<Value = UnitKind> {
        prop_oneof![
            Just(UnitKind::Worker),
            Just(UnitKind::Infantry),
            Just(UnitKind::Ranged),
        ]
    }

    /// Unit commands that need no entity references.
    pub fn arb_movement_command(size: i32) -> impl Strategy<Value = Command> {
        prop_oneof![
            arb_position(size).prop_map(Command::Move),
            (arb_position(size), arb_position(size)).prop_map(|(a, b)| Command::Patrol(a, b)),
            Just(Command::Stop),
        ]
    }

    /// Up to `max_len` movement commands.
    pub fn arb_command_sequence(size: i32, max_len: usize) -> impl Strategy<Value = Vec<Command>> {
        proptest::collection::vec(arb_movement_command(size), 0..max_len)
    }

    /// Health values (1-2000).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..2000u32
    }

    /// Damage values (0-500).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        0u32..500u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ai_match, pos, two_player_sim};
    use proptest::prelude::*;
    use skirmish_core::ai::Difficulty;
    use skirmish_core::races::UnitKind;

    fn skirmish() -> Simulation {
        let mut sim = two_player_sim(11);
        for i in 0..4 {
            sim.spawn_unit(1, UnitKind::Infantry, pos(400, 400 + i * 30)).unwrap();
            sim.spawn_unit(2, UnitKind::Ranged, pos(520, 400 + i * 30)).unwrap();
        }
        sim
    }

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_divergence() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        assert!(verify_simulation_determinism(|| two_player_sim(0), 100));
    }

    #[test]
    fn test_combat_determinism() {
        assert!(verify_simulation_determinism(skirmish, 300));
        assert_eq!(find_first_divergence(skirmish, 300), None);
    }

    #[test]
    fn test_ai_match_determinism() {
        assert!(verify_simulation_determinism(|| ai_match(5, Difficulty::Hard), 400));
    }

    #[test]
    fn test_parallel_ai_matches() {
        run_parallel_simulations_scoped(|| ai_match(9, Difficulty::Medium), 4, 300)
            .assert_deterministic();
    }

    #[test]
    fn test_seed_changes_outcome_only_through_ai() {
        // Without AI the seed has nothing to roll.
        let a = two_player_sim(1);
        let b = two_player_sim(2);
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_serialization_round_trip_keeps_running_in_lockstep() {
        assert!(verify_serialization_determinism(
            || ai_match(21, Difficulty::Hard),
            200,
            200
        ));
        assert!(verify_serialization_determinism(skirmish, 50, 100));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_command_sequences_are_replayable(
            commands in strategies::arb_command_sequence(2048, 10),
            start in strategies::arb_position(2048),
            kind in strategies::arb_unit_kind(),
        ) {
            let setup = || {
                let mut sim = two_player_sim(0);
                let unit = sim.spawn_unit(1, kind, start).unwrap();
                for command in &commands {
                    let _ = sim.apply_command(unit, *command, true);
                }
                sim
            };
            prop_assert!(verify_simulation_determinism(setup, 150));
        }
    }
}
