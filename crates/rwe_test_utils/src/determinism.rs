//! Determinism testing utilities.
//!
//! Lockstep peers only exchange commands, so every peer must compute
//! bit-identical state from the same inputs. This module runs the same
//! scenario several times, on one thread or many, and compares the state
//! hashes the simulation reports.
//!
//! # Sources of divergence this catches
//!
//! - **Floating point** sneaking onto the simulation path. Everything
//!   there is [`rwe_core::math::SimScalar`].
//! - **Unordered iteration** over hash maps. The simulation iterates ids
//!   in ascending order.
//! - **Unseeded randomness**. The only RNG is the seeded one owned by the
//!   simulation.

use std::thread;

use tracing::warn;
use rwe_core::hash::GameHash;
use rwe_core::pathfinding::PathFindingService;
use rwe_core::simulation::GameSimulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final hash of each run.
    pub hashes: Vec<GameHash>,
    /// Number of ticks simulated per run.
    pub ticks: u32,
}

impl DeterminismResult {
    /// Distinct hashes (one for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<GameHash> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            panic!(
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
}

/// Run a state machine `runs` times and compare final hashes.
///
/// * `setup` creates the initial state.
/// * `step` advances it by one tick; it receives the tick index so a
///   scenario can inject commands at fixed times.
/// * `hash` digests the final state.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u32,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u32),
    HashFn: Fn(&S) -> GameHash,
{
    let hashes: Vec<GameHash> = (0..runs)
        .map(|_| {
            let mut state = setup();
            for tick in 0..ticks {
                step(&mut state, tick);
            }
            hash(&state)
        })
        .collect();

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// A simulation together with the pathfinder that services it.
#[derive(Debug)]
pub struct SimulationRun {
    /// The world.
    pub sim: GameSimulation,
    /// Its pathfinder.
    pub pathfinder: PathFindingService,
}

impl SimulationRun {
    /// Wrap a freshly set up simulation.
    #[must_use]
    pub fn new(sim: GameSimulation) -> Self {
        Self {
            sim,
            pathfinder: PathFindingService::new(),
        }
    }

    /// Advance one tick.
    pub fn tick(&mut self) {
        self.sim.tick(&mut self.pathfinder);
    }

    /// Advance `ticks` ticks.
    pub fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }
}

/// Run a simulation scenario twice and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u32) -> DeterminismResult
where
    F: Fn() -> GameSimulation,
{
    verify_determinism(
        2,
        num_ticks,
        || SimulationRun::new(setup_fn()),
        |run, _| run.tick(),
        |run| run.sim.compute_hash(),
    )
}

/// Run `num_sims` copies of a scenario on separate threads.
///
/// Catches divergence that only shows up under different scheduling or
/// memory layout.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u32) -> DeterminismResult
where
    F: Fn() -> GameSimulation + Sync,
{
    let hashes: Vec<GameHash> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut run = SimulationRun::new(setup_fn());
                    run.run(num_ticks);
                    run.sim.compute_hash()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Step two copies of a scenario side by side and report the first tick
/// after which their hashes differ, or `None` if they never do. Tick 0 is
/// the initial state.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u32) -> Option<u32>
where
    F: Fn() -> GameSimulation,
{
    let mut a = SimulationRun::new(setup_fn());
    let mut b = SimulationRun::new(setup_fn());

    if a.sim.compute_hash() != b.sim.compute_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        a.tick();
        b.tick();
        let (left, right) = (a.sim.compute_hash(), b.sim.compute_hash());
        if left != right {
            warn!(tick, %left, %right, "runs diverged");
            return Some(tick);
        }
    }

    None
}

/// Proptest strategies for simulation inputs.
pub mod strategies {
    use proptest::prelude::*;
    use rwe_core::command::{IssueMode, PlayerUnitCommand};
    use rwe_core::grid::DiscreteRect;
    use rwe_core::math::{SimAngle, SimScalar, SimVector};
    use rwe_core::unit::{FireOrders, UnitOrder};

    /// Any scalar, at full fractional precision.
    pub fn arb_scalar() -> impl Strategy<Value = SimScalar> {
        any::<i32>().prop_map(SimScalar::from_bits)
    }

    /// Any angle.
    pub fn arb_angle() -> impl Strategy<Value = SimAngle> {
        any::<u16>().prop_map(SimAngle::new)
    }

    /// A ground position inside the default 1024x1024 test map, kept
    /// 32 units from the edges.
    pub fn arb_map_position() -> impl Strategy<Value = SimVector> {
        (-480i32..480, -480i32..480).prop_map(|(x, z)| SimVector::from_ints(x, 0, z))
    }

    /// A rectangle that may hang off any edge of a 64x64 grid.
    pub fn arb_rect() -> impl Strategy<Value = DiscreteRect> {
        (-16i32..80, -16i32..80, 0i32..24, 0i32..24).prop_map(|(x, y, w, h)| DiscreteRect::new(x, y, w, h))
    }

    /// A command that needs no other unit to exist.
    pub fn arb_unit_command() -> impl Strategy<Value = PlayerUnitCommand> {
        prop_oneof![
            (arb_map_position(), any::<bool>()).prop_map(|(position, queued)| PlayerUnitCommand::IssueOrder {
                order: UnitOrder::Move(position),
                mode: if queued { IssueMode::Queued } else { IssueMode::Immediate },
            }),
            Just(PlayerUnitCommand::Stop),
            prop_oneof![
                Just(FireOrders::HoldFire),
                Just(FireOrders::ReturnFire),
                Just(FireOrders::FireAtWill),
            ]
            .prop_map(PlayerUnitCommand::SetFireOrders),
        ]
    }

    /// Commands keyed by the tick they are issued on.
    pub fn arb_command_schedule(
        max_len: usize,
        ticks: u32,
    ) -> impl Strategy<Value = Vec<(u32, PlayerUnitCommand)>> {
        proptest::collection::vec((0..ticks, arb_unit_command()), 0..max_len).prop_map(|mut schedule| {
            schedule.sort_by_key(|(tick, _)| *tick);
            schedule
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rwe_core::ids::{PlayerId, UnitId};
    use rwe_core::math::SimVector;

    use super::strategies::*;
    use super::*;
    use crate::fixtures::{create_test_simulation, spawn_at};

    fn setup_skirmish() -> GameSimulation {
        let mut sim = create_test_simulation(2, 42);
        for i in 0..4 {
            spawn_at(&mut sim, "GUNNER", 0, -200 + i * 40, -100);
            spawn_at(&mut sim, "MORTAR", 1, -200 + i * 40, 150);
        }
        sim
    }

    fn setup_march() -> GameSimulation {
        let mut sim = create_test_simulation(1, 7);
        for i in 0..6 {
            let id = spawn_at(&mut sim, "TANK", 0, -300, -300 + i * 48);
            sim.issue_unit_command(
                PlayerId(0),
                id,
                &rwe_core::command::PlayerUnitCommand::IssueOrder {
                    order: rwe_core::unit::UnitOrder::Move(SimVector::from_ints(300, 0, 200 - i * 48)),
                    mode: rwe_core::command::IssueMode::Immediate,
                },
            );
        }
        sim
    }

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u32, |s, _| *s += 1, |s| GameHash(*s));
        result.assert_deterministic();
        assert_eq!(result.hashes, vec![GameHash(10); 3]);
    }

    #[test]
    fn test_detects_non_determinism() {
        let counter = std::cell::Cell::new(0u32);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_, _| {},
            |s| GameHash(*s),
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        verify_simulation_determinism(|| create_test_simulation(2, 1), 30).assert_deterministic();
    }

    #[test]
    fn test_skirmish_determinism() {
        verify_simulation_determinism(setup_skirmish, 300).assert_deterministic();
    }

    #[test]
    fn test_march_has_no_divergence() {
        assert_eq!(find_first_divergence(setup_march, 200), None);
    }

    #[test]
    fn test_parallel_skirmishes_match() {
        run_parallel_simulations(setup_skirmish, 4, 150).assert_deterministic();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_random_command_schedules_are_deterministic(schedule in arb_command_schedule(12, 120)) {
            let result = verify_determinism(
                2,
                120,
                || {
                    let mut sim = create_test_simulation(1, 3);
                    let unit = spawn_at(&mut sim, "TANK", 0, 0, 0);
                    (SimulationRun::new(sim), unit)
                },
                |(run, unit): &mut (SimulationRun, UnitId), tick| {
                    for (_, command) in schedule.iter().filter(|(t, _)| *t == tick) {
                        run.sim.issue_unit_command(PlayerId(0), *unit, command);
                    }
                    run.tick();
                },
                |(run, _)| run.sim.compute_hash(),
            );
            prop_assert!(result.is_deterministic);
        }
    }
}
