//! End-to-end simulation scenarios on the canonical test data.

use std::sync::Arc;

use rwe_core::command::{IssueMode, PlayerCommandService, PlayerUnitCommand};
use rwe_core::constants::GRAVITY;
use rwe_core::data::{DataBundle, UnitDatabase};
use rwe_core::grid::Point;
use rwe_core::ids::{GameTime, PlayerId, UnitId};
use rwe_core::math::{angle_between, SimAngle, SimScalar, SimVector};
use rwe_core::occupancy::OccupiedCell;
use rwe_core::pathfinding::{find_path, PathGoal};
use rwe_core::replay::{Replay, ReplayPlayer};
use rwe_core::scene::GameScene;
use rwe_core::simulation::GameSimulation;
use rwe_core::terrain::MapTerrain;
use rwe_core::unit::{AttackTarget, LifeState, PathType, UnitOrder, UnitPhysicsInfo};
use rwe_test_utils::cob_asm::ScriptBuilder;
use rwe_test_utils::determinism::SimulationRun;
use rwe_test_utils::fixtures::{
    create_test_simulation, horizontal_distance, spawn_at, test_player, TEST_DATA_RON, TEST_MAP_CORNERS,
};

fn order(sim: &mut GameSimulation, unit: UnitId, order: UnitOrder) {
    let owner = sim.unit(unit).expect("unit exists").owner;
    sim.issue_unit_command(
        owner,
        unit,
        &PlayerUnitCommand::IssueOrder {
            order,
            mode: IssueMode::Immediate,
        },
    );
}

fn current_speed(sim: &GameSimulation, unit: UnitId) -> SimScalar {
    match sim.unit(unit).expect("unit exists").physics {
        UnitPhysicsInfo::Ground(ground) => ground.current_speed,
        UnitPhysicsInfo::Air(air) => air.velocity.length(),
    }
}

#[test]
fn test_unit_moves_across_flat_terrain() {
    let mut run = SimulationRun::new(create_test_simulation(1, 1));
    let tank = spawn_at(&mut run.sim, "TANK", 0, 0, 0);
    let goal = SimVector::from_ints(256, 0, 0);
    order(&mut run.sim, tank, UnitOrder::Move(goal));

    let mut top_speed = SimScalar::ZERO;
    let mut faced_east = false;
    for _ in 0..450 {
        run.tick();
        let unit = run.sim.unit(tank).unwrap();
        assert!(!unit.in_collision, "collided at {:?}", unit.position);
        top_speed = top_speed.max(current_speed(&run.sim, tank));
        faced_east |= angle_between(unit.rotation, SimAngle::QUARTER_TURN).unsigned_abs() <= 16;
    }

    let unit = run.sim.unit(tank).unwrap();
    assert!(faced_east);
    assert_eq!(top_speed, SimScalar::ONE);
    assert_eq!(current_speed(&run.sim, tank), SimScalar::ZERO);
    assert!(horizontal_distance(unit.position, goal) < 8.0, "ended at {:?}", unit.position);
    assert!(unit.orders.is_empty());
}

#[test]
fn test_path_around_wall_of_cells() {
    let is_walkable = |p: Point| (0..20).contains(&p.x) && (0..20).contains(&p.y) && !(p.x == 10 && p.y <= 9);
    let result = find_path(Point::new(5, 5), &PathGoal::Cell(Point::new(15, 5)), &is_walkable, 16_384);

    assert_eq!(result.path_type, PathType::Complete);
    assert!(result.cells.len() >= 3, "path {:?}", result.cells);
    assert!(result.cells[1].x <= 10);
    assert_eq!(result.cells.last(), Some(&Point::new(15, 5)));
    assert!(result.expansions <= 20 * 20);
}

#[test]
fn test_unit_walks_around_rock_wall() {
    let mut run = SimulationRun::new(create_test_simulation(1, 1));
    // Rocks along z = 0 from the left edge to x = 200; the way round is east.
    for x in (-504..=200).step_by(16) {
        run.sim.spawn_feature("ROCK1", SimVector::from_ints(x, 0, 8)).unwrap();
    }
    let tank = spawn_at(&mut run.sim, "TANK", 0, -100, -100);
    let goal = SimVector::from_ints(-100, 0, 100);
    order(&mut run.sim, tank, UnitOrder::Move(goal));

    for _ in 0..1500 {
        run.tick();
        if run.sim.unit(tank).unwrap().orders.is_empty() {
            break;
        }
    }
    let unit = run.sim.unit(tank).unwrap();
    assert!(horizontal_distance(unit.position, goal) < 8.0, "ended at {:?}", unit.position);
}

fn ballistic_sim(muzzle_velocity: i32) -> GameSimulation {
    let mut bundle: DataBundle = ron::from_str(TEST_DATA_RON).unwrap();
    let cannon = bundle.weapons.iter_mut().find(|w| w.name == "CANNON").unwrap();
    cannon.velocity = SimScalar::from_int(muzzle_velocity);
    let database = UnitDatabase::from_bundle(bundle).unwrap();
    let terrain = MapTerrain::flat(TEST_MAP_CORNERS, TEST_MAP_CORNERS, 0, SimScalar::ZERO);
    let mut sim = GameSimulation::new(terrain, Arc::new(database), 11);
    sim.add_player(test_player("CORE"));
    sim
}

#[test]
fn test_ballistic_shot_lands_on_target() {
    let mut run = SimulationRun::new(ballistic_sim(4));
    let mortar = spawn_at(&mut run.sim, "MORTAR", 0, 0, 0);
    let target = SimVector::from_ints(100, 0, 0);
    order(&mut run.sim, mortar, UnitOrder::Attack(AttackTarget::Ground(target)));

    let mut shot = None;
    for _ in 0..120 {
        run.tick();
        if let Some((_, projectile)) = run.sim.projectiles.iter().next() {
            shot = Some(projectile.clone());
            break;
        }
    }
    let mut shot = shot.expect("mortar should fire within four seconds");

    let (v, g, x) = (4.0_f64, GRAVITY.to_num::<f64>(), 100.0_f64);
    let expected_pitch = ((v * v - (v.powi(4) - g * g * x * x).sqrt()) / (g * x)).atan();
    let horizontal = shot.velocity.xz().length().to_num::<f64>();
    // One tick of flight has already run: vy = vy0 + g/2 - g.
    let vertical = shot.velocity.y.to_num::<f64>() + g / 2.0;
    let pitch = vertical.atan2(horizontal);
    assert!((pitch - expected_pitch).abs() < 0.01, "pitch {pitch} expected {expected_pitch}");

    // Follow the arc until it drops below the muzzle, then interpolate.
    let start_y = shot.origin.y;
    while shot.position.y >= start_y {
        shot.integrate(None);
    }
    let (a, b) = (shot.previous_position, shot.position);
    let t = (a.y - start_y).to_num::<f64>() / (a.y - b.y).to_num::<f64>();
    let landing_x = a.x.to_num::<f64>() + t * (b.x - a.x).to_num::<f64>();
    let landing_z = a.z.to_num::<f64>() + t * (b.z - a.z).to_num::<f64>();
    assert!((landing_x - 100.0).abs() < 1.0, "landed at x {landing_x}");
    assert!(landing_z.abs() < 1.0, "landed at z {landing_z}");
}

#[test]
fn test_ballistic_target_beyond_reach_is_dropped() {
    // v = 2 under g = 0.1 carries at most v² / g = 40 units, well short of 100.
    let mut run = SimulationRun::new(ballistic_sim(2));
    let mortar = spawn_at(&mut run.sim, "MORTAR", 0, 0, 0);
    order(&mut run.sim, mortar, UnitOrder::Attack(AttackTarget::Ground(SimVector::from_ints(100, 0, 0))));

    for _ in 0..120 {
        run.tick();
        assert!(run.sim.projectiles.is_empty(), "fired at an unreachable target");
        let weapon = run.sim.unit(mortar).unwrap().weapons[0].as_ref().unwrap();
        assert_eq!(weapon.target, None);
    }
}

#[test]
fn test_idle_unit_with_move_to_own_position_stays_put() {
    let mut run = SimulationRun::new(create_test_simulation(1, 1));
    let tank = spawn_at(&mut run.sim, "TANK", 0, 0, 0);
    let start = run.sim.unit(tank).unwrap().position;
    order(&mut run.sim, tank, UnitOrder::Move(start));

    for _ in 0..60 {
        run.tick();
        let unit = run.sim.unit(tank).unwrap();
        assert!(!unit.in_collision);
    }
    let unit = run.sim.unit(tank).unwrap();
    assert_eq!(unit.position, start);
    assert_eq!(unit.life_state, LifeState::Alive);
    assert_eq!(current_speed(&run.sim, tank), SimScalar::ZERO);
}

#[test]
fn test_script_sleep_wakes_three_ticks_later() {
    let mut bundle: DataBundle = ron::from_str(TEST_DATA_RON).unwrap();
    let script = ScriptBuilder::new()
        .piece("base")
        .statics(1)
        .function("Main", |f| {
            f.sleep(100);
            f.set_static(0, 1);
            f.return_value(0);
        })
        .build();
    bundle.scripts.insert("TANK".to_string(), script);
    let database = UnitDatabase::from_bundle(bundle).unwrap();
    let terrain = MapTerrain::flat(TEST_MAP_CORNERS, TEST_MAP_CORNERS, 0, SimScalar::ZERO);
    let mut run = SimulationRun::new(GameSimulation::new(terrain, Arc::new(database), 1));
    run.sim.add_player(test_player("ARM"));
    let tank = spawn_at(&mut run.sim, "TANK", 0, 0, 0);

    run.run(10);
    assert_eq!(run.sim.game_time, GameTime(10));
    run.sim.start_unit_script(tank, "Main", Vec::new()).unwrap();

    let woke = |sim: &GameSimulation| sim.unit(tank).unwrap().cob_environment.as_ref().unwrap().statics()[0] == 1;
    // Ticks run at game times 10, 11 and 12 with the thread asleep.
    for _ in 0..3 {
        run.tick();
        assert!(!woke(&run.sim), "woke early at {:?}", run.sim.game_time);
    }
    // Game time 13.
    run.tick();
    assert!(woke(&run.sim));
}

#[test]
fn test_builder_stalls_without_energy_and_resumes() {
    let mut run = SimulationRun::new(create_test_simulation(1, 1));
    let builder = spawn_at(&mut run.sim, "ARMCK", 0, 0, 0);
    order(
        &mut run.sim,
        builder,
        UnitOrder::Build {
            unit_type: "ARMSOLAR".to_string(),
            position: SimVector::from_ints(56, 0, 8),
        },
    );

    let site = (0..20).find_map(|_| {
        run.tick();
        run.sim.unit_ids().into_iter().find(|&id| id != builder)
    });
    let site = site.expect("construction site should appear");

    run.sim.players[0].energy.current = SimScalar::ZERO;
    run.run(3);
    assert!(run.sim.players[0].energy.stalled);
    let stalled_at = run.sim.unit(site).unwrap().build_time_completed;
    run.run(10);
    assert_eq!(run.sim.unit(site).unwrap().build_time_completed, stalled_at);
    assert!(run.sim.unit(site).unwrap().is_being_built());

    run.sim.players[0].energy.current = SimScalar::from_int(1000);
    run.run(60);
    let solar = run.sim.unit(site).unwrap();
    assert!(!solar.is_being_built());
    assert!(!run.sim.players[0].energy.stalled);
}

#[test]
fn test_occupancy_follows_unit_until_death() {
    let mut run = SimulationRun::new(create_test_simulation(1, 1));
    let tank = spawn_at(&mut run.sim, "TANK", 0, 0, 0);
    assert_eq!(run.sim.occupancy.count(OccupiedCell::Unit(tank)), 4);

    order(&mut run.sim, tank, UnitOrder::Move(SimVector::from_ints(120, 0, 80)));
    run.run(200);
    let unit = run.sim.unit(tank).unwrap();
    let rect = unit.footprint_rect(&run.sim.terrain);
    assert_eq!(run.sim.occupancy.count(OccupiedCell::Unit(tank)), 4);
    assert_eq!(run.sim.occupancy.try_get(rect.x(), rect.y()), Some(OccupiedCell::Unit(tank)));

    run.sim.apply_damage(tank, u32::MAX, None);
    run.run(2);
    assert!(run.sim.unit(tank).is_none());
    assert_eq!(run.sim.occupancy.count(OccupiedCell::Unit(tank)), 0);
}

#[test]
fn test_recorded_skirmish_replays_without_desync() {
    let setup = || {
        let mut sim = create_test_simulation(2, 5);
        for i in 0..3 {
            spawn_at(&mut sim, "GUNNER", 0, -100 + i * 40, -150);
            spawn_at(&mut sim, "MORTAR", 1, -100 + i * 40, 150);
        }
        sim
    };

    let players = [PlayerId(0), PlayerId(1)];
    let service = Arc::new(PlayerCommandService::new(&players));
    let mut scene = GameScene::new(setup(), Arc::clone(&service)).with_hash_interval(10);
    let mut replay = Replay::new("skirmish", 5);
    let first_gunner = UnitId::from_raw(0);
    for tick in 0..200 {
        let commands = if tick == 20 {
            vec![rwe_core::command::PlayerCommand::UnitCommand {
                unit: first_gunner,
                command: PlayerUnitCommand::IssueOrder {
                    order: UnitOrder::Move(SimVector::from_ints(-100, 0, 0)),
                    mode: IssueMode::Immediate,
                },
            }]
        } else {
            Vec::new()
        };
        service.push_commands(PlayerId(0), commands);
        service.push_commands(PlayerId(1), Vec::new());
        replay.record_tick(&scene.try_tick().expect("both players delivered"));
    }
    assert_eq!(replay.hashes.len(), 20);

    let mut player = ReplayPlayer::new(replay, setup()).with_hash_interval(10);
    player.verify().unwrap();
    assert_eq!(player.checkpoints_verified(), 20);
    assert_eq!(player.scene().simulation().compute_hash(), scene.simulation().compute_hash());
}
