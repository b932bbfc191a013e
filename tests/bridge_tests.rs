//! Bridge protocol validation tests
//!
//! These tests drive the controller tick by tick and check the safety,
//! following and liveness properties of the admission protocol.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};

use bridge_sim::simulation::{
    BridgeConfig, BridgeController, BridgeEvent, CarId, CarState, ConfigError, CooldownPolicy,
    Direction, GateStatus, NullSink, TIME_LIMIT_TICKS,
};

fn controller_with_events(config: BridgeConfig) -> (BridgeController, Receiver<BridgeEvent>) {
    let (tx, rx) = mpsc::channel();
    let bridge = BridgeController::with_sink(config, Box::new(tx)).expect("valid config");
    (bridge, rx)
}

fn assert_following_invariant(bridge: &BridgeController) {
    for leader in bridge.cars() {
        if let Some(follower_id) = leader.follower() {
            let follower = bridge.car(follower_id).expect("follower is alive");
            assert!(
                follower.max_advance() <= (leader.position() - leader.spec.car_width).max(0),
                "{} cap {} exceeds rear of leader {} at {}",
                follower.id,
                follower.max_advance(),
                leader.id,
                leader.position()
            );
            assert!(follower.position() <= follower.max_advance());
        }
    }
}

fn assert_exclusive(bridge: &BridgeController) {
    let up = bridge.crossing_count(Direction::Up);
    let down = bridge.crossing_count(Direction::Down);
    assert!(
        up == 0 || down == 0,
        "tick {}: {} up and {} down cars on the bridge",
        bridge.time(),
        up,
        down
    );
}

#[test]
fn test_rejects_non_positive_configuration() {
    let bad = [
        BridgeConfig {
            bridge_length: 0,
            ..BridgeConfig::default()
        },
        BridgeConfig {
            car_width: -60,
            ..BridgeConfig::default()
        },
        BridgeConfig {
            car_speed: 0,
            ..BridgeConfig::default()
        },
    ];
    for config in bad {
        assert!(BridgeController::new(config).is_err());
    }

    let mut bridge = BridgeController::new(BridgeConfig::default()).unwrap();
    assert_eq!(
        bridge.set_car_width(0),
        Err(ConfigError::NonPositiveCarWidth(0))
    );
    assert_eq!(bridge.config().car_width, 60);
    assert!(bridge.set_car_speed(10).is_err());
    assert_eq!(bridge.config().car_speed, 8);
    assert!(bridge.set_create_frequency(0).is_err());
}

#[test]
fn test_scenario_a_follower_tracks_leader() {
    let mut bridge = BridgeController::new(BridgeConfig::default()).unwrap();

    let leader = bridge.spawn_car(Direction::Up).unwrap();
    assert_eq!(bridge.car(leader).unwrap().state(), CarState::Crossing);
    assert_eq!(bridge.car(leader).unwrap().max_advance(), 400);

    bridge.tick().unwrap();
    let follower = bridge.spawn_car(Direction::Up).unwrap();
    assert_eq!(bridge.car(leader).unwrap().follower(), Some(follower));

    let mut exit_order = Vec::new();
    let mut leader_gone_at = None;
    for _ in 0..200 {
        match bridge.car(leader) {
            Some(l) => {
                let f = bridge.car(follower).unwrap();
                assert_eq!(f.max_advance(), (l.position() - 60).max(0));
            }
            None => {
                if leader_gone_at.is_none() {
                    leader_gone_at = Some(bridge.time());
                    exit_order.push(leader);
                }
                match bridge.car(follower) {
                    Some(f) => assert_eq!(f.max_advance(), 400),
                    None => {
                        exit_order.push(follower);
                        break;
                    }
                }
            }
        }
        bridge.tick().unwrap();
    }

    assert_eq!(exit_order, vec![leader, follower]);
    // 400 / 8 ticks for the leader
    assert_eq!(leader_gone_at, Some(50));
    assert_eq!(bridge.stats().exited(Direction::Up), 2);
}

#[test]
fn test_follower_waits_at_entrance_until_gap_opens() {
    let mut bridge = BridgeController::new(BridgeConfig::default()).unwrap();
    let leader = bridge.spawn_car(Direction::Down).unwrap();
    // Down is not allowed yet, the gate switches on the next ticks
    assert_eq!(bridge.car(leader).unwrap().state(), CarState::Queued);

    let follower = bridge.spawn_car(Direction::Down).unwrap();
    assert_eq!(bridge.waiting_count(Direction::Down), 2);

    let mut entered_apart = None;
    for _ in 0..100 {
        bridge.tick().unwrap();
        let l = bridge.car(leader).unwrap();
        let f = bridge.car(follower).unwrap();
        if f.state() == CarState::Crossing {
            assert!(l.position() > 60);
            entered_apart = Some(f.entered_at().unwrap() - l.entered_at().unwrap());
            break;
        }
    }
    assert!(entered_apart.is_some_and(|gap| gap > 0));
    assert_eq!(bridge.waiting_count(Direction::Down), 0);
}

#[test]
fn test_safety_and_following_under_mixed_load() {
    let config = BridgeConfig {
        auto_create: true,
        mean_interval_ms: 100.0,
        time_limit: Some(TIME_LIMIT_TICKS),
        seed: Some(11),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();

    let mut saw_switch = false;
    for _ in 0..6000 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
        assert_following_invariant(&bridge);
        saw_switch |= bridge.traffic_status() == GateStatus::SwitchInProgress;
    }

    assert!(saw_switch);
    assert!(bridge.stats().exited(Direction::Up) > 0);
    assert!(bridge.stats().exited(Direction::Down) > 0);
    assert!(!bridge.is_deadlocked());
}

#[test]
fn test_liveness_under_skewed_arrivals() {
    let limit = 600;
    let config = BridgeConfig {
        auto_create: true,
        mean_interval_ms: 300.0,
        up_probability: 0.1,
        time_limit: Some(limit),
        seed: Some(5),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();

    for _ in 0..20_000 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
        for car in bridge.cars() {
            if car.state() == CarState::Queued {
                assert!(
                    car.wait_ticks(bridge.time()) <= limit,
                    "{} queued for {} ticks",
                    car.id,
                    car.wait_ticks(bridge.time())
                );
            }
        }
    }

    let stats = bridge.stats();
    assert!(stats.entered(Direction::Up) > 0);
    assert!(stats.longest_wait(Direction::Up) <= limit);
    assert!(stats.longest_wait(Direction::Down) <= limit);
}

#[test]
fn test_forced_switch_overrides_fairness() {
    // A long cooldown after every pass keeps fairness out of the way
    let config = BridgeConfig {
        time_limit: Some(400),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();
    bridge.set_cooldown(u32::MAX, CooldownPolicy::OnEvaluation);

    // Keep up traffic busy so fairness never favours down
    let up_cars: Vec<CarId> = (0..3)
        .map(|_| bridge.spawn_car(Direction::Up).unwrap())
        .collect();
    let down = bridge.spawn_car(Direction::Down).unwrap();

    let mut entered = None;
    for _ in 0..400 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
        if bridge.car(down).is_some_and(|c| c.state() != CarState::Queued) {
            entered = bridge.car(down).and_then(|c| c.entered_at());
            break;
        }
        if bridge.time() % 5 == 0 {
            bridge.spawn_car(Direction::Up).unwrap();
        }
    }

    let entered = entered.expect("down car entered within the time limit");
    assert!(entered <= 400);
    assert!(bridge.stats().forced_switches >= 1);
    assert!(up_cars.iter().all(|id| bridge.car(*id).is_none()));
}

#[test]
fn test_time_limit_holds_with_slower_cars_on_bridge() {
    let config = BridgeConfig {
        time_limit: Some(TIME_LIMIT_TICKS),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();
    bridge.set_cooldown(u32::MAX, CooldownPolicy::OnEvaluation);

    // Crawling up cars at one unit per tick, while the configuration
    // already asks for the default speed again
    let spawn_slow_up = |bridge: &mut BridgeController| {
        bridge.set_car_speed(30).unwrap();
        bridge.spawn_car(Direction::Up).unwrap();
        bridge.set_car_speed(240).unwrap();
    };
    for _ in 0..3 {
        spawn_slow_up(&mut bridge);
    }

    // A slow wide down car with a regular one behind it
    bridge.set_car_speed(30).unwrap();
    bridge.set_car_width(120).unwrap();
    let wide = bridge.spawn_car(Direction::Down).unwrap();
    bridge.set_car_width(60).unwrap();
    bridge.set_car_speed(240).unwrap();
    let regular = bridge.spawn_car(Direction::Down).unwrap();
    assert_eq!(bridge.car(wide).map(|c| c.spec.speed), Some(1));
    assert_eq!(bridge.car(regular).map(|c| c.spec.speed), Some(8));

    while bridge.stats().entered(Direction::Down) < 2 && bridge.time() < 8000 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
        assert_following_invariant(&bridge);
        if bridge.time() % 55 == 0 {
            spawn_slow_up(&mut bridge);
        }
    }

    let stats = bridge.stats();
    assert_eq!(stats.entered(Direction::Down), 2);
    assert!(
        stats.longest_wait(Direction::Down) <= TIME_LIMIT_TICKS,
        "down car waited {} ticks",
        stats.longest_wait(Direction::Down)
    );
    assert!(stats.forced_switches >= 1);
    assert_eq!(stats.fair_switches, 0);
}

#[test]
fn test_scenario_b_minority_crosses_within_limit() {
    let config = BridgeConfig {
        time_limit: Some(TIME_LIMIT_TICKS),
        seed: Some(2024),
        ..BridgeConfig::default()
    };
    let (mut bridge, events) = controller_with_events(config);
    for i in 0..80 {
        let direction = if i % 10 == 0 {
            Direction::Up
        } else {
            Direction::Down
        };
        bridge.create_car(direction);
    }

    let mut created_at: HashMap<CarId, (Direction, u64)> = HashMap::new();
    let mut up_round_trips = Vec::new();
    while !bridge.is_idle() && bridge.time() < 50_000 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
        for event in events.try_iter() {
            match event {
                BridgeEvent::CarCreated { car, direction } => {
                    created_at.insert(car, (direction, bridge.time()));
                }
                BridgeEvent::CarExited { car } => {
                    if let Some((Direction::Up, at)) = created_at.get(&car) {
                        up_round_trips.push(bridge.time() - at);
                    }
                }
                _ => {}
            }
        }
    }

    assert!(bridge.is_idle());
    assert_eq!(bridge.stats().cars_created, 80);
    assert_eq!(up_round_trips.len(), 8);
    assert!(up_round_trips.iter().any(|t| *t <= TIME_LIMIT_TICKS));
    assert!(bridge.stats().overall_longest_wait() <= TIME_LIMIT_TICKS);
}

#[test]
fn test_starvation_scenario_minority_progresses() {
    let config = BridgeConfig {
        time_limit: Some(TIME_LIMIT_TICKS),
        seed: Some(99),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();
    bridge.starvation_scenario().unwrap();
    assert_eq!(bridge.pending_requests(), 81);

    while !bridge.is_idle() && bridge.time() < 100_000 {
        bridge.tick().unwrap();
        assert_exclusive(&bridge);
    }

    let stats = bridge.stats();
    assert_eq!(stats.exited(Direction::Down), 1);
    assert_eq!(stats.exited(Direction::Up), 80);
    assert!(stats.longest_wait(Direction::Down) <= TIME_LIMIT_TICKS);
}

#[test]
fn test_deadlock_scenario_reaches_terminal_state() {
    let config = BridgeConfig {
        seed: Some(3),
        ..BridgeConfig::default()
    };
    let mut bridge = BridgeController::new(config).unwrap();
    bridge.deadlock_scenario().unwrap();
    assert!(!bridge.gate().protect());
    assert_eq!(bridge.config().car_speed, 10);

    while !bridge.is_deadlocked() && bridge.time() < 10_000 {
        bridge.tick().unwrap();
    }
    assert!(bridge.is_deadlocked());
    assert!(bridge.stats().deadlock_detected_at.is_some());

    let stuck: Vec<(CarId, i32)> = bridge
        .cars()
        .filter(|c| c.is_blocked_head_on())
        .map(|c| (c.id, c.position()))
        .collect();
    assert!(stuck.len() >= 2);
    let exited = bridge.stats().total_exited();

    bridge.run(500).unwrap();
    assert!(bridge.is_deadlocked());
    assert_eq!(bridge.stats().total_exited(), exited);
    for (id, position) in stuck {
        assert_eq!(bridge.car(id).map(|c| c.position()), Some(position));
    }
}

#[test]
fn test_config_changes_only_affect_new_cars() {
    let mut bridge =
        BridgeController::with_sink(BridgeConfig::default(), Box::new(NullSink)).unwrap();
    let first = bridge.spawn_car(Direction::Up).unwrap();
    bridge.set_car_speed(300).unwrap();
    bridge.set_car_width(40).unwrap();
    bridge.run(5).unwrap();
    let second = bridge.spawn_car(Direction::Up).unwrap();

    let first = bridge.car(first).unwrap();
    let second = bridge.car(second).unwrap();
    assert_eq!(first.spec.speed, 8);
    assert_eq!(first.spec.car_width, 60);
    assert_eq!(first.position(), 40);
    assert_eq!(second.spec.speed, 10);
    assert_eq!(second.spec.car_width, 40);
    // Gap is measured against the leader's own width
    assert_eq!(second.max_advance(), 0);
}

#[test]
fn test_periodic_status_events() {
    let config = BridgeConfig {
        status_period_ticks: 10,
        ..BridgeConfig::default()
    };
    let (mut bridge, events) = controller_with_events(config);
    bridge.spawn_car(Direction::Down).unwrap();
    bridge.run(10).unwrap();

    let events: Vec<BridgeEvent> = events.try_iter().collect();
    assert!(events.contains(&BridgeEvent::TrafficStatus { code: 2 }));
    assert!(events
        .iter()
        .any(|e| matches!(e, BridgeEvent::CarCounts { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, BridgeEvent::PositionChanged { .. })));
}

#[test]
fn test_wait_time_reported_for_waiting_direction() {
    let config = BridgeConfig {
        status_period_ticks: 10,
        ..BridgeConfig::default()
    };
    let (mut bridge, events) = controller_with_events(config);
    bridge.spawn_car(Direction::Up).unwrap();
    let down = bridge.spawn_car(Direction::Down).unwrap();

    // The up car needs 50 ticks to clear the bridge before down may enter
    bridge.run(50).unwrap();
    let car = bridge.car(down).unwrap();
    assert_eq!(car.state(), CarState::Queued);
    assert_eq!(car.queued_at(), 0);

    let mut down_waits = Vec::new();
    for event in events.try_iter() {
        if let BridgeEvent::WaitTime { direction, elapsed } = event {
            assert_eq!(direction, Direction::Down);
            down_waits.push(elapsed);
        }
    }
    assert_eq!(down_waits, vec![10, 20, 30, 40, 50]);

    bridge.tick().unwrap();
    assert_eq!(bridge.car(down).and_then(|c| c.entered_at()), Some(51));
}
