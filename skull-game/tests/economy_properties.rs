use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use skull_game::constants::BOOST_DURATION_MS;
use skull_game::transitions::{
    click, purchase_passive_unit, purchase_upgrade, sweep_expired_boosts, tick_auto_click,
    tick_passive_income, tick_regen, tick_special_auto_click,
};
use skull_game::{
    Catalog, ClickSource, GameState, ManualClock, Rejection, Scheduler, StateStore, TransitionKind,
    TransitionResult,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn assert_invariants(state: &GameState) {
    assert!(state.energy >= 0.0, "energy {}", state.energy);
    assert!(state.energy <= state.max_energy, "energy above max");
    assert!(state.money >= 0.0);
    assert!(state.dead_points >= 0.0);
    assert!(state.experience >= 0.0);
    assert!(state.experience < state.xp_to_next_level());
    assert!(state.level >= 1);
    assert!(state.click_multiplier >= 1.0);
    assert!(state.lifetime_reward_multiplier >= 1.0);
    assert!(state.passive_units.iter().all(|unit| unit.count >= 1));
}

#[test]
fn random_walk_keeps_invariants() {
    let catalog = Catalog::standard();
    let mut rng = ChaCha20Rng::seed_from_u64(0x5EED);
    let mut state = GameState {
        money: 25.0,
        dead_points: 400.0,
        ..GameState::default()
    };
    let upgrade_ids: Vec<String> = catalog.upgrades.iter().map(|u| u.id.clone()).collect();
    let unit_ids: Vec<String> = catalog
        .passive_units
        .iter()
        .map(|u| u.id.clone())
        .collect();
    let mut now = 1_700_000_000_000_i64;

    for _ in 0..5_000 {
        now += rng.gen_range(0..5_000);
        let roll = rng.gen_range(0..8);
        let result: TransitionResult = match roll {
            0 | 1 => click(&state, ClickSource::Manual, &mut rng),
            2 => {
                let id = &upgrade_ids[rng.gen_range(0..upgrade_ids.len())];
                purchase_upgrade(&catalog, &state, id, now)
            }
            3 => {
                let id = &unit_ids[rng.gen_range(0..unit_ids.len())];
                purchase_passive_unit(&catalog, &state, id)
            }
            4 => tick_regen(&state),
            5 => tick_auto_click(&state, now, &mut rng),
            6 => tick_special_auto_click(&state, now, &mut rng),
            _ => tick_passive_income(&catalog, &state)
                .or_else(|_| sweep_expired_boosts(&state, now)),
        };
        if let Ok(step) = result {
            assert!(step.state.total_clicks >= state.total_clicks);
            for (id, count) in &state.upgrade_counts {
                assert!(step.state.upgrade_count(id) >= *count);
            }
            state = step.state;
        }
        assert_invariants(&state);
    }
}

#[test]
fn nth_purchase_costs_base_times_growth() {
    let catalog = Catalog::standard();
    let mut state = GameState {
        money: 1_000_000.0,
        ..GameState::default()
    };
    let mut last = 0.0;
    for n in 0..8 {
        let cost = catalog.upgrade_cost(&state, "maxEnergy250").unwrap();
        assert!((cost - 0.75 * 1.5_f64.powi(n)).abs() < 1e-9);
        assert!(cost > last);
        last = cost;
        let before = state.money;
        state = purchase_upgrade(&catalog, &state, "maxEnergy250", 0)
            .unwrap()
            .state;
        assert!((before - state.money - cost).abs() < 1e-6);
    }

    let mut last = 0.0;
    for n in 0..8 {
        let cost = catalog.passive_unit_cost(&state, "miner-3").unwrap();
        assert!((cost - 50.0 * 1.8_f64.powi(n)).abs() < 1e-9);
        assert!(cost > last);
        last = cost;
        state = purchase_passive_unit(&catalog, &state, "miner-3")
            .unwrap()
            .state;
    }
    assert_eq!(state.passive_unit_count("miner-3"), 8);
}

#[test]
fn empty_energy_click_is_idempotent() {
    let state = GameState {
        energy: 0.0,
        money: 3.0,
        ..GameState::default()
    };
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    for _ in 0..10 {
        assert_eq!(
            click(&state, ClickSource::Manual, &mut rng),
            Err(Rejection::DepletedEnergy)
        );
    }
    assert!((state.money - 3.0).abs() < f64::EPSILON);
}

#[test]
fn exact_level_up_arithmetic() {
    let state = GameState {
        experience: 98.0,
        ..GameState::default()
    };
    let mut rng = ChaCha20Rng::seed_from_u64(21);
    let mut replay = ChaCha20Rng::seed_from_u64(21);
    let _money: f64 = replay.gen_range(0.000_01..0.000_5);
    let xp: f64 = replay.gen_range(1.0..2.5);

    let next = click(&state, ClickSource::Manual, &mut rng).unwrap().state;
    if 98.0 + xp >= 100.0 {
        assert_eq!(next.level, 2);
        assert!((next.experience - (98.0 + xp - 100.0)).abs() < 1e-12);
    } else {
        assert_eq!(next.level, 1);
        assert!((next.experience - (98.0 + xp)).abs() < 1e-12);
    }
}

#[test]
fn boost_repurchase_an_hour_later_restarts_the_day() {
    let catalog = Catalog::standard();
    let t0 = 1_700_000_000_000_i64;
    let hour = 3_600_000_i64;
    let state = GameState {
        money: 5.0,
        dead_points: 200.0,
        ..GameState::default()
    };

    let first = purchase_upgrade(&catalog, &state, "autoClick6", t0)
        .unwrap()
        .state;
    let again = purchase_upgrade(&catalog, &first, "autoClick6", t0 + hour)
        .unwrap()
        .state;
    assert_eq!(again.auto_click_end_time, Some(t0 + hour + BOOST_DURATION_MS));

    let special = purchase_upgrade(&catalog, &again, "specialAutoClick", t0)
        .unwrap()
        .state;
    let special_again = purchase_upgrade(&catalog, &special, "specialAutoClick", t0 + hour)
        .unwrap()
        .state;
    assert_eq!(
        special_again.special_auto_click_end_time,
        Some(t0 + hour + BOOST_DURATION_MS)
    );
    assert!(special_again.has_special_auto_click);
}

#[test]
fn three_units_for_ten_seconds_yield_fifteen_ten_thousandths() {
    let store = StateStore::default();
    store
        .apply(TransitionKind::RemoteMerge, |state| {
            let mut next = state.clone();
            next.money = 100.0;
            Ok(skull_game::Step {
                state: next,
                rewards: Default::default(),
            })
        })
        .unwrap();
    let catalog = Rc::new(Catalog::standard());
    for _ in 0..3 {
        store
            .apply(TransitionKind::PurchasePassiveUnit("miner-2".into()), |state| {
                purchase_passive_unit(&catalog, state, "miner-2")
            })
            .unwrap();
    }

    let clock = Rc::new(ManualClock::new(0));
    let scheduler = Scheduler::new(
        store.clone(),
        catalog,
        clock.clone(),
        Rc::new(RefCell::new(ChaCha20Rng::seed_from_u64(0))),
        Duration::from_secs(1),
        7,
    );
    for _ in 0..10 {
        clock.advance(1_000);
        assert!(scheduler.upkeep().earned);
    }
    assert!((store.get().dead_points - 0.0015).abs() < 1e-12);
}
