//! Session timers under paused Tokio time.
use skull_game::constants::LOCAL_CACHE_KEY;
use skull_game::{
    BoostKind, Catalog, EngineConfig, GameEngine, LocalCache, MemoryCache, MemoryProfileStore,
    ProfileRecord, SignInOutcome, TokioClock,
};
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;
use tokio::time::{Instant, sleep};

const START_MS: i64 = 1_000_000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine(cache_json: Option<&str>, remote: &MemoryProfileStore) -> GameEngine {
    let cache = MemoryCache::new();
    if let Some(json) = cache_json {
        cache.write(LOCAL_CACHE_KEY, json).unwrap();
    }
    GameEngine::new(
        EngineConfig::default().with_seed(77),
        Catalog::standard(),
        Rc::new(TokioClock::starting_at(START_MS)),
        Rc::new(cache),
        Rc::new(remote.clone()),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn auto_click_timer_follows_the_latest_purchase() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let engine = engine(Some(r#"{"money": 5.0}"#), &MemoryProfileStore::new());
            let _tasks = engine.start();

            engine.purchase_upgrade("autoClick2").unwrap();
            sleep(Duration::from_millis(10_250)).await;
            assert_eq!(engine.state().total_clicks, 20);

            engine.purchase_upgrade("autoClick1").unwrap();
            assert!((engine.state().auto_click_reward - 1.0).abs() < f64::EPSILON);
            sleep(Duration::from_millis(4_500)).await;
            assert_eq!(engine.state().total_clicks, 24);
            assert_eq!(
                engine.boost_remaining(BoostKind::AutoClick).as_deref(),
                Some("23:59:55")
            );
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn special_boost_clicks_seven_times_a_second() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let engine = engine(Some(r#"{"deadPoints": 80.0}"#), &MemoryProfileStore::new());
            let _tasks = engine.start();

            let state = engine.purchase_upgrade("specialAutoClick").unwrap();
            assert!(state.has_special_auto_click);
            sleep(Duration::from_millis(1_050)).await;
            assert_eq!(engine.state().total_clicks, 7);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn expiring_boost_stops_at_its_deadline_and_is_swept() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let cached = format!(
                r#"{{"autoClickReward": 1.0, "autoClickEndTime": {}}}"#,
                START_MS + 3_000
            );
            let engine = engine(Some(&cached), &MemoryProfileStore::new());
            let _tasks = engine.start();

            sleep(Duration::from_secs(10)).await;
            let state = engine.state();
            assert_eq!(state.total_clicks, 2);
            assert_eq!(state.auto_click_end_time, None);
            assert!(state.auto_click_reward.abs() < f64::EPSILON);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn regen_refills_energy_once_per_tick() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let engine = engine(Some(r#"{"energy": 490.0}"#), &MemoryProfileStore::new());
            let _tasks = engine.start();

            sleep(Duration::from_millis(3_500)).await;
            assert!((engine.state().energy - 493.0).abs() < f64::EPSILON);
            sleep(Duration::from_secs(10)).await;
            assert!((engine.state().energy - 500.0).abs() < f64::EPSILON);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn click_burst_reaches_the_remote_as_one_write() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let remote = MemoryProfileStore::new();
            let engine = engine(None, &remote);
            let _tasks = engine.start();
            let started = Instant::now();

            assert_eq!(engine.sign_in("ghoul").await, SignInOutcome::Seeded);
            let seeded = remote.writes().len();
            assert_eq!(seeded, 1);

            for _ in 0..10 {
                engine.click().unwrap();
            }
            sleep(Duration::from_secs(30)).await;

            // Regen restarts the quiet window every second until energy is
            // full again at 10 s.
            let writes = remote.writes();
            assert_eq!(writes.len(), seeded + 1);
            let last = &writes[seeded];
            assert!(last.at >= started + Duration::from_secs(12));
            assert_eq!(last.user_id, "ghoul");
            assert_eq!(last.fields.total_clicks, Some(10));
            assert_eq!(last.fields.energy, Some(500.0));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn reset_pushes_defaults_immediately() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let remote = MemoryProfileStore::new();
            let engine = engine(None, &remote);
            let _tasks = engine.start();
            engine.sign_in("ghoul").await;
            engine.click().unwrap();

            let before = remote.writes().len();
            engine.reset();
            sleep(Duration::from_millis(10)).await;
            let writes = remote.writes();
            assert_eq!(writes.len(), before + 1);
            assert_eq!(writes[before].fields, ProfileRecord::defaults());

            sleep(Duration::from_secs(5)).await;
            assert_eq!(remote.writes().len(), before + 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn sign_in_lays_the_remote_profile_over_local_state() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let remote = MemoryProfileStore::new();
            remote.insert(
                "ghoul",
                ProfileRecord {
                    money: Some(3.0),
                    level: Some(4),
                    ..ProfileRecord::default()
                },
            );
            let engine = engine(Some(r#"{"upgradeCounts": {"x2click": 1}}"#), &remote);
            let _tasks = engine.start();

            assert_eq!(engine.sign_in("ghoul").await, SignInOutcome::Merged);
            let state = engine.state();
            assert!((state.money - 3.0).abs() < f64::EPSILON);
            assert_eq!(state.level, 4);
            assert_eq!(state.upgrade_count("x2click"), 1);
            assert_eq!(engine.identity().as_deref(), Some("ghoul"));

            sleep(Duration::from_secs(3)).await;
            let writes = remote.writes();
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].fields.money, Some(3.0));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn offline_sign_in_keeps_playing_locally() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let remote = MemoryProfileStore::new();
            remote.set_failing(true);
            let engine = engine(None, &remote);
            let _tasks = engine.start();

            assert_eq!(engine.sign_in("ghoul").await, SignInOutcome::Offline);
            engine.click().unwrap();
            sleep(Duration::from_secs(5)).await;
            assert!(remote.writes().is_empty());
            assert_eq!(engine.state().total_clicks, 1);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn sign_out_drops_the_pending_write() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let remote = MemoryProfileStore::new();
            let engine = engine(None, &remote);
            let _tasks = engine.start();
            engine.sign_in("ghoul").await;
            let seeded = remote.writes().len();

            engine.click().unwrap();
            sleep(Duration::from_millis(500)).await;
            engine.sign_out();
            sleep(Duration::from_secs(20)).await;
            assert_eq!(remote.writes().len(), seeded);
            assert_eq!(engine.identity(), None);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn stopped_session_leaves_state_alone() {
    init_logging();
    LocalSet::new()
        .run_until(async {
            let engine = engine(Some(r#"{"energy": 100.0}"#), &MemoryProfileStore::new());
            let mut tasks = engine.start();
            sleep(Duration::from_millis(2_500)).await;
            tasks.stop();
            let frozen = engine.state();
            sleep(Duration::from_secs(10)).await;
            assert_eq!(*engine.state(), *frozen);
            assert!((frozen.energy - 102.0).abs() < f64::EPSILON);
        })
        .await;
}
