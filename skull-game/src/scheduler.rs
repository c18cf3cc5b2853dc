//! Time-driven transitions: the 1 Hz upkeep tick and the two boost timers.
use rand_chacha::ChaCha20Rng;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};

use crate::boost::{BoostKind, BoostWindow};
use crate::clock::Clock;
use crate::economy::Catalog;
use crate::numbers::millis_to_duration;
use crate::state::GameState;
use crate::store::{StateStore, SubscriptionId, TransitionKind};
use crate::transitions::{self, Rejection};

/// Which upkeep steps changed the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Upkeep {
    pub regenerated: bool,
    pub swept: bool,
    pub earned: bool,
}

/// Runs periodic transitions against a store. Every step reads the state at
/// the moment it fires.
#[derive(Clone)]
pub struct Scheduler {
    store: StateStore,
    catalog: Rc<Catalog>,
    clock: Rc<dyn Clock>,
    rng: Rc<RefCell<ChaCha20Rng>>,
    tick_interval: Duration,
    special_rate: u32,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        store: StateStore,
        catalog: Rc<Catalog>,
        clock: Rc<dyn Clock>,
        rng: Rc<RefCell<ChaCha20Rng>>,
        tick_interval: Duration,
        special_rate: u32,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            rng,
            tick_interval,
            special_rate,
        }
    }

    /// One upkeep tick: regen, then the expiry sweep, then passive income,
    /// each applied on top of the previous result.
    pub fn upkeep(&self) -> Upkeep {
        let regenerated = self
            .store
            .apply(TransitionKind::Regen, transitions::tick_regen)
            .is_ok();
        let now = self.clock.now_ms();
        let swept = self
            .store
            .apply(TransitionKind::Sweep, |state| {
                transitions::sweep_expired_boosts(state, now)
            })
            .is_ok();
        let earned = self
            .store
            .apply(TransitionKind::PassiveIncome, |state| {
                transitions::tick_passive_income(&self.catalog, state)
            })
            .is_ok();
        Upkeep {
            regenerated,
            swept,
            earned,
        }
    }

    /// One automatic click from the regular boost.
    ///
    /// # Errors
    ///
    /// Returns the rejection when the boost is inactive or energy is gone.
    pub fn fire_auto_click(&self) -> Result<Rc<GameState>, Rejection> {
        self.fire(BoostKind::AutoClick)
    }

    /// One automatic click from the special boost.
    ///
    /// # Errors
    ///
    /// Same as [`fire_auto_click`](Self::fire_auto_click).
    pub fn fire_special_auto_click(&self) -> Result<Rc<GameState>, Rejection> {
        self.fire(BoostKind::Special)
    }

    fn fire(&self, kind: BoostKind) -> Result<Rc<GameState>, Rejection> {
        let now = self.clock.now_ms();
        self.store
            .apply(TransitionKind::Click { automatic: true }, |state| {
                let mut rng = self.rng.borrow_mut();
                match kind {
                    BoostKind::AutoClick => transitions::tick_auto_click(state, now, &mut *rng),
                    BoostKind::Special => {
                        transitions::tick_special_auto_click(state, now, &mut *rng)
                    }
                }
            })
    }

    #[must_use]
    pub fn window(&self, kind: BoostKind) -> Option<BoostWindow> {
        self.store.get().boost_window(kind, self.special_rate)
    }

    /// Spawn the upkeep loop and both boost loops on the current `LocalSet`.
    /// The tasks stop when the returned handle is dropped.
    #[must_use]
    pub fn spawn(&self) -> SchedulerHandle {
        let (auto_tx, auto_rx) = watch::channel(self.window(BoostKind::AutoClick));
        let (special_tx, special_rx) = watch::channel(self.window(BoostKind::Special));
        let special_rate = self.special_rate;
        let subscription = self.store.subscribe(move |change| {
            publish(&auto_tx, change.state.auto_click_window());
            publish(
                &special_tx,
                change.state.special_auto_click_window(special_rate),
            );
        });

        let tasks = vec![
            tokio::task::spawn_local(self.clone().run_upkeep()),
            tokio::task::spawn_local(self.clone().run_boost(BoostKind::AutoClick, auto_rx)),
            tokio::task::spawn_local(self.clone().run_boost(BoostKind::Special, special_rx)),
        ];

        SchedulerHandle {
            store: self.store.clone(),
            subscription: Some(subscription),
            tasks,
        }
    }

    async fn run_upkeep(self) {
        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.upkeep();
        }
    }

    /// Follow one boost window. The timer is rebuilt whenever the window
    /// changes and parked once its deadline passes.
    async fn run_boost(self, kind: BoostKind, mut windows: watch::Receiver<Option<BoostWindow>>) {
        loop {
            let window = *windows.borrow_and_update();
            let now = self.clock.now_ms();
            let armed = window
                .filter(|window| window.is_active_at(now))
                .and_then(|window| window.period().map(|period| (window, period)));

            let Some((window, period)) = armed else {
                if windows.changed().await.is_err() {
                    return;
                }
                continue;
            };

            log::debug!(
                "{kind} timer rebuilt: {} clicks/s until {}",
                window.rate_hz,
                window.ends_at
            );
            let deadline = Instant::now() + millis_to_duration(window.ends_at - now);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = windows.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        break;
                    }
                    () = sleep_until(deadline) => {
                        log::debug!("{kind} window ended; timer parked");
                        if windows.changed().await.is_err() {
                            return;
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = self.fire(kind);
                    }
                }
            }
        }
    }
}

fn publish(tx: &watch::Sender<Option<BoostWindow>>, next: Option<BoostWindow>) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick_interval", &self.tick_interval)
            .field("special_rate", &self.special_rate)
            .finish_non_exhaustive()
    }
}

/// Running scheduler tasks. Dropping it aborts them.
#[derive(Debug)]
pub struct SchedulerHandle {
    store: StateStore,
    subscription: Option<SubscriptionId>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::field_reassign_with_default)]

    use super::*;
    use crate::clock::{ManualClock, TokioClock};
    use crate::economy::Catalog;
    use crate::store::Change;
    use crate::transitions::Step;
    use rand::SeedableRng;
    use tokio::task::LocalSet;

    fn scheduler(store: &StateStore, clock: Rc<dyn Clock>) -> Scheduler {
        Scheduler::new(
            store.clone(),
            Rc::new(Catalog::standard()),
            clock,
            Rc::new(RefCell::new(ChaCha20Rng::seed_from_u64(3))),
            Duration::from_secs(1),
            7,
        )
    }

    fn install(store: &StateStore, state: GameState) {
        store
            .apply(TransitionKind::RemoteMerge, |_| {
                Ok(Step {
                    state,
                    rewards: Default::default(),
                })
            })
            .unwrap();
    }

    #[test]
    fn upkeep_runs_regen_sweep_income_in_order() {
        let store = StateStore::default();
        let clock = Rc::new(ManualClock::new(10_000));
        let sched = scheduler(&store, clock);
        let mut state = GameState::default();
        state.energy = 100.0;
        state.auto_click_reward = 1.0;
        state.auto_click_end_time = Some(5_000);
        state.passive_units.push(crate::state::OwnedUnit {
            id: "miner-1".into(),
            count: 1,
        });
        install(&store, state);

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&kinds);
        store.subscribe(move |change: &Change| sink.borrow_mut().push(change.kind.clone()));

        let report = sched.upkeep();
        assert_eq!(
            report,
            Upkeep {
                regenerated: true,
                swept: true,
                earned: true
            }
        );
        assert_eq!(
            *kinds.borrow(),
            vec![
                TransitionKind::Regen,
                TransitionKind::Sweep,
                TransitionKind::PassiveIncome
            ]
        );
        let state = store.get();
        assert!((state.energy - 101.0).abs() < f64::EPSILON);
        assert_eq!(state.auto_click_end_time, None);
        assert!((state.dead_points - 0.000_01).abs() < 1e-15);

        assert_eq!(
            sched.upkeep(),
            Upkeep {
                regenerated: true,
                swept: false,
                earned: true
            }
        );
    }

    #[test]
    fn manual_fire_respects_windows() {
        let store = StateStore::default();
        let clock = Rc::new(ManualClock::new(0));
        let sched = scheduler(&store, clock.clone());
        assert_eq!(
            sched.fire_auto_click(),
            Err(Rejection::BoostInactive(BoostKind::AutoClick))
        );
        let mut state = GameState::default();
        state.special_auto_click_end_time = Some(1_000);
        state.has_special_auto_click = true;
        install(&store, state);
        assert_eq!(sched.fire_special_auto_click().unwrap().total_clicks, 1);
        clock.advance(1_000);
        assert!(sched.fire_special_auto_click().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loops_follow_windows() {
        LocalSet::new()
            .run_until(async {
                let store = StateStore::default();
                let clock = TokioClock::starting_at(0);
                let sched = scheduler(&store, Rc::new(clock));
                let mut state = GameState::default();
                state.energy = 100.0;
                state.auto_click_reward = 2.0;
                state.auto_click_end_time = Some(3_000);
                install(&store, state);

                let mut handle = sched.spawn();
                tokio::time::sleep(Duration::from_millis(5_500)).await;
                // 2 Hz clicks at 0.5 s .. 2.5 s, parked at the 3 s deadline,
                // cleared by the sweep at 4 s.
                let state = store.get();
                assert_eq!(state.total_clicks, 5);
                assert_eq!(state.auto_click_end_time, None);
                assert!((state.energy - 100.0).abs() < f64::EPSILON);

                handle.stop();
                let frozen = store.revision();
                tokio::time::sleep(Duration::from_secs(3)).await;
                assert_eq!(store.revision(), frozen);
            })
            .await;
    }
}
