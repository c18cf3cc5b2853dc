//! The presentation-facing engine: one session's store, timers and sync.
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::boost::{BoostKind, format_remaining};
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::constants::LOCAL_CACHE_KEY;
use crate::economy::{Catalog, CatalogError};
use crate::numbers::timestamp_to_seed;
use crate::persistence::{
    LoadSource, LocalCache, PersistenceBridge, RemoteProfileStore, SignInOutcome,
};
use crate::rewards::{RewardEvent, RewardNotifier};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::state::GameState;
use crate::store::{Change, StateStore, SubscriptionId, TransitionKind};
use crate::transitions::{self, ClickSource, Rejection};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Background tasks of a running session. Dropping this stops them.
#[derive(Debug)]
pub struct SessionTasks {
    scheduler: SchedulerHandle,
    sync: Option<JoinHandle<()>>,
    expiry: JoinHandle<()>,
}

impl SessionTasks {
    pub fn stop(&mut self) {
        self.scheduler.stop();
        if let Some(sync) = self.sync.take() {
            sync.abort();
        }
        self.expiry.abort();
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One player session.
pub struct GameEngine {
    config: EngineConfig,
    catalog: Rc<Catalog>,
    clock: Rc<dyn Clock>,
    store: StateStore,
    scheduler: Scheduler,
    bridge: PersistenceBridge,
    rewards: RewardNotifier,
    rng: Rc<RefCell<ChaCha20Rng>>,
    clicking_until: Cell<Option<i64>>,
    load_source: LoadSource,
}

impl GameEngine {
    /// Build a session: validate the inputs, restore the cached state and wire
    /// persistence and rewards to the store. No task is started here.
    ///
    /// # Errors
    ///
    /// Returns an error if the config or the catalog fails validation.
    pub fn new(
        config: EngineConfig,
        catalog: Catalog,
        clock: Rc<dyn Clock>,
        cache: Rc<dyn LocalCache>,
        remote: Rc<dyn RemoteProfileStore>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        catalog.validate()?;

        let bridge = PersistenceBridge::new(
            cache,
            remote,
            LOCAL_CACHE_KEY,
            config.remote_debounce(),
        );
        let loaded = bridge.load();
        let store = StateStore::new(loaded.state);
        bridge.attach(&store);

        let rewards = RewardNotifier::new(config.max_active_rewards, config.reward_lifetime());
        rewards.attach(&store, Rc::clone(&clock));

        let seed = config
            .seed
            .unwrap_or_else(|| timestamp_to_seed(clock.now_ms()));
        let rng = Rc::new(RefCell::new(ChaCha20Rng::seed_from_u64(seed)));
        let catalog = Rc::new(catalog);
        let scheduler = Scheduler::new(
            store.clone(),
            Rc::clone(&catalog),
            Rc::clone(&clock),
            Rc::clone(&rng),
            config.tick_interval(),
            config.special_auto_click_rate,
        );
        log::debug!("engine ready: seed {seed}, state from {:?}", loaded.source);

        Ok(Self {
            config,
            catalog,
            clock,
            store,
            scheduler,
            bridge,
            rewards,
            rng,
            clicking_until: Cell::new(None),
            load_source: loaded.source,
        })
    }

    /// Spawn the scheduler, the remote sync task and reward expiry on the
    /// current `LocalSet`.
    #[must_use]
    pub fn start(&self) -> SessionTasks {
        SessionTasks {
            scheduler: self.scheduler.spawn(),
            sync: self.bridge.spawn_sync(),
            expiry: self.rewards.spawn_expiry(),
        }
    }

    /// Spawn only the remote sync task, for drivers that step the scheduler
    /// themselves. Returns `None` once the task has been started.
    pub fn start_sync(&self) -> Option<JoinHandle<()>> {
        self.bridge.spawn_sync()
    }

    // Player actions

    /// A manual click.
    ///
    /// # Errors
    ///
    /// [`Rejection::DepletedEnergy`] when out of energy.
    pub fn click(&self) -> Result<Rc<GameState>, Rejection> {
        let next = self
            .store
            .apply(TransitionKind::Click { automatic: false }, |state| {
                transitions::click(state, ClickSource::Manual, &mut *self.rng.borrow_mut())
            })?;
        let pulse = i64::try_from(self.config.click_pulse_ms).unwrap_or(i64::MAX);
        self.clicking_until
            .set(Some(self.clock.now_ms().saturating_add(pulse)));
        Ok(next)
    }

    /// # Errors
    ///
    /// Unknown ids and unaffordable purchases are rejected.
    pub fn purchase_upgrade(&self, id: &str) -> Result<Rc<GameState>, Rejection> {
        let now = self.clock.now_ms();
        self.store
            .apply(TransitionKind::PurchaseUpgrade(id.to_string()), |state| {
                transitions::purchase_upgrade(&self.catalog, state, id, now)
            })
    }

    /// # Errors
    ///
    /// Unknown ids and unaffordable purchases are rejected.
    pub fn purchase_passive_unit(&self, id: &str) -> Result<Rc<GameState>, Rejection> {
        self.store
            .apply(TransitionKind::PurchasePassiveUnit(id.to_string()), |state| {
                transitions::purchase_passive_unit(&self.catalog, state, id)
            })
    }

    /// Back to a fresh game. Also clears the local cache and, when signed in,
    /// the remote scalars.
    pub fn reset(&self) -> Rc<GameState> {
        self.clicking_until.set(None);
        match self
            .store
            .apply(TransitionKind::Reset, |_| Ok(transitions::reset()))
        {
            Ok(state) => state,
            Err(_) => self.store.get(),
        }
    }

    // Sessions and sync

    pub async fn sign_in(&self, user_id: &str) -> SignInOutcome {
        self.bridge.sign_in(&self.store, user_id).await
    }

    pub fn sign_out(&self) {
        self.bridge.sign_out();
    }

    /// Push the current scalars to the remote profile now.
    pub async fn flush(&self) {
        self.bridge.flush(&self.store).await;
    }

    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.bridge.identity()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    // Read-only views

    #[must_use]
    pub fn state(&self) -> Rc<GameState> {
        self.store.get()
    }

    /// Active reward events, oldest first.
    #[must_use]
    pub fn rewards(&self) -> Vec<RewardEvent> {
        self.rewards.prune(self.clock.now_ms());
        self.rewards.active()
    }

    /// True for a short pulse after a successful manual click.
    #[must_use]
    pub fn is_clicking(&self) -> bool {
        self.clicking_until
            .get()
            .is_some_and(|until| self.clock.now_ms() < until)
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub const fn load_source(&self) -> &LoadSource {
        &self.load_source
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    #[must_use]
    pub fn upgrade_cost(&self, id: &str) -> Option<f64> {
        self.catalog.upgrade_cost(&self.store.get(), id)
    }

    #[must_use]
    pub fn passive_unit_cost(&self, id: &str) -> Option<f64> {
        self.catalog.passive_unit_cost(&self.store.get(), id)
    }

    #[must_use]
    pub fn can_afford_upgrade(&self, id: &str) -> bool {
        self.catalog.can_afford_upgrade(&self.store.get(), id)
    }

    #[must_use]
    pub fn can_afford_passive_unit(&self, id: &str) -> bool {
        self.catalog.can_afford_passive_unit(&self.store.get(), id)
    }

    #[must_use]
    pub fn dead_points_per_second(&self) -> f64 {
        self.catalog.dead_points_per_second(&self.store.get())
    }

    #[must_use]
    pub fn xp_to_next_level(&self) -> f64 {
        self.store.get().xp_to_next_level()
    }

    /// Time left on a running boost as `HH:MM:SS`.
    #[must_use]
    pub fn boost_remaining(&self, kind: BoostKind) -> Option<String> {
        let now = self.clock.now_ms();
        self.scheduler
            .window(kind)
            .filter(|window| window.is_active_at(now))
            .map(|window| format_remaining(window.ends_at, now))
    }
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}
