//! Drives one engine session, either against a stepped clock or the real
//! timers, and records what happened.
use serde::Serialize;
use skull_game::numbers::u64_to_f64;
use skull_game::{BoostKind, BoostWindow, GameEngine, GameState, ManualClock, SignInOutcome};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};

use crate::policy::{Purchase, Strategy};

/// How a session advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Step a manual clock through game time as fast as possible
    Simulate,
    /// Run the engine's own timers in wall time
    Live,
}

/// Player-side knobs shared by both modes.
#[derive(Debug, Clone, Copy)]
pub struct SessionPlan {
    pub strategy: Strategy,
    pub seconds: u64,
    pub clicks_per_second: u32,
}

impl SessionPlan {
    fn click_period(&self) -> Option<Duration> {
        if !self.strategy.clicks() || self.clicks_per_second == 0 {
            return None;
        }
        Some(Duration::from_secs(1) / self.clicks_per_second)
    }
}

/// Counters collected while a session runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    /// `total_clicks` when the session began.
    pub starting_clicks: u64,
    pub manual_clicks: u64,
    pub rejected_clicks: u64,
    pub purchases: Vec<String>,
}

impl Tally {
    fn starting(engine: &GameEngine) -> Self {
        Self {
            starting_clicks: engine.state().total_clicks,
            ..Self::default()
        }
    }

    fn click(&mut self, engine: &GameEngine) {
        match engine.click() {
            Ok(_) => self.manual_clicks += 1,
            Err(rejection) => {
                log::trace!("click rejected: {rejection}");
                self.rejected_clicks += 1;
            }
        }
    }

    /// Buy until the strategy has nothing left it wants.
    fn shop(&mut self, engine: &GameEngine, strategy: Strategy) {
        while let Some(purchase) = strategy.next_purchase(engine) {
            let result = match &purchase {
                Purchase::Upgrade(id) => engine.purchase_upgrade(id),
                Purchase::PassiveUnit(id) => engine.purchase_passive_unit(id),
            };
            if let Err(rejection) = result {
                log::warn!("{} refused: {rejection}", purchase.id());
                break;
            }
            log::debug!("bought {}", purchase.id());
            self.purchases.push(purchase.id().to_string());
        }
    }
}

/// One finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub seed: u64,
    pub mode: RunMode,
    pub strategy: Strategy,
    pub seconds: u64,
    pub load_source: String,
    pub sign_in: Option<String>,
    pub manual_clicks: u64,
    pub rejected_clicks: u64,
    pub auto_clicks: u64,
    pub purchases: Vec<String>,
    pub dead_points_per_second: f64,
    pub remote_writes: usize,
    pub ended_at_ms: i64,
    pub state: GameState,
}

impl SessionReport {
    #[must_use]
    pub fn capture(
        engine: &GameEngine,
        seed: u64,
        mode: RunMode,
        plan: &SessionPlan,
        tally: Tally,
    ) -> Self {
        let state = (*engine.state()).clone();
        let played = state.total_clicks.saturating_sub(tally.starting_clicks);
        Self {
            seed,
            mode,
            strategy: plan.strategy,
            seconds: plan.seconds,
            load_source: format!("{:?}", engine.load_source()),
            sign_in: None,
            manual_clicks: tally.manual_clicks,
            rejected_clicks: tally.rejected_clicks,
            auto_clicks: played.saturating_sub(tally.manual_clicks),
            purchases: tally.purchases,
            dead_points_per_second: engine.dead_points_per_second(),
            remote_writes: 0,
            ended_at_ms: engine.now_ms(),
            state,
        }
    }

    /// Attach the remote side of the session.
    #[must_use]
    pub fn with_remote(mut self, sign_in: SignInOutcome, remote_writes: usize) -> Self {
        self.sign_in = Some(format!("{sign_in:?}"));
        self.remote_writes = remote_writes;
        self
    }

    /// Clicks of any kind per second of session time.
    #[must_use]
    pub fn clicks_per_second(&self) -> f64 {
        if self.seconds == 0 {
            return 0.0;
        }
        u64_to_f64(self.manual_clicks + self.auto_clicks) / u64_to_f64(self.seconds)
    }
}

fn period_ms(period: Duration) -> i64 {
    i64::try_from(period.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Next firing time of one boost, re-armed whenever its window changes.
#[derive(Debug, Default)]
struct BoostTrack {
    window: Option<BoostWindow>,
    next_at: Option<i64>,
}

impl BoostTrack {
    fn follow(&mut self, window: Option<BoostWindow>, now: i64) {
        if window == self.window {
            return;
        }
        self.window = window;
        self.next_at = window
            .filter(|window| window.is_active_at(now))
            .and_then(|window| window.period())
            .map(|period| now + period_ms(period));
        if let Some(next) = self.next_at {
            log::debug!("boost armed, first click at {next}");
        }
    }

    /// Advance past a fired click. Parks once the window has ended.
    fn advance(&mut self) {
        let Some((window, next)) = self.window.zip(self.next_at) else {
            return;
        };
        let following = window.period().map(|period| next + period_ms(period));
        self.next_at = following.filter(|&at| window.is_active_at(at));
    }
}

/// Step `clock` through `plan.seconds` of game time, firing upkeep, boost
/// clicks and manual clicks in timestamp order. The remote sync task, when
/// running, gets a chance to drain after every upkeep tick.
pub async fn simulate(engine: &GameEngine, clock: &Rc<ManualClock>, plan: &SessionPlan) -> Tally {
    let mut tally = Tally::starting(engine);
    let scheduler = engine.scheduler();
    let tick = period_ms(engine.config().tick_interval());
    let click_every = plan.click_period().map(period_ms);

    let start = engine.now_ms();
    let length = i64::try_from(plan.seconds.saturating_mul(1_000)).unwrap_or(i64::MAX);
    let end = start.saturating_add(length);
    let mut next_upkeep = start + tick;
    let mut next_manual = click_every.map(|every| start + every);
    let mut auto = BoostTrack::default();
    let mut special = BoostTrack::default();

    tally.shop(engine, plan.strategy);

    loop {
        let now = engine.now_ms();
        auto.follow(scheduler.window(BoostKind::AutoClick), now);
        special.follow(scheduler.window(BoostKind::Special), now);

        let next = [Some(next_upkeep), next_manual, auto.next_at, special.next_at]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(end);
        if next > end {
            break;
        }
        clock.set(next);

        if next_upkeep == next {
            scheduler.upkeep();
            tally.shop(engine, plan.strategy);
            next_upkeep += tick;
            tokio::task::yield_now().await;
        }
        if auto.next_at == Some(next) {
            let _ = scheduler.fire_auto_click();
            auto.advance();
        }
        if special.next_at == Some(next) {
            let _ = scheduler.fire_special_auto_click();
            special.advance();
        }
        if let (Some(at), Some(every)) = (next_manual, click_every)
            && at == next
        {
            tally.click(engine);
            next_manual = Some(at + every);
        }
    }

    clock.set(end);
    tally
}

/// Run the real timers for `plan.seconds` of wall time while the player
/// clicks and shops.
pub async fn run_live(engine: &GameEngine, plan: &SessionPlan) -> Tally {
    let mut tally = Tally::starting(engine);
    let _tasks = engine.start();
    let deadline = Instant::now() + Duration::from_secs(plan.seconds);
    let mut clicker = plan.click_period().map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut shop = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            () = sleep_until(deadline) => break,
            _ = shop.tick() => tally.shop(engine, plan.strategy),
            _ = async {
                match clicker.as_mut() {
                    Some(ticker) => ticker.tick().await,
                    None => std::future::pending().await,
                }
            } => tally.click(engine),
        }
    }

    engine.flush().await;
    tally
}
