//! Pure state transitions.
//!
//! Every function takes the current state by reference and returns either the
//! next state with the rewards it produced, or a [`Rejection`] explaining why
//! nothing changed. Randomness and time are always supplied by the caller.
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::boost::BoostKind;
use crate::constants::{
    CLICK_MONEY_MAX, CLICK_MONEY_MIN, CLICK_XP_MAX, CLICK_XP_MIN, DEAD_POINT_CHANCE,
    DEAD_POINTS_PER_DROP, ENERGY_PER_CLICK,
};
use crate::economy::{Catalog, Currency};
use crate::state::GameState;

/// Kind of a visible reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewardKind {
    Money,
    DeadPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub kind: RewardKind,
    pub amount: f64,
}

pub type Rewards = SmallVec<[Reward; 2]>;

/// Who triggered a click. Only manual clicks surface rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickSource {
    Manual,
    Automatic,
}

/// Successful transition output.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: GameState,
    pub rewards: Rewards,
}

impl Step {
    fn quiet(mut state: GameState) -> Self {
        state.clamp();
        Self {
            state,
            rewards: SmallVec::new(),
        }
    }
}

/// Expected reasons for a transition to leave the state unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Rejection {
    #[error("not enough {currency}: costs {cost}, have {balance}")]
    InsufficientFunds {
        currency: Currency,
        cost: f64,
        balance: f64,
    },
    #[error("no energy left")]
    DepletedEnergy,
    #[error("unknown upgrade `{0}`")]
    UnknownUpgrade(String),
    #[error("unknown passive unit `{0}`")]
    UnknownPassiveUnit(String),
    #[error("{0} boost is not active")]
    BoostInactive(BoostKind),
    #[error("nothing to change")]
    NoChange,
}

pub type TransitionResult = Result<Step, Rejection>;

/// One click: spends energy, grants money, experience and maybe a dead point.
///
/// The three random draws happen in a fixed order (money, experience, dead
/// point roll) so seeded sessions replay exactly.
///
/// # Errors
///
/// [`Rejection::DepletedEnergy`] when `energy <= 0`.
pub fn click<R>(state: &GameState, source: ClickSource, rng: &mut R) -> TransitionResult
where
    R: Rng + ?Sized,
{
    if state.energy <= 0.0 {
        return Err(Rejection::DepletedEnergy);
    }

    let base_money = rng.gen_range(CLICK_MONEY_MIN..CLICK_MONEY_MAX);
    let base_xp = rng.gen_range(CLICK_XP_MIN..CLICK_XP_MAX);
    let dead_points = if rng.r#gen::<f64>() < DEAD_POINT_CHANCE {
        DEAD_POINTS_PER_DROP
    } else {
        0.0
    };

    let money_gain = base_money * state.click_multiplier * state.lifetime_reward_multiplier;

    let mut next = state.clone();
    next.money += money_gain;
    next.energy -= ENERGY_PER_CLICK;
    next.dead_points += dead_points;
    next.total_clicks = next.total_clicks.saturating_add(1);
    next.gain_experience(base_xp);
    next.clamp();

    let mut rewards = Rewards::new();
    if source == ClickSource::Manual {
        rewards.push(Reward {
            kind: RewardKind::Money,
            amount: money_gain,
        });
        if dead_points > 0.0 {
            rewards.push(Reward {
                kind: RewardKind::DeadPoints,
                amount: dead_points,
            });
        }
    }

    Ok(Step {
        state: next,
        rewards,
    })
}

/// Buy one level of upgrade `id` at `now`.
///
/// # Errors
///
/// [`Rejection::UnknownUpgrade`] for ids missing from the catalog and
/// [`Rejection::InsufficientFunds`] when the balance is below the cost.
pub fn purchase_upgrade(
    catalog: &Catalog,
    state: &GameState,
    id: &str,
    now: i64,
) -> TransitionResult {
    let def = catalog
        .upgrade(id)
        .ok_or_else(|| Rejection::UnknownUpgrade(id.to_string()))?;
    let cost = def.cost_at(state.upgrade_count(id));
    let balance = def.currency.balance(state);
    if balance < cost {
        return Err(Rejection::InsufficientFunds {
            currency: def.currency,
            cost,
            balance,
        });
    }

    let mut next = state.clone();
    *def.currency.balance_mut(&mut next) -= cost;
    next.record_upgrade_purchase(id);
    def.effect.apply(&mut next, now);
    Ok(Step::quiet(next))
}

/// Buy one passive unit `id`, always paid in money.
///
/// # Errors
///
/// [`Rejection::UnknownPassiveUnit`] or [`Rejection::InsufficientFunds`].
pub fn purchase_passive_unit(catalog: &Catalog, state: &GameState, id: &str) -> TransitionResult {
    let def = catalog
        .passive_unit(id)
        .ok_or_else(|| Rejection::UnknownPassiveUnit(id.to_string()))?;
    let cost = def.cost_at(state.passive_unit_count(id));
    if state.money < cost {
        return Err(Rejection::InsufficientFunds {
            currency: Currency::Money,
            cost,
            balance: state.money,
        });
    }

    let mut next = state.clone();
    next.money -= cost;
    next.record_passive_unit_purchase(id);
    Ok(Step::quiet(next))
}

/// One regeneration tick.
///
/// # Errors
///
/// [`Rejection::NoChange`] when energy is already at the ceiling.
pub fn tick_regen(state: &GameState) -> TransitionResult {
    if state.energy >= state.max_energy {
        return Err(Rejection::NoChange);
    }
    let mut next = state.clone();
    next.energy = (next.energy + next.energy_regen_rate).min(next.max_energy);
    Ok(Step::quiet(next))
}

/// Automatic click from the regular auto-click boost.
///
/// # Errors
///
/// [`Rejection::BoostInactive`] outside the window, otherwise whatever
/// [`click`] rejects with.
pub fn tick_auto_click<R>(state: &GameState, now: i64, rng: &mut R) -> TransitionResult
where
    R: Rng + ?Sized,
{
    let active = state
        .auto_click_window()
        .is_some_and(|window| window.is_active_at(now));
    if !active {
        return Err(Rejection::BoostInactive(BoostKind::AutoClick));
    }
    click(state, ClickSource::Automatic, rng)
}

/// Automatic click from the special boost.
///
/// # Errors
///
/// Same as [`tick_auto_click`].
pub fn tick_special_auto_click<R>(state: &GameState, now: i64, rng: &mut R) -> TransitionResult
where
    R: Rng + ?Sized,
{
    let active = state
        .special_auto_click_end_time
        .is_some_and(|ends_at| now < ends_at);
    if !active {
        return Err(Rejection::BoostInactive(BoostKind::Special));
    }
    click(state, ClickSource::Automatic, rng)
}

/// One second of passive income.
///
/// # Errors
///
/// [`Rejection::NoChange`] when the owned units yield nothing.
pub fn tick_passive_income(catalog: &Catalog, state: &GameState) -> TransitionResult {
    let gain = catalog.dead_points_per_second(state);
    if gain <= 0.0 {
        return Err(Rejection::NoChange);
    }
    let mut next = state.clone();
    next.dead_points += gain;
    Ok(Step::quiet(next))
}

/// Clear boosts whose end time has passed.
///
/// # Errors
///
/// [`Rejection::NoChange`] when neither boost has expired.
pub fn sweep_expired_boosts(state: &GameState, now: i64) -> TransitionResult {
    let auto_expired = state.auto_click_end_time.is_some_and(|end| now > end);
    let special_expired = state.special_auto_click_end_time.is_some_and(|end| now > end);
    if !auto_expired && !special_expired {
        return Err(Rejection::NoChange);
    }

    let mut next = state.clone();
    if auto_expired {
        next.auto_click_end_time = None;
        next.auto_click_reward = 0.0;
    }
    if special_expired {
        next.special_auto_click_end_time = None;
        next.has_special_auto_click = false;
    }
    Ok(Step::quiet(next))
}

#[must_use]
pub fn reset() -> Step {
    Step::quiet(GameState::default())
}
