//! Centralized balance and tuning constants for Skull Clicker.
//!
//! These values define the deterministic math for the economy. Keeping them
//! together means balance can only change through reviewed code, never
//! through the runtime configuration file.

// Storage keys ---------------------------------------------------------------
pub const LOCAL_CACHE_KEY: &str = "skullClickerState";

// Starting values ------------------------------------------------------------
pub(crate) const START_ENERGY: f64 = 500.0;
pub(crate) const START_MAX_ENERGY: f64 = 500.0;
pub(crate) const START_LEVEL: u32 = 1;
pub(crate) const START_CLICK_MULTIPLIER: f64 = 1.0;
pub(crate) const START_LIFETIME_MULTIPLIER: f64 = 1.0;
pub(crate) const START_ENERGY_REGEN: f64 = 1.0;

// Click rewards --------------------------------------------------------------
pub(crate) const CLICK_MONEY_MIN: f64 = 0.000_01;
pub(crate) const CLICK_MONEY_MAX: f64 = 0.000_5;
pub(crate) const CLICK_XP_MIN: f64 = 1.0;
pub(crate) const CLICK_XP_MAX: f64 = 2.5;
pub(crate) const DEAD_POINT_CHANCE: f64 = 0.1;
pub(crate) const DEAD_POINTS_PER_DROP: f64 = 1.0;
pub(crate) const ENERGY_PER_CLICK: f64 = 1.0;
pub(crate) const XP_PER_LEVEL: f64 = 100.0;

// Cost scaling ---------------------------------------------------------------
pub const UPGRADE_COST_GROWTH: f64 = 1.5;
pub const PASSIVE_UNIT_COST_GROWTH: f64 = 1.8;

// Boosts ---------------------------------------------------------------------
pub const BOOST_DURATION_MS: i64 = 24 * 60 * 60 * 1_000;
pub const SPECIAL_AUTO_CLICK_RATE: u32 = 7;

// Session timing defaults ----------------------------------------------------
pub(crate) const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_REMOTE_DEBOUNCE_MS: u64 = 2_000;
pub(crate) const DEFAULT_REWARD_LIFETIME_MS: u64 = 1_000;
pub(crate) const DEFAULT_CLICK_PULSE_MS: u64 = 150;
pub(crate) const DEFAULT_MAX_ACTIVE_REWARDS: usize = 32;
