//! The single game-state aggregate and its invariants.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{
    START_CLICK_MULTIPLIER, START_ENERGY, START_ENERGY_REGEN, START_LEVEL,
    START_LIFETIME_MULTIPLIER, START_MAX_ENERGY, XP_PER_LEVEL,
};
use crate::numbers::{f64_to_u32_saturating, non_negative, u32_to_f64};

/// Owned stack of one passive unit kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUnit {
    pub id: String,
    pub count: u32,
}

/// Full numeric progress of one player session.
///
/// Serialized in camelCase so the local cache keeps the same record shape
/// across versions (`maxEnergy`, `upgradeCounts`, ...). Every field falls back
/// to its default when missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub money: f64,
    pub energy: f64,
    pub max_energy: f64,
    pub experience: f64,
    pub level: u32,
    pub dead_points: f64,
    pub total_clicks: u64,
    pub click_multiplier: f64,
    pub auto_click_reward: f64,
    /// Epoch milliseconds; `None` while the boost is inactive.
    pub auto_click_end_time: Option<i64>,
    pub energy_regen_rate: f64,
    pub lifetime_reward_multiplier: f64,
    pub has_special_auto_click: bool,
    pub special_auto_click_end_time: Option<i64>,
    pub upgrade_counts: BTreeMap<String, u32>,
    #[serde(alias = "miners")]
    pub passive_units: Vec<OwnedUnit>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            money: 0.0,
            energy: START_ENERGY,
            max_energy: START_MAX_ENERGY,
            experience: 0.0,
            level: START_LEVEL,
            dead_points: 0.0,
            total_clicks: 0,
            click_multiplier: START_CLICK_MULTIPLIER,
            auto_click_reward: 0.0,
            auto_click_end_time: None,
            energy_regen_rate: START_ENERGY_REGEN,
            lifetime_reward_multiplier: START_LIFETIME_MULTIPLIER,
            has_special_auto_click: false,
            special_auto_click_end_time: None,
            upgrade_counts: BTreeMap::new(),
            passive_units: Vec::new(),
        }
    }
}

impl GameState {
    /// Experience needed to leave the current level.
    #[must_use]
    pub fn xp_to_next_level(&self) -> f64 {
        u32_to_f64(self.level) * XP_PER_LEVEL
    }

    /// Fraction of the current level completed, in `[0, 1]`.
    #[must_use]
    pub fn level_progress(&self) -> f64 {
        (self.experience / self.xp_to_next_level()).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn upgrade_count(&self, id: &str) -> u32 {
        self.upgrade_counts.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn passive_unit_count(&self, id: &str) -> u32 {
        self.passive_units
            .iter()
            .find(|unit| unit.id == id)
            .map_or(0, |unit| unit.count)
    }

    pub(crate) fn record_upgrade_purchase(&mut self, id: &str) {
        let count = self.upgrade_counts.entry(id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub(crate) fn record_passive_unit_purchase(&mut self, id: &str) {
        if let Some(unit) = self.passive_units.iter_mut().find(|unit| unit.id == id) {
            unit.count = unit.count.saturating_add(1);
        } else {
            self.passive_units.push(OwnedUnit {
                id: id.to_string(),
                count: 1,
            });
        }
    }

    /// Add experience, promoting while the threshold is met. Returns the
    /// number of levels gained. Levels stop at `u32::MAX`, where experience is
    /// held just under the threshold.
    pub(crate) fn gain_experience(&mut self, xp: f64) -> u32 {
        self.experience += non_negative(xp);
        if !self.experience.is_finite() {
            self.experience = 0.0;
        }
        let start = self.level;

        // Skip ahead in one step; the loop below settles rounding leftovers.
        let skip = self.levels_affordable().saturating_sub(1);
        if skip > 0 {
            self.experience = non_negative(self.experience - self.xp_for_levels(skip));
            self.level += skip;
        }
        while self.level < u32::MAX && self.experience >= self.xp_to_next_level() {
            self.experience -= self.xp_to_next_level();
            self.level += 1;
        }
        if self.experience >= self.xp_to_next_level() {
            self.experience = self.xp_to_next_level().next_down();
        }
        self.level - start
    }

    /// Whole levels the current experience pays for, from the closed form of
    /// `XP_PER_LEVEL * (level + level+1 + ...)`, capped so `level` cannot
    /// overflow.
    fn levels_affordable(&self) -> u32 {
        let b = 2.0 * u32_to_f64(self.level) - 1.0;
        let n = (b.mul_add(b, 8.0 * self.experience / XP_PER_LEVEL).sqrt() - b) / 2.0;
        f64_to_u32_saturating(n).min(u32::MAX - self.level)
    }

    /// Experience needed to climb `levels` levels from the current one.
    fn xp_for_levels(&self, levels: u32) -> f64 {
        let n = u32_to_f64(levels);
        XP_PER_LEVEL * n * (2.0 * u32_to_f64(self.level) + n - 1.0) / 2.0
    }

    /// Re-establish the numeric invariants: non-negative balances and
    /// `energy <= max_energy`. Runs at the end of every transition.
    pub(crate) fn clamp(&mut self) {
        self.money = non_negative(self.money);
        self.dead_points = non_negative(self.dead_points);
        self.experience = non_negative(self.experience);
        self.max_energy = non_negative(self.max_energy);
        self.energy = non_negative(self.energy).min(self.max_energy);
        self.auto_click_reward = non_negative(self.auto_click_reward);
    }

    /// Repair a state that came from outside the engine (cache or remote).
    /// Besides [`clamp`](Self::clamp) this restores the multiplier floors,
    /// drops empty unit stacks, merges duplicate stacks and settles any
    /// pending level-ups.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        self.level = self.level.max(START_LEVEL);
        if !(self.click_multiplier >= START_CLICK_MULTIPLIER) {
            self.click_multiplier = defaults.click_multiplier;
        }
        if !(self.lifetime_reward_multiplier >= START_LIFETIME_MULTIPLIER) {
            self.lifetime_reward_multiplier = defaults.lifetime_reward_multiplier;
        }
        if !(self.energy_regen_rate > 0.0) || !self.energy_regen_rate.is_finite() {
            self.energy_regen_rate = defaults.energy_regen_rate;
        }

        let mut merged: Vec<OwnedUnit> = Vec::with_capacity(self.passive_units.len());
        for unit in self.passive_units.drain(..).filter(|unit| unit.count > 0) {
            if let Some(existing) = merged.iter_mut().find(|m| m.id == unit.id) {
                existing.count = existing.count.saturating_add(unit.count);
            } else {
                merged.push(unit);
            }
        }
        self.passive_units = merged;

        if self.auto_click_end_time.is_none() {
            self.auto_click_reward = 0.0;
        }
        self.has_special_auto_click = self.special_auto_click_end_time.is_some();

        self.clamp();
        self.gain_experience(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_catalog_start() {
        let state = GameState::default();
        assert!((state.energy - 500.0).abs() < f64::EPSILON);
        assert!((state.max_energy - 500.0).abs() < f64::EPSILON);
        assert_eq!(state.level, 1);
        assert!(state.upgrade_counts.is_empty());
        assert!(state.passive_units.is_empty());
        assert!((state.xp_to_next_level() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_level_up_keeps_remainder() {
        let mut state = GameState::default();
        state.experience = 99.0;
        let gained = state.gain_experience(2.5);
        assert_eq!(gained, 1);
        assert_eq!(state.level, 2);
        assert!((state.experience - 1.5).abs() < 1e-12);
    }

    #[test]
    fn overshoot_settles_every_level() {
        let mut state = GameState::default();
        // 100 for level 1, 200 for level 2, 30 left over.
        let gained = state.gain_experience(330.0);
        assert_eq!(gained, 2);
        assert_eq!(state.level, 3);
        assert!((state.experience - 30.0).abs() < 1e-9);
    }

    #[test]
    fn large_grant_matches_stepwise_settling() {
        let mut fast = GameState::default();
        fast.level = 4;
        let gained = fast.gain_experience(1_000_000.0);

        let mut slow = GameState::default();
        slow.level = 4;
        slow.experience = 1_000_000.0;
        while slow.experience >= slow.xp_to_next_level() {
            slow.experience -= slow.xp_to_next_level();
            slow.level += 1;
        }

        assert_eq!(fast.level, slow.level);
        assert_eq!(gained, slow.level - 4);
        assert!((fast.experience - slow.experience).abs() < 1e-6);
    }

    #[test]
    fn absurd_experience_stops_at_the_top_level() {
        let mut state = GameState::default();
        state.experience = 1e30;
        state.sanitize();
        assert_eq!(state.level, u32::MAX);
        assert!(state.experience < state.xp_to_next_level());
        assert!(state.level_progress() < 1.0);

        let gained = state.gain_experience(1e12);
        assert_eq!(gained, 0);
        assert_eq!(state.level, u32::MAX);
        assert!(state.experience < state.xp_to_next_level());
    }

    #[test]
    fn clamp_enforces_ceiling_and_floors() {
        let mut state = GameState::default();
        state.energy = 900.0;
        state.money = -1.0;
        state.dead_points = f64::NAN;
        state.clamp();
        assert!((state.energy - state.max_energy).abs() < f64::EPSILON);
        assert!((state.money - 0.0).abs() < f64::EPSILON);
        assert!((state.dead_points - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sanitize_repairs_foreign_state() {
        let mut state = GameState {
            level: 0,
            click_multiplier: 0.2,
            energy_regen_rate: -4.0,
            special_auto_click_end_time: Some(10),
            passive_units: vec![
                OwnedUnit {
                    id: "miner-1".into(),
                    count: 2,
                },
                OwnedUnit {
                    id: "miner-2".into(),
                    count: 0,
                },
                OwnedUnit {
                    id: "miner-1".into(),
                    count: 3,
                },
            ],
            ..GameState::default()
        };
        state.sanitize();
        assert_eq!(state.level, 1);
        assert!((state.click_multiplier - 1.0).abs() < f64::EPSILON);
        assert!((state.energy_regen_rate - 1.0).abs() < f64::EPSILON);
        assert!(state.has_special_auto_click);
        assert_eq!(
            state.passive_units,
            vec![OwnedUnit {
                id: "miner-1".into(),
                count: 5
            }]
        );
    }

    #[test]
    fn purchase_records_accumulate() {
        let mut state = GameState::default();
        state.record_upgrade_purchase("x2click");
        state.record_upgrade_purchase("x2click");
        state.record_passive_unit_purchase("miner-3");
        state.record_passive_unit_purchase("miner-3");
        assert_eq!(state.upgrade_count("x2click"), 2);
        assert_eq!(state.upgrade_count("fastRegen"), 0);
        assert_eq!(state.passive_unit_count("miner-3"), 2);
        assert_eq!(state.passive_units.len(), 1);
    }

    #[test]
    fn legacy_miners_key_is_accepted() {
        let json = r#"{"money": 3.5, "miners": [{"id": "miner-1", "count": 4}]}"#;
        let state: GameState = serde_json::from_str(json).unwrap();
        assert!((state.money - 3.5).abs() < f64::EPSILON);
        assert_eq!(state.passive_unit_count("miner-1"), 4);
        assert!((state.energy - 500.0).abs() < f64::EPSILON);
    }
}
