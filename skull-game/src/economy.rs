//! Economy model: currencies, the upgrade catalog and the passive-unit catalog.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::constants::{BOOST_DURATION_MS, PASSIVE_UNIT_COST_GROWTH, UPGRADE_COST_GROWTH};
use crate::numbers::{count_to_exponent, u32_to_f64};
use crate::state::GameState;

/// Currency an item is priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Currency {
    Money,
    DeadPoints,
}

impl Currency {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Money => "money",
            Self::DeadPoints => "dead points",
        }
    }

    /// Current balance of this currency in `state`.
    #[must_use]
    pub const fn balance(self, state: &GameState) -> f64 {
        match self {
            Self::Money => state.money,
            Self::DeadPoints => state.dead_points,
        }
    }

    pub(crate) const fn balance_mut(self, state: &mut GameState) -> &mut f64 {
        match self {
            Self::Money => &mut state.money,
            Self::DeadPoints => &mut state.dead_points,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shop grouping for an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UpgradeSection {
    #[default]
    Basic,
    AutoClick,
    Special,
}

/// Fixed effect applied to the state when an upgrade is bought.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UpgradeEffect {
    MultiplyClick { factor: f64 },
    AddMaxEnergy { amount: f64 },
    AutoClick { rate: f64 },
    MultiplyLifetimeReward { factor: f64 },
    MultiplyEnergyRegen { factor: f64 },
    SpecialAutoClick,
}

impl UpgradeEffect {
    /// Apply the effect. Boost effects restart their window at `now`; they
    /// never extend a running one.
    pub fn apply(self, state: &mut GameState, now: i64) {
        match self {
            Self::MultiplyClick { factor } => state.click_multiplier *= factor,
            Self::AddMaxEnergy { amount } => state.max_energy += amount,
            Self::AutoClick { rate } => {
                state.auto_click_reward = rate;
                state.auto_click_end_time = Some(now + BOOST_DURATION_MS);
            }
            Self::MultiplyLifetimeReward { factor } => state.lifetime_reward_multiplier *= factor,
            Self::MultiplyEnergyRegen { factor } => state.energy_regen_rate *= factor,
            Self::SpecialAutoClick => {
                state.has_special_auto_click = true;
                state.special_auto_click_end_time = Some(now + BOOST_DURATION_MS);
            }
        }
    }

    #[must_use]
    pub const fn is_boost(self) -> bool {
        matches!(self, Self::AutoClick { .. } | Self::SpecialAutoClick)
    }
}

/// An upgrade offered in the shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub section: UpgradeSection,
    pub base_cost: f64,
    pub currency: Currency,
    pub effect: UpgradeEffect,
}

impl UpgradeDefinition {
    /// Price of the next purchase after `purchased` earlier ones.
    #[must_use]
    pub fn cost_at(&self, purchased: u32) -> f64 {
        scaled_cost(self.base_cost, UPGRADE_COST_GROWTH, purchased)
    }
}

/// A passive dead-point generator ("miner").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveUnitDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Price of the first unit, always in money.
    pub base_cost: f64,
    /// Dead points produced per second by one unit.
    pub yield_per_second: f64,
}

impl PassiveUnitDefinition {
    #[must_use]
    pub fn cost_at(&self, owned: u32) -> f64 {
        scaled_cost(self.base_cost, PASSIVE_UNIT_COST_GROWTH, owned)
    }
}

/// `base * growth^purchased`.
#[must_use]
pub fn scaled_cost(base: f64, growth: f64, purchased: u32) -> f64 {
    base * growth.powi(count_to_exponent(purchased))
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("duplicate catalog id `{0}`")]
    DuplicateId(String),
    #[error("`{id}` has invalid base cost {cost}")]
    InvalidCost { id: String, cost: f64 },
    #[error("`{id}` has invalid yield {value}")]
    InvalidYield { id: String, value: f64 },
    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable table of everything the player can buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub upgrades: Vec<UpgradeDefinition>,
    #[serde(default)]
    pub passive_units: Vec<PassiveUnitDefinition>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The shipped shop: basic, auto-click and special upgrades plus six miner tiers.
    #[must_use]
    pub fn standard() -> Self {
        let upgrades = vec![
            upgrade(
                "x2click",
                "Click x2",
                "Doubles the money earned per click",
                UpgradeSection::Basic,
                0.50,
                Currency::Money,
                UpgradeEffect::MultiplyClick { factor: 2.0 },
            ),
            upgrade(
                "maxEnergy100",
                "+100 Energy",
                "Raises maximum energy",
                UpgradeSection::Basic,
                0.25,
                Currency::Money,
                UpgradeEffect::AddMaxEnergy { amount: 100.0 },
            ),
            upgrade(
                "maxEnergy250",
                "+250 Energy",
                "Raises maximum energy",
                UpgradeSection::Basic,
                0.75,
                Currency::Money,
                UpgradeEffect::AddMaxEnergy { amount: 250.0 },
            ),
            upgrade(
                "maxEnergy500",
                "+500 Energy",
                "Raises maximum energy",
                UpgradeSection::Basic,
                1.50,
                Currency::Money,
                UpgradeEffect::AddMaxEnergy { amount: 500.0 },
            ),
            auto_click("autoClick1", 1.0, 0.10),
            auto_click("autoClick2", 2.0, 0.25),
            auto_click("autoClick3", 3.0, 0.50),
            auto_click("autoClick6", 6.0, 1.00),
            auto_click("autoClick9", 9.0, 2.00),
            upgrade(
                "x5lifetime",
                "x5 Lifetime",
                "Permanent x5 on every click reward",
                UpgradeSection::Special,
                50.0,
                Currency::DeadPoints,
                UpgradeEffect::MultiplyLifetimeReward { factor: 5.0 },
            ),
            upgrade(
                "fastRegen",
                "Fast Regen",
                "Doubles energy regeneration",
                UpgradeSection::Special,
                30.0,
                Currency::DeadPoints,
                UpgradeEffect::MultiplyEnergyRegen { factor: 2.0 },
            ),
            upgrade(
                "x750click",
                "x750 Click",
                "Massive click multiplier",
                UpgradeSection::Special,
                100.0,
                Currency::DeadPoints,
                UpgradeEffect::MultiplyClick { factor: 750.0 },
            ),
            upgrade(
                "specialAutoClick",
                "Auto x7/s 24h",
                "Special auto-click at 7 clicks per second",
                UpgradeSection::Special,
                75.0,
                Currency::DeadPoints,
                UpgradeEffect::SpecialAutoClick,
            ),
        ];

        let passive_units = vec![
            miner("miner-1", "Rusty Pick", 1.0, 0.000_01),
            miner("miner-2", "Grave Digger", 10.0, 0.000_05),
            miner("miner-3", "Bone Drill", 50.0, 0.000_2),
            miner("miner-4", "Crypt Excavator", 250.0, 0.001),
            miner("miner-5", "Ossuary Rig", 1_000.0, 0.005),
            miner("miner-6", "Necro Foundry", 5_000.0, 0.02),
        ];

        Self {
            upgrades,
            passive_units,
        }
    }

    /// Load and validate a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the catalog fails validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check id uniqueness, cost positivity and yield sanity.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for def in &self.upgrades {
            if !seen.insert(def.id.as_str()) {
                return Err(CatalogError::DuplicateId(def.id.clone()));
            }
            if !def.base_cost.is_finite() || def.base_cost <= 0.0 {
                return Err(CatalogError::InvalidCost {
                    id: def.id.clone(),
                    cost: def.base_cost,
                });
            }
        }
        for def in &self.passive_units {
            if !seen.insert(def.id.as_str()) {
                return Err(CatalogError::DuplicateId(def.id.clone()));
            }
            if !def.base_cost.is_finite() || def.base_cost <= 0.0 {
                return Err(CatalogError::InvalidCost {
                    id: def.id.clone(),
                    cost: def.base_cost,
                });
            }
            if !def.yield_per_second.is_finite() || def.yield_per_second < 0.0 {
                return Err(CatalogError::InvalidYield {
                    id: def.id.clone(),
                    value: def.yield_per_second,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDefinition> {
        self.upgrades.iter().find(|def| def.id == id)
    }

    #[must_use]
    pub fn passive_unit(&self, id: &str) -> Option<&PassiveUnitDefinition> {
        self.passive_units.iter().find(|def| def.id == id)
    }

    /// Upgrades of one shop section, in catalog order.
    pub fn upgrades_in(&self, section: UpgradeSection) -> impl Iterator<Item = &UpgradeDefinition> {
        self.upgrades.iter().filter(move |def| def.section == section)
    }

    /// Price of the next purchase of upgrade `id` for `state`.
    #[must_use]
    pub fn upgrade_cost(&self, state: &GameState, id: &str) -> Option<f64> {
        self.upgrade(id)
            .map(|def| def.cost_at(state.upgrade_count(id)))
    }

    /// Price of the next unit `id` for `state`.
    #[must_use]
    pub fn passive_unit_cost(&self, state: &GameState, id: &str) -> Option<f64> {
        self.passive_unit(id)
            .map(|def| def.cost_at(state.passive_unit_count(id)))
    }

    #[must_use]
    pub fn can_afford_upgrade(&self, state: &GameState, id: &str) -> bool {
        self.upgrade(id).is_some_and(|def| {
            def.currency.balance(state) >= def.cost_at(state.upgrade_count(id))
        })
    }

    #[must_use]
    pub fn can_afford_passive_unit(&self, state: &GameState, id: &str) -> bool {
        self.passive_unit_cost(state, id)
            .is_some_and(|cost| state.money >= cost)
    }

    /// Combined dead-point yield per second of every owned unit. Units missing
    /// from the catalog contribute nothing.
    #[must_use]
    pub fn dead_points_per_second(&self, state: &GameState) -> f64 {
        state
            .passive_units
            .iter()
            .filter_map(|owned| {
                self.passive_unit(&owned.id)
                    .map(|def| def.yield_per_second * u32_to_f64(owned.count))
            })
            .sum()
    }
}

fn upgrade(
    id: &str,
    name: &str,
    description: &str,
    section: UpgradeSection,
    base_cost: f64,
    currency: Currency,
    effect: UpgradeEffect,
) -> UpgradeDefinition {
    UpgradeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        section,
        base_cost,
        currency,
        effect,
    }
}

fn auto_click(id: &str, rate: f64, base_cost: f64) -> UpgradeDefinition {
    upgrade(
        id,
        &format!("Auto x{rate}/s"),
        "24h of automatic clicks",
        UpgradeSection::AutoClick,
        base_cost,
        Currency::Money,
        UpgradeEffect::AutoClick { rate },
    )
}

fn miner(id: &str, name: &str, base_cost: f64, yield_per_second: f64) -> PassiveUnitDefinition {
    PassiveUnitDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("Mines {yield_per_second} dead points per second"),
        base_cost,
        yield_per_second,
    }
}
