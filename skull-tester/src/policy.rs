use clap::ValueEnum;
use serde::Serialize;
use skull_game::{BoostKind, Currency, GameEngine, UpgradeEffect};
use std::fmt;

/// A purchase the policy wants to make next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purchase {
    Upgrade(String),
    PassiveUnit(String),
}

impl Purchase {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Upgrade(id) | Self::PassiveUnit(id) => id,
        }
    }
}

/// Built-in player behaviours for automated sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Never clicks or buys; only timers act.
    Idle,
    /// Clicks at the configured rate, never buys.
    Clicker,
    /// Clicks and spends everything it can.
    Shopper,
}

impl Strategy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Clicker => "Clicker",
            Self::Shopper => "Shopper",
        }
    }

    #[must_use]
    pub const fn clicks(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Next purchase for this strategy, if any is affordable.
    #[must_use]
    pub fn next_purchase(self, engine: &GameEngine) -> Option<Purchase> {
        match self {
            Self::Idle | Self::Clicker => None,
            Self::Shopper => cheapest_useful(engine),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cheapest affordable upgrade or unit. Boosts that are still running are
/// skipped.
fn cheapest_useful(engine: &GameEngine) -> Option<Purchase> {
    let catalog = engine.catalog();
    let auto_running = engine.boost_remaining(BoostKind::AutoClick).is_some();
    let special_running = engine.boost_remaining(BoostKind::Special).is_some();

    let upgrades = catalog
        .upgrades
        .iter()
        .filter(|def| match def.effect {
            UpgradeEffect::AutoClick { .. } => !auto_running,
            UpgradeEffect::SpecialAutoClick => !special_running,
            _ => true,
        })
        .filter(|def| engine.can_afford_upgrade(&def.id))
        .filter_map(|def| {
            let cost = engine.upgrade_cost(&def.id)?;
            let weight = match def.currency {
                Currency::Money => cost,
                // Ranked after every money item.
                Currency::DeadPoints => f64::MAX,
            };
            Some((weight, Purchase::Upgrade(def.id.clone())))
        });

    let units = catalog
        .passive_units
        .iter()
        .filter(|def| engine.can_afford_passive_unit(&def.id))
        .filter_map(|def| {
            let cost = engine.passive_unit_cost(&def.id)?;
            Some((cost, Purchase::PassiveUnit(def.id.clone())))
        });

    upgrades
        .chain(units)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, purchase)| purchase)
}
