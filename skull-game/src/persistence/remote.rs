//! Remote profile store seam and the scalar profile record it exchanges.
use serde::{Deserialize, Deserializer, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::state::GameState;
use crate::transitions::{Rejection, Step, TransitionResult};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote payload error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keeps explicit `null` apart from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// Server-side profile fields. Every field is optional: absent fields leave
/// the local value alone. End times use a nested option so a `null` can clear
/// a boost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_points: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_clicks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_regen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub auto_click_end_time: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_click_reward: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub special_auto_click_end_time: Option<Option<i64>>,
}

impl ProfileRecord {
    /// Every remote scalar taken from `state`.
    #[must_use]
    pub fn from_state(state: &GameState) -> Self {
        Self {
            money: Some(state.money),
            dead_points: Some(state.dead_points),
            level: Some(state.level),
            experience: Some(state.experience),
            energy: Some(state.energy),
            max_energy: Some(state.max_energy),
            total_clicks: Some(state.total_clicks),
            click_multiplier: Some(state.click_multiplier),
            energy_regen: Some(state.energy_regen_rate),
            auto_click_end_time: Some(state.auto_click_end_time),
            auto_click_reward: Some(state.auto_click_reward),
            special_auto_click_end_time: Some(state.special_auto_click_end_time),
        }
    }

    /// The scalars of a fresh game, sent on reset.
    #[must_use]
    pub fn defaults() -> Self {
        Self::from_state(&GameState::default())
    }

    /// Copy every present field of `other` over this record.
    pub fn absorb(&mut self, other: &Self) {
        fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
            if incoming.is_some() {
                slot.clone_from(incoming);
            }
        }
        take(&mut self.money, &other.money);
        take(&mut self.dead_points, &other.dead_points);
        take(&mut self.level, &other.level);
        take(&mut self.experience, &other.experience);
        take(&mut self.energy, &other.energy);
        take(&mut self.max_energy, &other.max_energy);
        take(&mut self.total_clicks, &other.total_clicks);
        take(&mut self.click_multiplier, &other.click_multiplier);
        take(&mut self.energy_regen, &other.energy_regen);
        take(&mut self.auto_click_end_time, &other.auto_click_end_time);
        take(&mut self.auto_click_reward, &other.auto_click_reward);
        take(
            &mut self.special_auto_click_end_time,
            &other.special_auto_click_end_time,
        );
    }

    /// `local` with this record's scalars laid over it. Upgrade counts,
    /// passive units and the lifetime multiplier are not part of the profile
    /// and stay as they are.
    #[must_use]
    pub fn overlay(&self, local: &GameState) -> GameState {
        let mut next = local.clone();
        if let Some(money) = self.money {
            next.money = money;
        }
        if let Some(dead_points) = self.dead_points {
            next.dead_points = dead_points;
        }
        if let Some(level) = self.level {
            next.level = level;
        }
        if let Some(experience) = self.experience {
            next.experience = experience;
        }
        if let Some(energy) = self.energy {
            next.energy = energy;
        }
        if let Some(max_energy) = self.max_energy {
            next.max_energy = max_energy;
        }
        if let Some(total_clicks) = self.total_clicks {
            next.total_clicks = total_clicks;
        }
        if let Some(click_multiplier) = self.click_multiplier {
            next.click_multiplier = click_multiplier;
        }
        if let Some(energy_regen) = self.energy_regen {
            next.energy_regen_rate = energy_regen;
        }
        if let Some(end) = self.auto_click_end_time {
            next.auto_click_end_time = end;
        }
        if let Some(reward) = self.auto_click_reward {
            next.auto_click_reward = reward;
        }
        if let Some(end) = self.special_auto_click_end_time {
            next.special_auto_click_end_time = end;
        }
        next.sanitize();
        next
    }
}

/// Merge a fetched profile into the local state.
///
/// # Errors
///
/// [`Rejection::NoChange`] when the profile matches the local state already.
pub fn merge_remote(local: &GameState, record: &ProfileRecord) -> TransitionResult {
    let merged = record.overlay(local);
    if merged == *local {
        return Err(Rejection::NoChange);
    }
    if !local.upgrade_counts.is_empty()
        || !local.passive_units.is_empty()
        || local.lifetime_reward_multiplier > 1.0
    {
        log::info!(
            "remote profile merged; kept {} local upgrade counts and {} passive unit stacks",
            local.upgrade_counts.len(),
            local.passive_units.len()
        );
    }
    Ok(Step {
        state: merged,
        rewards: Default::default(),
    })
}

/// Key/value profile service keyed by user id.
#[async_trait::async_trait(?Send)]
pub trait RemoteProfileStore {
    /// Fetch the profile of `user_id`, `None` when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or refuses the call.
    async fn fetch_one(&self, user_id: &str) -> Result<Option<ProfileRecord>, RemoteError>;

    /// Write the present fields of `fields` to the profile of `user_id`,
    /// creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is not accepted.
    async fn update(&self, user_id: &str, fields: &ProfileRecord) -> Result<(), RemoteError>;
}

#[async_trait::async_trait(?Send)]
impl<T: RemoteProfileStore + ?Sized> RemoteProfileStore for Rc<T> {
    async fn fetch_one(&self, user_id: &str) -> Result<Option<ProfileRecord>, RemoteError> {
        (**self).fetch_one(user_id).await
    }

    async fn update(&self, user_id: &str, fields: &ProfileRecord) -> Result<(), RemoteError> {
        (**self).update(user_id, fields).await
    }
}

/// One accepted `update` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub user_id: String,
    pub fields: ProfileRecord,
    pub at: Instant,
}

#[derive(Default)]
struct MemoryProfiles {
    profiles: RefCell<HashMap<String, ProfileRecord>>,
    writes: RefCell<Vec<RemoteWrite>>,
    fetches: Cell<usize>,
    failing: Cell<bool>,
    fetch_delay: Cell<Duration>,
}

/// In-process profile store with a write log and switchable failures.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: Rc<MemoryProfiles>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, record: ProfileRecord) {
        self.inner
            .profiles
            .borrow_mut()
            .insert(user_id.to_string(), record);
    }

    #[must_use]
    pub fn profile(&self, user_id: &str) -> Option<ProfileRecord> {
        self.inner.profiles.borrow().get(user_id).cloned()
    }

    /// Make every call fail with [`RemoteError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.set(failing);
    }

    /// Hold every `fetch_one` for `delay` before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.inner.fetch_delay.set(delay);
    }

    #[must_use]
    pub fn writes(&self) -> Vec<RemoteWrite> {
        self.inner.writes.borrow().clone()
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.get()
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.inner.failing.get() {
            Err(RemoteError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for MemoryProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProfileStore")
            .field("profiles", &self.inner.profiles.borrow().len())
            .field("writes", &self.inner.writes.borrow().len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait(?Send)]
impl RemoteProfileStore for MemoryProfileStore {
    async fn fetch_one(&self, user_id: &str) -> Result<Option<ProfileRecord>, RemoteError> {
        self.inner.fetches.set(self.inner.fetches.get() + 1);
        let delay = self.inner.fetch_delay.get();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        Ok(self.profile(user_id))
    }

    async fn update(&self, user_id: &str, fields: &ProfileRecord) -> Result<(), RemoteError> {
        self.check()?;
        self.inner
            .profiles
            .borrow_mut()
            .entry(user_id.to_string())
            .or_default()
            .absorb(fields);
        self.inner.writes.borrow_mut().push(RemoteWrite {
            user_id: user_id.to_string(),
            fields: fields.clone(),
            at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::field_reassign_with_default)]

    use super::*;

    #[test]
    fn absent_and_null_end_times_differ() {
        let absent: ProfileRecord = serde_json::from_str(r#"{"money": 2.0}"#).unwrap();
        assert_eq!(absent.auto_click_end_time, None);
        let cleared: ProfileRecord =
            serde_json::from_str(r#"{"auto_click_end_time": null}"#).unwrap();
        assert_eq!(cleared.auto_click_end_time, Some(None));
        let json = serde_json::to_string(&ProfileRecord::defaults()).unwrap();
        assert!(json.contains("\"special_auto_click_end_time\":null"));
        assert!(json.contains("\"energy_regen\":1.0"));
    }

    #[test]
    fn overlay_keeps_local_only_fields() {
        let mut local = GameState::default();
        local.money = 1.0;
        local.lifetime_reward_multiplier = 5.0;
        local.upgrade_counts.insert("x5lifetime".into(), 1);
        local.record_passive_unit_purchase("miner-2");

        let record = ProfileRecord {
            money: Some(40.0),
            level: Some(4),
            special_auto_click_end_time: Some(Some(9_000)),
            ..ProfileRecord::default()
        };
        let merged = merge_remote(&local, &record).unwrap().state;
        assert!((merged.money - 40.0).abs() < f64::EPSILON);
        assert_eq!(merged.level, 4);
        assert!(merged.has_special_auto_click);
        assert!((merged.lifetime_reward_multiplier - 5.0).abs() < f64::EPSILON);
        assert_eq!(merged.upgrade_count("x5lifetime"), 1);
        assert_eq!(merged.passive_unit_count("miner-2"), 1);
        assert!((merged.energy - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_profile_is_no_change() {
        let local = GameState::default();
        assert_eq!(
            merge_remote(&local, &ProfileRecord::defaults()),
            Err(Rejection::NoChange)
        );
    }

    #[tokio::test]
    async fn memory_store_merges_partial_updates() {
        let store = MemoryProfileStore::new();
        assert!(store.fetch_one("ana").await.unwrap().is_none());
        store.update("ana", &ProfileRecord::defaults()).await.unwrap();
        store
            .update(
                "ana",
                &ProfileRecord {
                    money: Some(3.0),
                    ..ProfileRecord::default()
                },
            )
            .await
            .unwrap();
        let stored = store.fetch_one("ana").await.unwrap().unwrap();
        assert_eq!(stored.money, Some(3.0));
        assert_eq!(stored.level, Some(1));
        assert_eq!(store.writes().len(), 2);
        assert_eq!(store.fetch_count(), 2);

        store.set_failing(true);
        assert!(matches!(
            store.fetch_one("ana").await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(store.update("ana", &ProfileRecord::default()).await.is_err());
        assert_eq!(store.writes().len(), 2);
    }
}
