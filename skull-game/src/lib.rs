//! Skull Clicker Game Engine
//!
//! Platform-agnostic progression engine for the Skull Clicker incremental game:
//! the game state and its transitions, the shop economy, time-driven ticks and
//! boosts, and reconciliation between a local cache and a remote profile.
//! Rendering and authentication live outside this crate.

pub mod boost;
pub mod clock;
pub mod config;
pub mod constants;
pub mod economy;
pub mod engine;
pub mod numbers;
pub mod persistence;
pub mod rewards;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transitions;

// Re-export commonly used types
pub use boost::{BoostKind, BoostPhase, BoostWindow, format_remaining};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{ConfigError, EngineConfig};
pub use economy::{
    Catalog, CatalogError, Currency, PassiveUnitDefinition, UpgradeDefinition, UpgradeEffect,
    UpgradeSection,
};
pub use engine::{EngineError, GameEngine, SessionTasks};
pub use persistence::{
    CacheError, FileCache, LoadSource, LoadedState, LocalCache, MemoryCache, MemoryProfileStore,
    PersistenceBridge, ProfileRecord, RemoteError, RemoteProfileStore, RemoteWrite, SignInOutcome,
};
pub use rewards::{RewardEvent, RewardNotifier};
pub use scheduler::{Scheduler, SchedulerHandle, Upkeep};
pub use state::{GameState, OwnedUnit};
pub use store::{Change, StateStore, SubscriptionId, TransitionKind};
pub use transitions::{
    ClickSource, Rejection, Reward, RewardKind, Rewards, Step, TransitionResult,
};
