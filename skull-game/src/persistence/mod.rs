//! Local cache, remote profile seam and the bridge that syncs them.
mod bridge;
mod cache;
mod remote;

pub use bridge::{PersistenceBridge, SignInOutcome};
pub use cache::{
    CacheError, FileCache, LoadSource, LoadedState, LocalCache, MemoryCache, load_state,
    save_state,
};
pub use remote::{
    MemoryProfileStore, ProfileRecord, RemoteError, RemoteProfileStore, RemoteWrite, merge_remote,
};
