//! Keeps the store, the local cache and the remote profile in step.
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use super::cache::{CacheError, LocalCache, LoadedState, load_state, save_state};
use super::remote::{ProfileRecord, RemoteProfileStore, merge_remote};
use crate::state::GameState;
use crate::store::{Change, StateStore, SubscriptionId, TransitionKind};
use crate::transitions::Rejection;

/// Messages for the remote sync task.
#[derive(Debug)]
enum Outbound {
    /// Latest snapshot; written once the debounce window passes quietly.
    Debounced { user: String, record: ProfileRecord },
    /// Written right away, replacing anything pending.
    Immediate { user: String, record: ProfileRecord },
    /// Forget the pending snapshot.
    Cancel,
}

/// Result of [`PersistenceBridge::sign_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    /// The remote profile was laid over the local state.
    Merged,
    /// The remote profile already matched.
    Unchanged,
    /// No profile existed; the local scalars were pushed to create it.
    Seeded,
    /// The remote store failed; play continues on local state.
    Offline,
    /// Signed out, or signed in as someone else, before the profile arrived.
    Abandoned,
}

struct BridgeInner {
    cache: Rc<dyn LocalCache>,
    remote: Rc<dyn RemoteProfileStore>,
    key: String,
    debounce: Duration,
    identity: RefCell<Option<String>>,
    /// User whose profile fetch is in flight. Remote writes stay off until
    /// it resolves.
    signing_in: RefCell<Option<String>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: RefCell<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl BridgeInner {
    fn send(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            log::debug!("remote sync task has stopped; dropping outbound write");
        }
    }

    fn on_change(&self, change: &Change) {
        if change.kind == TransitionKind::Reset {
            self.on_reset();
            return;
        }
        if let Err(err) = save_state(self.cache.as_ref(), &self.key, &change.state) {
            log::warn!("local cache write failed after {}: {err}", change.kind);
        }
        if let Some(user) = self.identity.borrow().clone() {
            self.send(Outbound::Debounced {
                user,
                record: ProfileRecord::from_state(&change.state),
            });
        }
    }

    fn on_reset(&self) {
        if let Err(err) = self.cache.remove(&self.key) {
            log::warn!("failed to clear local cache on reset: {err}");
        }
        if let Some(user) = self.identity.borrow().clone() {
            self.send(Outbound::Immediate {
                user,
                record: ProfileRecord::defaults(),
            });
        }
    }
}

/// Store subscriber that mirrors every change to the local cache and,
/// once signed in, to the remote profile through a debounced sync task.
#[derive(Clone)]
pub struct PersistenceBridge {
    inner: Rc<BridgeInner>,
}

impl PersistenceBridge {
    pub fn new(
        cache: Rc<dyn LocalCache>,
        remote: Rc<dyn RemoteProfileStore>,
        key: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let (outbound, inbound) = mpsc::unbounded_channel();
        Self {
            inner: Rc::new(BridgeInner {
                cache,
                remote,
                key: key.into(),
                debounce,
                identity: RefCell::new(None),
                signing_in: RefCell::new(None),
                outbound,
                inbound: RefCell::new(Some(inbound)),
            }),
        }
    }

    /// Startup state from the local cache.
    #[must_use]
    pub fn load(&self) -> LoadedState {
        load_state(self.inner.cache.as_ref(), &self.inner.key)
    }

    /// Write `state` to the local cache now.
    ///
    /// # Errors
    ///
    /// Returns the cache failure.
    pub fn save(&self, state: &GameState) -> Result<(), CacheError> {
        save_state(self.inner.cache.as_ref(), &self.inner.key, state)
    }

    /// Subscribe to `store` so every change is persisted.
    pub fn attach(&self, store: &StateStore) -> SubscriptionId {
        let inner = Rc::clone(&self.inner);
        store.subscribe(move |change| inner.on_change(change))
    }

    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.inner.identity.borrow().clone()
    }

    /// Resolve an identity and reconcile with its remote profile.
    ///
    /// The identity only takes effect once the fetch resolves, so changes made
    /// while it is in flight never reach the remote ahead of the merge.
    pub async fn sign_in(&self, store: &StateStore, user_id: &str) -> SignInOutcome {
        self.inner.send(Outbound::Cancel);
        *self.inner.identity.borrow_mut() = None;
        *self.inner.signing_in.borrow_mut() = Some(user_id.to_string());

        let fetched = self.inner.remote.fetch_one(user_id).await;
        if self.inner.signing_in.borrow().as_deref() != Some(user_id) {
            log::info!("sign-in for {user_id} was abandoned before the profile arrived");
            return SignInOutcome::Abandoned;
        }
        *self.inner.signing_in.borrow_mut() = None;
        *self.inner.identity.borrow_mut() = Some(user_id.to_string());
        log::info!("signed in as {user_id}");

        match fetched {
            Ok(Some(record)) => {
                match store.apply(TransitionKind::RemoteMerge, |state| {
                    merge_remote(state, &record)
                }) {
                    Ok(_) => {
                        log::info!("remote profile for {user_id} merged into local state");
                        SignInOutcome::Merged
                    }
                    Err(Rejection::NoChange) => SignInOutcome::Unchanged,
                    Err(rejection) => {
                        log::warn!("remote merge rejected: {rejection}");
                        SignInOutcome::Unchanged
                    }
                }
            }
            Ok(None) => {
                let record = ProfileRecord::from_state(&store.get());
                self.inner.send(Outbound::Cancel);
                match self.inner.remote.update(user_id, &record).await {
                    Ok(()) => {
                        log::info!("seeded remote profile for {user_id}");
                        SignInOutcome::Seeded
                    }
                    Err(err) => {
                        log::warn!("failed to seed remote profile for {user_id}: {err}");
                        SignInOutcome::Offline
                    }
                }
            }
            Err(err) => {
                log::warn!("remote profile fetch for {user_id} failed: {err}");
                SignInOutcome::Offline
            }
        }
    }

    /// Drop the identity and any write still waiting for the debounce.
    pub fn sign_out(&self) {
        if let Some(user) = self.inner.signing_in.borrow_mut().take() {
            log::info!("abandoned sign-in for {user}");
        }
        if let Some(user) = self.inner.identity.borrow_mut().take() {
            log::info!("signed out {user}");
        }
        self.inner.send(Outbound::Cancel);
    }

    /// Write the current scalars to the remote profile immediately, bypassing
    /// the debounce. Does nothing without an identity.
    pub async fn flush(&self, store: &StateStore) {
        let Some(user) = self.identity() else {
            return;
        };
        self.inner.send(Outbound::Cancel);
        let record = ProfileRecord::from_state(&store.get());
        match self.inner.remote.update(&user, &record).await {
            Ok(()) => log::debug!("flushed remote profile for {user}"),
            Err(err) => log::warn!("remote flush for {user} failed: {err}"),
        }
    }

    /// Start the remote sync task. Returns `None` if it already runs. Must be
    /// called inside a `LocalSet`.
    pub fn spawn_sync(&self) -> Option<JoinHandle<()>> {
        let inbound = self.inner.inbound.borrow_mut().take()?;
        let remote = Rc::clone(&self.inner.remote);
        let debounce = self.inner.debounce;
        Some(tokio::task::spawn_local(run_sync(inbound, remote, debounce)))
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("key", &self.inner.key)
            .field("identity", &self.inner.identity.borrow())
            .finish_non_exhaustive()
    }
}

async fn write_remote(remote: &dyn RemoteProfileStore, user: &str, record: &ProfileRecord) {
    match remote.update(user, record).await {
        Ok(()) => log::debug!("remote profile for {user} synced"),
        Err(err) => log::warn!("remote sync for {user} failed: {err}"),
    }
}

/// Coalescing loop: every debounced message restarts the quiet window and
/// only the newest snapshot is written when it elapses.
async fn run_sync(
    mut inbound: mpsc::UnboundedReceiver<Outbound>,
    remote: Rc<dyn RemoteProfileStore>,
    debounce: Duration,
) {
    let mut pending: Option<(String, ProfileRecord)> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let message = match deadline {
            Some(at) => {
                tokio::select! {
                    message = inbound.recv() => message,
                    () = sleep_until(at) => {
                        deadline = None;
                        if let Some((user, record)) = pending.take() {
                            write_remote(remote.as_ref(), &user, &record).await;
                        }
                        continue;
                    }
                }
            }
            None => inbound.recv().await,
        };

        match message {
            Some(Outbound::Debounced { user, record }) => {
                pending = Some((user, record));
                deadline = Some(Instant::now() + debounce);
            }
            Some(Outbound::Immediate { user, record }) => {
                pending = None;
                deadline = None;
                write_remote(remote.as_ref(), &user, &record).await;
            }
            Some(Outbound::Cancel) => {
                pending = None;
                deadline = None;
            }
            None => break,
        }
    }
}
