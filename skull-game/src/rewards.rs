//! Short-lived "you earned something" events for the presentation layer.
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::numbers::millis_to_duration;
use crate::store::{StateStore, SubscriptionId};
use crate::transitions::RewardKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RewardEvent {
    pub id: u64,
    pub kind: RewardKind,
    pub amount: f64,
    pub created_at_ms: i64,
}

struct NotifierInner {
    events: RefCell<VecDeque<RewardEvent>>,
    next_id: Cell<u64>,
    capacity: usize,
    lifetime: Duration,
    expiry: RefCell<Option<mpsc::UnboundedSender<u64>>>,
}

/// Bounded, self-expiring list of reward events. Holds no game authority.
#[derive(Clone)]
pub struct RewardNotifier {
    inner: Rc<NotifierInner>,
}

impl RewardNotifier {
    #[must_use]
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                events: RefCell::new(VecDeque::with_capacity(capacity)),
                next_id: Cell::new(0),
                capacity: capacity.max(1),
                lifetime,
                expiry: RefCell::new(None),
            }),
        }
    }

    /// Record a reward, dropping the oldest one when full. Returns its id.
    pub fn push(&self, kind: RewardKind, amount: f64, now_ms: i64) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        {
            let mut events = self.inner.events.borrow_mut();
            if events.len() >= self.inner.capacity {
                events.pop_front();
            }
            events.push_back(RewardEvent {
                id,
                kind,
                amount,
                created_at_ms: now_ms,
            });
        }
        if let Some(tx) = self.inner.expiry.borrow().as_ref()
            && tx.send(id).is_err()
        {
            log::debug!("reward expiry task is gone; event {id} waits for prune");
        }
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut events = self.inner.events.borrow_mut();
        let before = events.len();
        events.retain(|event| event.id != id);
        events.len() != before
    }

    /// Drop every event older than the lifetime. Used when time is simulated
    /// and no expiry task runs.
    pub fn prune(&self, now_ms: i64) {
        let lifetime = self.inner.lifetime;
        self.inner
            .events
            .borrow_mut()
            .retain(|event| millis_to_duration(now_ms - event.created_at_ms) < lifetime);
    }

    /// Active events, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<RewardEvent> {
        self.inner.events.borrow().iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.events.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.events.borrow().is_empty()
    }

    /// Mirror the rewards of every store change into this notifier.
    pub fn attach<C>(&self, store: &StateStore, clock: Rc<C>) -> SubscriptionId
    where
        C: Clock + ?Sized + 'static,
    {
        let notifier = self.clone();
        store.subscribe(move |change| {
            if change.rewards.is_empty() {
                return;
            }
            let now = clock.now_ms();
            for reward in &change.rewards {
                notifier.push(reward.kind, reward.amount, now);
            }
        })
    }

    /// Start the expiry task: every pushed event gets its own timer and is
    /// removed by id once the lifetime has passed. Must run inside a
    /// `LocalSet`.
    pub fn spawn_expiry(&self) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        *self.inner.expiry.borrow_mut() = Some(tx);
        let weak: Weak<NotifierInner> = Rc::downgrade(&self.inner);
        let lifetime = self.inner.lifetime;
        tokio::task::spawn_local(async move {
            while let Some(id) = rx.recv().await {
                let weak = weak.clone();
                tokio::task::spawn_local(async move {
                    tokio::time::sleep(lifetime).await;
                    if let Some(inner) = weak.upgrade() {
                        RewardNotifier { inner }.remove(id);
                    }
                });
            }
        })
    }
}

impl std::fmt::Debug for RewardNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardNotifier")
            .field("active", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}
