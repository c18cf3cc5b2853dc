//! The state store: one current [`GameState`], replaced atomically by
//! transitions, with synchronous change notification.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::state::GameState;
use crate::transitions::{Rejection, Rewards, TransitionResult};

/// Which transition produced a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    Click { automatic: bool },
    PurchaseUpgrade(String),
    PurchasePassiveUnit(String),
    Regen,
    Sweep,
    PassiveIncome,
    Reset,
    RemoteMerge,
}

impl TransitionKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Click { automatic: false } => "click",
            Self::Click { automatic: true } => "auto-click",
            Self::PurchaseUpgrade(_) => "purchase-upgrade",
            Self::PurchasePassiveUnit(_) => "purchase-passive-unit",
            Self::Regen => "regen",
            Self::Sweep => "sweep",
            Self::PassiveIncome => "passive-income",
            Self::Reset => "reset",
            Self::RemoteMerge => "remote-merge",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PurchaseUpgrade(id) | Self::PurchasePassiveUnit(id) => {
                write!(f, "{}({id})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Notification delivered to subscribers after a successful transition.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: TransitionKind,
    pub state: Rc<GameState>,
    pub rewards: Rewards,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn(&Change)>;

struct StoreInner {
    current: RefCell<Rc<GameState>>,
    revision: Cell<u64>,
    next_subscriber: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Listener)>>,
    /// Changes waiting for delivery, oldest first.
    pending: RefCell<VecDeque<Change>>,
    delivering: Cell<bool>,
}

/// Clears the delivering flag even if a listener panics.
struct DeliveryGuard<'a>(&'a Cell<bool>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Cheaply cloneable handle to the single game state of a session.
#[derive(Clone)]
pub struct StateStore {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("revision", &self.inner.revision.get())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(GameState::default())
    }
}

impl StateStore {
    #[must_use]
    pub fn new(initial: GameState) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                current: RefCell::new(Rc::new(initial)),
                revision: Cell::new(0),
                next_subscriber: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
            }),
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn get(&self) -> Rc<GameState> {
        Rc::clone(&self.inner.current.borrow())
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    /// Run `transition` against the current state and install its result.
    ///
    /// Subscribers run synchronously after the replacement and may apply
    /// further transitions. A nested change is installed at once but only
    /// delivered after every subscriber has seen the change that caused it,
    /// so subscribers always observe changes in revision order.
    ///
    /// # Errors
    ///
    /// Returns the transition's [`Rejection`]; the state is left untouched and
    /// nobody is notified.
    pub fn apply<F>(&self, kind: TransitionKind, transition: F) -> Result<Rc<GameState>, Rejection>
    where
        F: FnOnce(&GameState) -> TransitionResult,
    {
        let current = self.get();
        let step = match transition(&current) {
            Ok(step) => step,
            Err(rejection) => {
                log::trace!("{kind} rejected: {rejection}");
                return Err(rejection);
            }
        };

        let next = Rc::new(step.state);
        *self.inner.current.borrow_mut() = Rc::clone(&next);
        let revision = self.inner.revision.get() + 1;
        self.inner.revision.set(revision);

        let change = Change {
            kind,
            state: Rc::clone(&next),
            rewards: step.rewards,
            revision,
        };
        self.inner.pending.borrow_mut().push_back(change);
        if !self.inner.delivering.replace(true) {
            let _guard = DeliveryGuard(&self.inner.delivering);
            self.deliver_pending();
        }
        Ok(next)
    }

    fn deliver_pending(&self) {
        loop {
            let Some(change) = self.inner.pending.borrow_mut().pop_front() else {
                return;
            };
            let listeners: Vec<Listener> = self
                .inner
                .subscribers
                .borrow()
                .iter()
                .map(|(_, listener)| Rc::clone(listener))
                .collect();
            for listener in listeners {
                listener(&change);
            }
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Change) + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscriber.get());
        self.inner.next_subscriber.set(id.0 + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }
}
