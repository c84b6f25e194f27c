use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use super::{SessionListener, SessionStream, SessionSubscription};
use crate::model::session::Session;

struct Inner {
    current: Session,
    listeners: IndexMap<u64, SessionListener>,
    next_id: u64,
}

/// Holds the current [`Session`] and notifies listeners when it is set.
///
/// Every `set` notifies, even when the value is unchanged; consumers are
/// expected to tolerate repeats.
pub struct SessionCell {
    inner: Mutex<Inner>,
}

impl SessionCell {
    pub fn new(initial: Session) -> Self {
        SessionCell {
            inner: Mutex::new(Inner {
                current: initial,
                listeners: IndexMap::new(),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Session {
        self.lock().current.clone()
    }

    pub fn set(&self, session: Session) {
        let listeners: Vec<SessionListener> = {
            let mut inner = self.lock();
            inner.current = session.clone();
            inner.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(session.clone());
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.set(Session::signed_in(user_id));
    }

    pub fn sign_out(&self) {
        self.set(Session::SignedOut);
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new(Session::SignedOut)
    }
}

impl SessionStream for SessionCell {
    fn subscribe(&self, listener: SessionListener) -> SessionSubscription {
        let (subscription, current) = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.listeners.insert(id, listener.clone());
            (SessionSubscription(id), inner.current.clone())
        };
        listener(current);
        subscription
    }

    fn unsubscribe(&self, subscription: SessionSubscription) {
        self.lock().listeners.shift_remove(&subscription.0);
    }
}
