//! Authenticated identity as seen by the orchestrator.
//!
//! The session store is external; the orchestrator only needs the current
//! user id and a way to be told when it changes. [`IdentitySource`] is the
//! publishing side a host adapter drives.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Opaque authenticated user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Publishes identity changes to the orchestrator.
pub struct IdentitySource {
    tx: watch::Sender<Option<UserId>>,
}

impl IdentitySource {
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn sign_in(&self, user: UserId) {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&user) {
                return false;
            }
            *current = Some(user);
            true
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<UserId> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}

impl Default for IdentitySource {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_notifies_once() {
        let source = IdentitySource::default();
        let mut rx = source.subscribe();

        source.sign_in(UserId::new("alice"));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        source.sign_in(UserId::new("alice"));
        assert!(!rx.has_changed().unwrap());

        source.sign_out();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), None);
    }
}
