//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

/// Session identifier of a management client. Zero is reserved for
/// "unlocked" and for transactions originated by the system itself.
pub type SessionId = u32;

/// Advisory per-datastore locks, keyed by datastore name and held by a
/// single client session at a time.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: HashMap<String, SessionId>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum LockError {
    // The datastore is already locked by the given session.
    Denied(SessionId),
    // The session doesn't hold the lock it tried to release.
    NotHeld,
}

// ===== impl LockRegistry =====

impl LockRegistry {
    pub fn lock(
        &mut self,
        name: &str,
        session: SessionId,
    ) -> Result<(), LockError> {
        match self.locks.get(name) {
            Some(&holder) if holder != session => {
                Err(LockError::Denied(holder))
            }
            _ => {
                self.locks.insert(name.to_owned(), session);
                Ok(())
            }
        }
    }

    pub fn unlock(
        &mut self,
        name: &str,
        session: SessionId,
    ) -> Result<(), LockError> {
        match self.locks.get(name) {
            Some(&holder) if holder == session => {
                self.locks.remove(name);
                Ok(())
            }
            Some(&holder) => Err(LockError::Denied(holder)),
            None => Err(LockError::NotHeld),
        }
    }

    /// Returns the session holding the lock, or zero when unlocked.
    pub fn holder(&self, name: &str) -> SessionId {
        self.locks.get(name).copied().unwrap_or(0)
    }

    /// Returns the holding session when the datastore is locked by a
    /// session other than the given one.
    pub fn locked_by_other(
        &self,
        name: &str,
        session: SessionId,
    ) -> Option<SessionId> {
        match self.locks.get(name) {
            Some(&holder) if holder != session => Some(holder),
            _ => None,
        }
    }

    /// Releases every lock held by a session, returning the names of the
    /// datastores that were unlocked.
    pub fn release_session(&mut self, session: SessionId) -> Vec<String> {
        let released = self
            .locks
            .iter()
            .filter(|&(_, &holder)| holder == session)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        for name in &released {
            self.locks.remove(name);
        }
        released
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Denied(holder) => {
                write!(f, "lock is held by session {holder}")
            }
            LockError::NotHeld => write!(f, "lock is not held"),
        }
    }
}

impl std::error::Error for LockError {}
