//! Shared ownership of live sessions.
//!
//! Sessions are not internally synchronized. The registry hands out
//! `Arc<Mutex<S>>` handles so each session is locked on its own while
//! distinct sessions proceed in parallel.

use crate::error::{Error, Result};
use crate::keys::KEY_SIZE_32;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Session identifier: [`Session::id`](crate::session::Session::id) or a
/// group session id.
pub type SessionId = [u8; KEY_SIZE_32];

/// Handle to one session.
pub type SharedSession<S> = Arc<Mutex<S>>;

/// Thread-safe map from session id to session.
///
/// Cloning the registry shares the same map.
///
/// ```
/// use ratchet_session::SessionRegistry;
///
/// let registry: SessionRegistry<u32> = SessionRegistry::new();
/// registry.insert([1u8; 32], 7)?;
/// registry.with_session(&[1u8; 32], |count| {
///     *count += 1;
///     Ok(())
/// })?;
/// assert_eq!(*registry.get(&[1u8; 32])?.unwrap().lock().unwrap(), 8);
/// # Ok::<(), ratchet_session::Error>(())
/// ```
#[derive(Debug)]
pub struct SessionRegistry<S> {
    sessions: Arc<Mutex<HashMap<SessionId, SharedSession<S>>>>,
}

impl<S> SessionRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers `session` under `id`, returning the handle it replaced.
    pub fn insert(&self, id: SessionId, session: S) -> Result<Option<SharedSession<S>>> {
        let mut sessions = self.sessions.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.insert(id, Arc::new(Mutex::new(session))))
    }

    pub fn get(&self, id: &SessionId) -> Result<Option<SharedSession<S>>> {
        let sessions = self.sessions.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.get(id).cloned())
    }

    /// Locks the session for `id` and runs `f` on it.
    ///
    /// Fails with [`Error::InvalidSessionState`] when no session is
    /// registered under `id`.
    pub fn with_session<R>(&self, id: &SessionId, f: impl FnOnce(&mut S) -> Result<R>) -> Result<R> {
        let handle = self.get(id)?.ok_or(Error::InvalidSessionState)?;
        let mut session = handle.lock().map_err(|_| Error::LockPoisoned)?;
        f(&mut session)
    }

    pub fn remove(&self, id: &SessionId) -> Result<Option<SharedSession<S>>> {
        let mut sessions = self.sessions.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.remove(id))
    }

    /// Drops every session whose id is not in `keep`. Returns how many were
    /// removed.
    pub fn remove_all_except(&self, keep: &[SessionId]) -> Result<usize> {
        let mut sessions = self.sessions.lock().map_err(|_| Error::LockPoisoned)?;
        let before = sessions.len();
        sessions.retain(|id, _| keep.contains(id));
        let removed = before - sessions.len();

        debug!(
            target: "ratchet_session::registry",
            removed,
            remaining = sessions.len(),
            "pruned sessions"
        );
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        let sessions = self.sessions.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<S> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
