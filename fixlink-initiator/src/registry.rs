/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session registry.
//!
//! The registry owns one [`SessionEntry`] per configured session. Supervisors
//! change a session's connection state only through
//! [`SessionRegistry::update_state`]; callers on any thread read the same
//! state through a lock-free snapshot of the entry list.

use arc_swap::ArcSwap;
use fixlink_core::error::{ConfigError, RuntimeError};
use fixlink_core::types::SessionId;
use fixlink_session::handle::SessionHandle;
use fixlink_session::state::{AtomicConnectionState, ConnectionState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Everything the initiator tracks for one session.
pub struct SessionEntry {
    session_id: SessionId,
    state: AtomicConnectionState,
    connect_attempts: AtomicU64,
    last_error: Mutex<Option<String>>,
    handle: tokio::sync::Mutex<Box<dyn SessionHandle>>,
}

impl SessionEntry {
    fn new(session_id: SessionId, handle: Box<dyn SessionHandle>) -> Self {
        Self {
            session_id,
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            connect_attempts: AtomicU64::new(0),
            last_error: Mutex::new(None),
            handle: tokio::sync::Mutex::new(handle),
        }
    }

    /// Returns the session identity.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Returns how many connect attempts were made.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Returns the reason the most recent connection ended, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Returns the session handle. Held by the supervisor while it drives a
    /// connection.
    pub(crate) const fn handle(&self) -> &tokio::sync::Mutex<Box<dyn SessionHandle>> {
        &self.handle
    }

    /// Counts a connect attempt, returning its 1-based number.
    pub(crate) fn record_attempt(&self) -> u64 {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_error(&self, error: String) {
        *self.last_error.lock() = Some(error);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state(),
            connect_attempts: self.connect_attempts(),
            last_error: self.last_error(),
        }
    }
}

impl fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("connect_attempts", &self.connect_attempts())
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session identity.
    pub session_id: SessionId,
    /// Connection state when the snapshot was taken.
    pub state: ConnectionState,
    /// Connect attempts so far.
    pub connect_attempts: u64,
    /// Why the most recent connection ended.
    pub last_error: Option<String>,
}

/// Registry of sessions in configuration order.
///
/// `by_id` serves lookups and serializes registration. `order` is republished
/// on every registration so aggregate reads never take a lock.
#[derive(Default)]
pub struct SessionRegistry {
    by_id: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
    order: ArcSwap<Vec<Arc<SessionEntry>>>,
    fault: Mutex<Option<RuntimeError>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session in the `Disconnected` state.
    ///
    /// # Errors
    /// Returns `ConfigError::DuplicateSession` if the identity is already
    /// registered.
    pub(crate) fn put(
        &self,
        session_id: SessionId,
        handle: Box<dyn SessionHandle>,
    ) -> Result<Arc<SessionEntry>, ConfigError> {
        let mut by_id = self.by_id.write();
        if by_id.contains_key(&session_id) {
            return Err(ConfigError::DuplicateSession {
                session: session_id,
            });
        }
        let entry = Arc::new(SessionEntry::new(session_id.clone(), handle));
        by_id.insert(session_id, Arc::clone(&entry));

        let mut order = Vec::clone(&self.order.load());
        order.push(Arc::clone(&entry));
        self.order.store(Arc::new(order));
        Ok(entry)
    }

    /// Looks up a session.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.by_id.read().get(session_id).cloned()
    }

    /// Returns every entry in configuration order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<SessionEntry>> {
        Vec::clone(&self.order.load())
    }

    /// Moves a session to `next`, enforcing the allowed transitions.
    ///
    /// A rejected transition is also kept as the registry's fault so the
    /// driving call can surface it.
    ///
    /// # Errors
    /// Returns `RuntimeError::UnknownSession` or
    /// `RuntimeError::InvalidTransition`.
    pub fn update_state(
        &self,
        session_id: &SessionId,
        next: ConnectionState,
    ) -> Result<ConnectionState, RuntimeError> {
        let Some(entry) = self.get(session_id) else {
            return Err(self.fail(RuntimeError::UnknownSession {
                session: session_id.clone(),
            }));
        };
        entry.state.transition(next).map_err(|current| {
            self.fail(RuntimeError::InvalidTransition {
                session: session_id.clone(),
                from: current.to_string(),
                to: next.to_string(),
            })
        })
    }

    /// Returns the state of one session.
    #[must_use]
    pub fn state(&self, session_id: &SessionId) -> Option<ConnectionState> {
        self.get(session_id).map(|entry| entry.state())
    }

    /// Returns a snapshot of every session in configuration order.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<SessionSnapshot> {
        self.order
            .load()
            .iter()
            .map(|entry| entry.snapshot())
            .collect()
    }

    /// Returns the identities of all sessions in configuration order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.order
            .load()
            .iter()
            .map(|entry| entry.session_id.clone())
            .collect()
    }

    /// Returns true if any session is logged on. Lock-free.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.order
            .load()
            .iter()
            .any(|entry| entry.state().is_logged_on())
    }

    /// Returns true if the given session is logged on. Lock-free.
    #[must_use]
    pub fn is_session_logged_on(&self, session_id: &SessionId) -> bool {
        self.order
            .load()
            .iter()
            .find(|entry| entry.session_id == *session_id)
            .is_some_and(|entry| entry.state().is_logged_on())
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.load().len()
    }

    /// Returns true if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.load().is_empty()
    }

    /// Records a fault unless one is already pending.
    pub(crate) fn fail(&self, error: RuntimeError) -> RuntimeError {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(error.clone());
        }
        error
    }

    /// Takes the pending fault, if any.
    pub(crate) fn take_fault(&self) -> Option<RuntimeError> {
        self.fault.lock().take()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}
