//! Session registry: the table of live sessions.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::TelemetryError;
use crate::telemetry::sessions::session::Session;
use crate::telemetry::types::SessionId;

/// Live sessions keyed by id.
///
/// Injected into the client rather than held in a global; tests build their
/// own or call [`SessionRegistry::reset`].
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Session) {
        let id = session.id();
        let previous = self.sessions.write().insert(id, session);
        if previous.is_some() {
            debug!(session_id = %id, "Replaced registered session handle");
        }
    }

    pub fn unregister(&self, id: SessionId) -> Option<Session> {
        self.sessions.write().remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().get(&id).cloned()
    }

    /// Resolve an explicit id, or the single active session when `id` is `None`.
    ///
    /// Without an id this never guesses: zero active sessions is `NoSession`,
    /// more than one is `AmbiguousSession`.
    pub fn resolve(&self, id: Option<SessionId>) -> Result<Session, TelemetryError> {
        if let Some(id) = id {
            return self
                .get(id)
                .ok_or_else(|| TelemetryError::SessionNotFound(id.to_string()));
        }

        let sessions = self.sessions.read();
        let mut active = sessions.values().filter(|session| session.is_active());
        match (active.next(), active.next()) {
            (None, _) => Err(TelemetryError::NoSession),
            (Some(session), None) => Ok(session.clone()),
            (Some(_), Some(_)) => Err(TelemetryError::AmbiguousSession {
                active: 2 + active.count(),
            }),
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|session| session.is_active())
            .count()
    }

    /// Snapshot of the active sessions, oldest first.
    pub fn all_active(&self) -> Vec<Session> {
        let mut active: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|session| session.start_time());
        active
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Forget every session without ending it. Returns the removed handles.
    pub fn reset(&self) -> Vec<Session> {
        self.sessions.write().drain().map(|(_, session)| session).collect()
    }
}
