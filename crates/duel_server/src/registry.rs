//! Concurrent registry of live game sessions.

use crate::error::SessionError;
use crate::ids::{ConnectionId, SessionId};
use crate::session::GameSession;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Default length of generated session identifiers.
pub const DEFAULT_ID_LEN: usize = 5;

/// Identifier draws attempted before `create` gives up.
const MAX_ID_ATTEMPTS: usize = 64;

/// Shared, lockable handle to one session.
///
/// The mutex serializes every transition of that session; unrelated
/// sessions never contend on it.
pub type SessionHandle = Arc<Mutex<GameSession>>;

/// Maps session identifiers to sessions.
///
/// Cloning is cheap and every clone sees the same sessions. Map operations
/// are sharded, so create/lookup/delete on different sessions do not
/// serialize against each other.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    id_len: usize,
}

impl SessionRegistry {
    /// Creates an empty registry with default identifier length.
    #[instrument]
    pub fn new() -> Self {
        Self::with_id_len(DEFAULT_ID_LEN)
    }

    /// Creates an empty registry generating identifiers of `id_len` chars.
    #[instrument]
    pub fn with_id_len(id_len: usize) -> Self {
        info!(id_len, "Creating session registry");
        Self {
            sessions: Arc::new(DashMap::new()),
            id_len: id_len.max(1),
        }
    }

    /// Creates a waiting session with `creator` seated as `X`.
    ///
    /// Identifiers are drawn until a free one is found; the vacancy check
    /// and the insert happen under the same shard lock.
    ///
    /// # Errors
    ///
    /// `ResourceExhausted` if no free identifier turned up.
    #[instrument(skip(self))]
    pub fn create(
        &self,
        creator: ConnectionId,
    ) -> Result<(SessionId, SessionHandle), SessionError> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = SessionId::generate(self.id_len);
            match self.sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!(session_id = %id, attempt, "Identifier collision, retrying");
                }
                Entry::Vacant(slot) => {
                    let handle = Arc::new(Mutex::new(GameSession::with_creator(
                        id.clone(),
                        creator,
                    )));
                    slot.insert(Arc::clone(&handle));
                    info!(session_id = %id, "Created session");
                    return Ok((id, handle));
                }
            }
        }

        error!(
            attempts = MAX_ID_ATTEMPTS,
            sessions = self.sessions.len(),
            "Session identifier space exhausted"
        );
        Err(SessionError::ResourceExhausted)
    }

    /// Looks up a session.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        let handle = self.sessions.get(id).map(|entry| Arc::clone(entry.value()));
        if handle.is_none() {
            debug!(session_id = %id, "Session not found");
        }
        handle
    }

    /// Removes a session. No-op if it is already gone.
    ///
    /// The removed session is marked closed so that handlers still holding
    /// its handle stop mutating it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &SessionId) {
        if let Some((_, handle)) = self.sessions.remove(id) {
            handle.lock().await.close();
            info!(session_id = %id, "Deleted session");
        }
    }

    /// Removes a session whose lock the caller already holds.
    pub(crate) fn delete_locked(&self, session: &mut GameSession) {
        if self.sessions.remove(session.id()).is_some() {
            info!(session_id = %session.id(), "Deleted session");
        }
        session.close();
    }

    /// Identifiers of sessions with exactly one ever-joined participant.
    pub async fn single_participant_sessions(&self) -> Vec<SessionId> {
        let mut ids = Vec::new();
        for (id, handle) in self.snapshot() {
            if handle.lock().await.participant_count() == 1 {
                ids.push(id);
            }
        }
        ids
    }

    /// Identifiers of sessions with no connected participant left.
    pub async fn orphaned_sessions(&self) -> Vec<SessionId> {
        let mut ids = Vec::new();
        for (id, handle) in self.snapshot() {
            if handle.lock().await.subscribers().is_empty() {
                ids.push(id);
            }
        }
        ids
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // Copies the entries out so no shard guard is held across an await.
    fn snapshot(&self) -> Vec<(SessionId, SessionHandle)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
