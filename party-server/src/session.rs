//! Session store for party drafts.
//!
//! Drafts only live here, keyed by a random session id. Every call except
//! `create` checks that the caller owns the session; a missing, expired or
//! foreign session all look the same to the caller (`SessionExpired`).
//! Nothing is persisted: a restart drops every draft.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use party_core::{PartyDraft, PartyError, UserId};

/// Idle drafts older than this are reclaimed.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

struct Session {
    draft: PartyDraft,
    last_touched: Instant,
}

/// In-memory draft sessions with an idle TTL.
///
/// Expiry is checked lazily on every access and eagerly by
/// [`SessionStore::sweep_expired`], which the server runs periodically.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.last_touched) >= self.ttl
    }

    /// Store a new draft owned by `draft.owner`.
    pub async fn create(&self, draft: PartyDraft) -> SessionId {
        let id = SessionId::generate();
        let mut sessions = self.sessions.write().await;
        debug!("Created draft session {} for {}", id, draft.owner);
        sessions.insert(
            id.clone(),
            Session {
                draft,
                last_touched: Instant::now(),
            },
        );
        id
    }

    pub async fn get(&self, id: &SessionId, caller: &UserId) -> Result<PartyDraft, PartyError> {
        let mut sessions = self.sessions.write().await;
        let session = self.live_session(&mut sessions, id, caller)?;
        session.last_touched = Instant::now();
        Ok(session.draft.clone())
    }

    /// Apply `mutate` to the caller's draft.
    ///
    /// If `mutate` fails the draft is left exactly as it was.
    pub async fn update<T, F>(
        &self,
        id: &SessionId,
        caller: &UserId,
        mutate: F,
    ) -> Result<(PartyDraft, T), PartyError>
    where
        F: FnOnce(&mut PartyDraft) -> Result<T, PartyError>,
    {
        let mut sessions = self.sessions.write().await;
        let session = self.live_session(&mut sessions, id, caller)?;

        let mut draft = session.draft.clone();
        let output = mutate(&mut draft)?;
        session.draft = draft.clone();
        session.last_touched = Instant::now();
        Ok((draft, output))
    }

    pub async fn delete(&self, id: &SessionId, caller: &UserId) -> Result<(), PartyError> {
        self.take(id, caller).await.map(|_| ())
    }

    /// Remove the caller's draft and hand it back, so that at most one
    /// concurrent finalize can see it.
    pub async fn take(&self, id: &SessionId, caller: &UserId) -> Result<PartyDraft, PartyError> {
        let mut sessions = self.sessions.write().await;
        self.live_session(&mut sessions, id, caller)?;
        sessions
            .remove(id)
            .map(|session| session.draft)
            .ok_or(PartyError::SessionExpired)
    }

    /// Put back a draft removed by [`SessionStore::take`] when the operation
    /// that took it failed.
    pub async fn restore(&self, id: SessionId, draft: PartyDraft) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id,
            Session {
                draft,
                last_touched: Instant::now(),
            },
        );
    }

    /// Drop every session idle for longer than the TTL. Returns how many
    /// were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Look up a session the caller may use, evicting it if it has expired.
    fn live_session<'a>(
        &self,
        sessions: &'a mut HashMap<SessionId, Session>,
        id: &SessionId,
        caller: &UserId,
    ) -> Result<&'a mut Session, PartyError> {
        let now = Instant::now();
        let expired = match sessions.get(id) {
            None => return Err(PartyError::SessionExpired),
            Some(session) => self.is_expired(session, now),
        };
        if expired {
            sessions.remove(id);
            return Err(PartyError::SessionExpired);
        }

        match sessions.get_mut(id) {
            Some(session) if session.draft.owner == *caller => Ok(session),
            _ => Err(PartyError::SessionExpired),
        }
    }
}

/// Periodically evict expired drafts.
pub async fn session_sweep_loop(sessions: Arc<SessionStore>, period: Duration) {
    let mut interval = interval(period);

    loop {
        interval.tick().await;

        let evicted = sessions.sweep_expired().await;
        if evicted > 0 {
            info!("Evicted {} expired draft sessions", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn draft(owner: &str) -> PartyDraft {
        PartyDraft::new(UserId::from(owner), "Ranked night", 4, None, Utc::now()).unwrap()
    }

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_owner_can_read_and_update() {
        let store = store();
        let owner = UserId::from("owner");
        let id = store.create(draft("owner")).await;

        let (updated, _) = store
            .update(&id, &owner, |d| d.add_requirement("Rank", None).map(|_| ()))
            .await
            .unwrap();
        assert_eq!(updated.requirements.len(), 1);
        assert_eq!(store.get(&id, &owner).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_foreign_caller_sees_session_expired() {
        let store = store();
        let id = store.create(draft("owner")).await;
        let intruder = UserId::from("intruder");

        assert_eq!(
            store.get(&id, &intruder).await.unwrap_err(),
            PartyError::SessionExpired
        );
        assert_eq!(
            store
                .update(&id, &intruder, |d| d.add_requirement("x", None).map(|_| ()))
                .await
                .unwrap_err(),
            PartyError::SessionExpired
        );
        assert_eq!(
            store.delete(&id, &intruder).await.unwrap_err(),
            PartyError::SessionExpired
        );
        assert_eq!(
            store.take(&id, &intruder).await.unwrap_err(),
            PartyError::SessionExpired
        );

        // The owner's draft is untouched
        let d = store.get(&id, &UserId::from("owner")).await.unwrap();
        assert!(d.requirements.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = store();
        assert_eq!(
            store
                .get(&SessionId::from("missing"), &UserId::from("u"))
                .await
                .unwrap_err(),
            PartyError::SessionExpired
        );
    }

    #[tokio::test]
    async fn test_failed_update_leaves_draft_unchanged() {
        let store = store();
        let owner = UserId::from("owner");
        let id = store.create(draft("owner")).await;
        store
            .update(&id, &owner, |d| d.add_requirement("Rank", None).map(|_| ()))
            .await
            .unwrap();

        let err = store
            .update(&id, &owner, |d| d.add_requirement("rank", None).map(|_| ()))
            .await
            .unwrap_err();
        assert!(matches!(err, PartyError::Validation(_)));
        assert_eq!(store.get(&id, &owner).await.unwrap().requirements.len(), 1);
    }

    #[tokio::test]
    async fn test_take_removes_session() {
        let store = store();
        let owner = UserId::from("owner");
        let id = store.create(draft("owner")).await;

        store.take(&id, &owner).await.unwrap();
        assert_eq!(
            store.take(&id, &owner).await.unwrap_err(),
            PartyError::SessionExpired
        );

        store.restore(id.clone(), draft("owner")).await;
        assert!(store.get(&id, &owner).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_expires_lazily() {
        let store = store();
        let owner = UserId::from("owner");
        let id = store.create(draft("owner")).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        // Access refreshes the idle timer
        store.get(&id, &owner).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(&id, &owner).await.is_ok());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(
            store.get(&id, &owner).await.unwrap_err(),
            PartyError::SessionExpired
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let store = store();
        store.create(draft("a")).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = store.create(draft("b")).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&fresh, &UserId::from("b")).await.is_ok());
    }
}
