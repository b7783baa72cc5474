//! Party and application engines.
//!
//! `PartyService` is the boundary the interaction surface calls. Every
//! mutating operation follows the same loop:
//!
//! 1. take the party's in-process lock
//! 2. read the latest stored record
//! 3. run the pure transition from `party_core`
//! 4. write the result conditioned on the version read in step 2
//! 5. on a version conflict, go back to step 2 (at most `MAX_WRITE_ATTEMPTS`)
//!
//! The committed value is returned together with the effects the caller must
//! dispatch. Nothing is dispatched from here.

mod applications;
mod drafts;
mod lifecycle;
pub mod locks;
mod queries;


use std::sync::Arc;

use tracing::{error, warn};

use crate::repository::{ExpectedVersion, RecordStore};
use crate::session::SessionStore;
use locks::PartyLocks;
use party_core::{
    Application, ApplicationId, Effect, Entity, Party, PartyDeletion, PartyError, PartyId,
    Transition, TransitionResult,
};

pub use queries::{MyParties, PendingApplication};

/// Attempts per operation before giving up with `Contended`.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// A committed operation result and the effects still to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub effects: Vec<Effect>,
}

impl<T> Outcome<T> {
    fn committed(value: T, effects: Vec<Effect>) -> Self {
        Self { value, effects }
    }
}

/// Values that carry the party a transition wants written.
trait PartyRecord {
    fn party(&self) -> &Party;
    fn set_party(&mut self, party: Party);
}

impl PartyRecord for Party {
    fn party(&self) -> &Party {
        self
    }

    fn set_party(&mut self, party: Party) {
        *self = party;
    }
}

impl PartyRecord for PartyDeletion {
    fn party(&self) -> &Party {
        &self.party
    }

    fn set_party(&mut self, party: Party) {
        self.party = party;
    }
}

/// Entry point for every party, draft and application operation.
pub struct PartyService {
    records: Arc<dyn RecordStore>,
    sessions: Arc<SessionStore>,
    locks: PartyLocks,
}

impl PartyService {
    pub fn new(records: Arc<dyn RecordStore>, sessions: Arc<SessionStore>) -> Self {
        Self {
            records,
            sessions,
            locks: PartyLocks::new(),
        }
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    async fn load_party(&self, id: &PartyId) -> Result<Party, PartyError> {
        self.records
            .get_party(id)
            .await?
            .ok_or(PartyError::NotFound(Entity::Party))
    }

    async fn load_application(&self, id: &ApplicationId) -> Result<Application, PartyError> {
        self.records
            .get_application(id)
            .await?
            .ok_or(PartyError::NotFound(Entity::Application))
    }

    /// Run a single-party transition with compare-and-swap and retry.
    ///
    /// A transition that leaves the party unchanged is not written.
    async fn mutate_party<T, F>(
        &self,
        id: &PartyId,
        operation: &'static str,
        transition: F,
    ) -> Result<Outcome<T>, PartyError>
    where
        T: PartyRecord,
        F: Fn(Party) -> TransitionResult<T>,
    {
        let _guard = self.locks.acquire(id).await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.load_party(id).await?;
            let expected = ExpectedVersion::Exactly(current.version);
            let Transition { mut value, effects } = transition(current.clone())?;

            if *value.party() == current {
                return Ok(Outcome::committed(value, effects));
            }

            match self.records.put_party(value.party().clone(), expected).await {
                Ok(stored) => {
                    value.set_party(stored);
                    return Ok(Outcome::committed(value, effects));
                }
                Err(err) if err.is_conflict() => {
                    warn!(
                        "Version conflict on party {} during {} (attempt {}/{})",
                        id, operation, attempt, MAX_WRITE_ATTEMPTS
                    );
                }
                Err(err) => {
                    error!("Failed to store party {} during {}: {}", id, operation, err);
                    return Err(err.into());
                }
            }
        }

        Err(PartyError::Contended(format!("party {}", id)))
    }
}
