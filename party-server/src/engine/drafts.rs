//! Draft builder: start, add/remove requirements, finalize.

use chrono::Utc;
use tracing::{error, info};

use super::{Outcome, PartyService};
use crate::repository::ExpectedVersion;
use crate::session::SessionId;
use party_core::{transition, Party, PartyDraft, PartyError, PartyId, Requirement, UserId};

impl PartyService {
    /// Validate the fixed-shape fields and open a draft session.
    pub async fn start_draft(
        &self,
        owner: &UserId,
        title: &str,
        max_members: u32,
        description: Option<&str>,
    ) -> Result<(SessionId, PartyDraft), PartyError> {
        let draft = PartyDraft::new(owner.clone(), title, max_members, description, Utc::now())?;
        let session = self.sessions.create(draft.clone()).await;
        info!("User {} started draft {} ({})", owner, session, draft.title);
        Ok((session, draft))
    }

    pub async fn draft(
        &self,
        session: &SessionId,
        caller: &UserId,
    ) -> Result<PartyDraft, PartyError> {
        self.sessions.get(session, caller).await
    }

    pub async fn add_requirement(
        &self,
        session: &SessionId,
        caller: &UserId,
        name: &str,
        description: Option<&str>,
    ) -> Result<PartyDraft, PartyError> {
        let (draft, ()) = self
            .sessions
            .update(session, caller, |draft| {
                draft.add_requirement(name, description).map(|_| ())
            })
            .await?;
        Ok(draft)
    }

    /// Drop the most recently added requirement. Returns the draft and the
    /// removed requirement, if there was one.
    pub async fn remove_last_requirement(
        &self,
        session: &SessionId,
        caller: &UserId,
    ) -> Result<(PartyDraft, Option<Requirement>), PartyError> {
        self.sessions
            .update(session, caller, |draft| Ok(draft.remove_last_requirement()))
            .await
    }

    pub async fn cancel_draft(&self, session: &SessionId, caller: &UserId) -> Result<(), PartyError> {
        self.sessions.delete(session, caller).await?;
        info!("User {} cancelled draft {}", caller, session);
        Ok(())
    }

    /// Turn the caller's draft into a stored open party and end the session.
    ///
    /// The session is consumed first so two concurrent finalize calls cannot
    /// both create a party. If creation fails the draft is put back.
    pub async fn finalize(
        &self,
        session: &SessionId,
        caller: &UserId,
        context_id: &str,
    ) -> Result<Outcome<Party>, PartyError> {
        let draft = self.sessions.take(session, caller).await?;

        let created = match transition::finalize_draft(
            draft.clone(),
            PartyId::generate(),
            context_id,
            Utc::now(),
        ) {
            Ok(created) => created,
            Err(err) => {
                self.sessions.restore(session.clone(), draft).await;
                return Err(err);
            }
        };

        match self
            .records
            .put_party(created.value, ExpectedVersion::Absent)
            .await
        {
            Ok(party) => {
                info!(
                    "User {} published party {} from draft {}",
                    caller, party.id, session
                );
                Ok(Outcome::committed(party, created.effects))
            }
            Err(err) => {
                error!("Failed to store party from draft {}: {}", session, err);
                self.sessions.restore(session.clone(), draft).await;
                Err(err.into())
            }
        }
    }
}
