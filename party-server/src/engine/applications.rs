//! Application workflow operations.
//!
//! Approval touches two records. The party is written first, then the
//! application; if the second write does not land, retrying the decision
//! finds the applicant already a member and only completes the application.

use chrono::Utc;
use tracing::{error, info, warn};

use super::{Outcome, PartyService, MAX_WRITE_ATTEMPTS};
use crate::repository::ExpectedVersion;
use party_core::{
    transition, Application, ApplicationFilter, ApplicationId, ApplicationRequest,
    ApplicationStatus, Decided, Decision, Entity, PartyError, PartyId, Transition, UserId,
};

impl PartyService {
    pub async fn submit(
        &self,
        party_id: &PartyId,
        request: ApplicationRequest,
    ) -> Result<Outcome<Application>, PartyError> {
        let _guard = self.locks.acquire(party_id).await;

        let party = self.load_party(party_id).await?;
        let pending = self
            .records
            .find_applications(
                &ApplicationFilter::default()
                    .for_party(party_id.clone())
                    .by_applicant(request.applicant.clone())
                    .with_status(ApplicationStatus::Pending),
            )
            .await?;

        let Transition { value, effects } = transition::submit(
            &party,
            request,
            !pending.is_empty(),
            ApplicationId::generate(),
            Utc::now(),
        )?;
        let stored = self
            .records
            .put_application(value, ExpectedVersion::Absent)
            .await?;

        info!(
            "User {} applied to party {} (application {})",
            stored.applicant, party_id, stored.id
        );
        Ok(Outcome::committed(stored, effects))
    }

    pub async fn decide(
        &self,
        application_id: &ApplicationId,
        decider: &UserId,
        decision: Decision,
    ) -> Result<Outcome<Application>, PartyError> {
        let party_id = self.load_application(application_id).await?.party_id;
        let _guard = self.locks.acquire(&party_id).await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let application = self.load_application(application_id).await?;
            let party = self
                .records
                .get_party(&party_id)
                .await?
                .ok_or(PartyError::NotFound(Entity::Application))?;

            let Transition {
                value:
                    Decided {
                        party: next_party,
                        application: next_application,
                    },
                effects,
            } = transition::decide(party.clone(), application.clone(), decider, decision)?;

            let party_changed = next_party != party;
            if party_changed {
                match self
                    .records
                    .put_party(next_party, ExpectedVersion::Exactly(party.version))
                    .await
                {
                    Ok(_) => {}
                    Err(err) if err.is_conflict() => {
                        warn!(
                            "Version conflict on party {} while deciding {} (attempt {}/{})",
                            party_id, application_id, attempt, MAX_WRITE_ATTEMPTS
                        );
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            match self
                .records
                .put_application(
                    next_application,
                    ExpectedVersion::Exactly(application.version),
                )
                .await
            {
                Ok(stored) => {
                    info!(
                        "Application {} for party {} {} by {}",
                        application_id, party_id, stored.status, decider
                    );
                    return Ok(Outcome::committed(stored, effects));
                }
                Err(err) if err.is_conflict() => {
                    warn!(
                        "Version conflict on application {} (attempt {}/{})",
                        application_id, attempt, MAX_WRITE_ATTEMPTS
                    );
                }
                Err(err) => {
                    if party_changed {
                        error!(
                            "Added {} to party {} but failed to mark application {} approved: {}",
                            application.applicant, party_id, application_id, err
                        );
                    }
                    return Err(err.into());
                }
            }
        }

        Err(PartyError::Contended(format!("application {}", application_id)))
    }
}
