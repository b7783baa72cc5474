//! Read-only views over the record store.

use serde::Serialize;

use super::PartyService;
use party_core::{
    Application, ApplicationFilter, ApplicationStatus, Party, PartyError, PartyFilter, PartyId,
    PartyStatus, Requirement, UserId,
};

/// Open parties a user is involved in, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MyParties {
    pub created: Vec<Party>,
    /// Parties the user joined but did not create.
    pub joined: Vec<Party>,
}

/// A pending application together with the title of its party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApplication {
    pub application: Application,
    pub party_title: String,
}

impl PartyService {
    pub async fn view(&self, party_id: &PartyId) -> Result<Party, PartyError> {
        self.load_party(party_id).await
    }

    /// The ordered requirements an applicant has to answer.
    pub async fn application_form(&self, party_id: &PartyId) -> Result<Vec<Requirement>, PartyError> {
        let party = self.load_party(party_id).await?;
        if party.status != PartyStatus::Open {
            return Err(PartyError::NotOpen);
        }
        Ok(party.requirements)
    }

    pub async fn my_parties(&self, user: &UserId) -> Result<MyParties, PartyError> {
        let mut created = self
            .records
            .find_parties(
                &PartyFilter::default()
                    .created_by(user.clone())
                    .with_status(PartyStatus::Open),
            )
            .await?;
        let mut joined: Vec<Party> = self
            .records
            .find_parties(
                &PartyFilter::default()
                    .with_member(user.clone())
                    .with_status(PartyStatus::Open),
            )
            .await?
            .into_iter()
            .filter(|party| !party.is_creator(user))
            .collect();

        created.reverse();
        joined.reverse();
        Ok(MyParties { created, joined })
    }

    /// Pending applications across every live party the user created,
    /// newest first.
    pub async fn pending_for_creator(
        &self,
        user: &UserId,
    ) -> Result<Vec<PendingApplication>, PartyError> {
        let parties: Vec<Party> = self
            .records
            .find_parties(&PartyFilter::default().created_by(user.clone()))
            .await?
            .into_iter()
            .filter(|party| party.status != PartyStatus::Deleted)
            .collect();
        if parties.is_empty() {
            return Ok(vec![]);
        }

        let applications = self
            .records
            .find_applications(
                &ApplicationFilter::default()
                    .for_parties(parties.iter().map(|p| p.id.clone()).collect())
                    .with_status(ApplicationStatus::Pending),
            )
            .await?;

        Ok(applications
            .into_iter()
            .rev()
            .filter_map(|application| {
                let party = parties.iter().find(|p| p.id == application.party_id)?;
                Some(PendingApplication {
                    party_title: party.title.clone(),
                    application,
                })
            })
            .collect())
    }
}
