//! In-memory implementation of `RecordStore`.
//!
//! All records are held in memory and lost on restart. Used by tests and by
//! anything that wants the engines without a database file.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ExpectedVersion, RecordStore, RepositoryError};
use party_core::{
    Application, ApplicationFilter, ApplicationId, ApplicationStatus, Entity, Party, PartyFilter,
    PartyId,
};

/// In-memory record store.
///
/// Each collection is a `HashMap` protected by a `RwLock`; the version check
/// and the write happen under the same write guard.
pub struct InMemoryRepository {
    parties: RwLock<HashMap<PartyId, Party>>,
    applications: RwLock<HashMap<ApplicationId, Application>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            parties: RwLock::new(HashMap::new()),
            applications: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn check_version(
    stored: Option<u64>,
    expected: ExpectedVersion,
    entity: Entity,
    id: &str,
) -> Result<(), RepositoryError> {
    let ok = match (stored, expected) {
        (None, ExpectedVersion::Absent) => true,
        (Some(v), ExpectedVersion::Exactly(e)) => v == e,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(RepositoryError::Conflict {
            entity,
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl RecordStore for InMemoryRepository {
    async fn get_party(&self, id: &PartyId) -> Result<Option<Party>, RepositoryError> {
        let parties = self.parties.read().await;
        Ok(parties.get(id).cloned())
    }

    async fn put_party(
        &self,
        mut party: Party,
        expected: ExpectedVersion,
    ) -> Result<Party, RepositoryError> {
        let mut parties = self.parties.write().await;
        check_version(
            parties.get(&party.id).map(|p| p.version),
            expected,
            Entity::Party,
            party.id.as_str(),
        )?;
        party.version = expected.next();
        parties.insert(party.id.clone(), party.clone());
        Ok(party)
    }

    async fn find_parties(&self, filter: &PartyFilter) -> Result<Vec<Party>, RepositoryError> {
        let parties = self.parties.read().await;
        let mut found: Vec<Party> = parties
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        let applications = self.applications.read().await;
        Ok(applications.get(id).cloned())
    }

    async fn put_application(
        &self,
        mut application: Application,
        expected: ExpectedVersion,
    ) -> Result<Application, RepositoryError> {
        let mut applications = self.applications.write().await;
        check_version(
            applications.get(&application.id).map(|a| a.version),
            expected,
            Entity::Application,
            application.id.as_str(),
        )?;

        if application.status == ApplicationStatus::Pending {
            let duplicate = applications.values().any(|other| {
                other.id != application.id
                    && other.status == ApplicationStatus::Pending
                    && other.party_id == application.party_id
                    && other.applicant == application.applicant
            });
            if duplicate {
                return Err(RepositoryError::DuplicatePending {
                    party_id: application.party_id.to_string(),
                    applicant: application.applicant.to_string(),
                });
            }
        }

        application.version = expected.next();
        applications.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    async fn find_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, RepositoryError> {
        let applications = self.applications.read().await;
        let mut found: Vec<Application> = applications
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
