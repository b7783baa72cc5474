//! Row <-> record conversion.
//!
//! Ordered sequences (members, requirements, answers) are stored as JSON
//! text; timestamps as microseconds since the epoch so they sort as integers.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::repository::RepositoryError;
use party_core::{Application, ApplicationStatus, Party, PartyStatus};

pub(super) const PARTY_COLUMNS: &str = "id, creator_id, context_id, origin_message_id, title, \
     description, max_members, member_count, requirements_json, members_json, status, \
     created_at, version";

pub(super) const APPLICATION_COLUMNS: &str = "id, party_id, applicant_id, \
     applicant_display_name, answers_json, status, applied_at, version";

pub(super) struct PartyRow {
    pub id: String,
    pub creator_id: String,
    pub context_id: String,
    pub origin_message_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub max_members: i64,
    pub member_count: i64,
    pub requirements_json: String,
    pub members_json: String,
    pub status: String,
    pub created_at: i64,
    pub version: i64,
}

pub(super) struct ApplicationRow {
    pub id: String,
    pub party_id: String,
    pub applicant_id: String,
    pub applicant_display_name: String,
    pub answers_json: String,
    pub status: String,
    pub applied_at: i64,
    pub version: i64,
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::storage(format!("serialize {}", what), e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(json).map_err(|_| RepositoryError::corruption(what))
}

fn timestamp(micros: i64, what: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| RepositoryError::corruption(what))
}

fn version(value: i64, what: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::corruption(what))
}

fn stored_version(value: u64, operation: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!("version {} exceeds maximum storable value", value),
        )
    })
}

impl PartyRow {
    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            context_id: row.get(2)?,
            origin_message_id: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            max_members: row.get(6)?,
            member_count: row.get(7)?,
            requirements_json: row.get(8)?,
            members_json: row.get(9)?,
            status: row.get(10)?,
            created_at: row.get(11)?,
            version: row.get(12)?,
        })
    }

    pub fn from_party(party: &Party) -> Result<Self, RepositoryError> {
        Ok(Self {
            id: party.id.to_string(),
            creator_id: party.creator.to_string(),
            context_id: party.context_id.clone(),
            origin_message_id: party.origin_message_id.clone(),
            title: party.title.clone(),
            description: party.description.clone(),
            max_members: i64::from(party.max_members),
            member_count: party.member_count() as i64,
            requirements_json: to_json(&party.requirements, "requirements")?,
            members_json: to_json(&party.members, "members")?,
            status: party.status.as_str().to_string(),
            created_at: party.created_at.timestamp_micros(),
            version: stored_version(party.version, "put_party")?,
        })
    }

    pub fn into_party(self) -> Result<Party, RepositoryError> {
        let party = Party {
            id: self.id.into(),
            creator: self.creator_id.into(),
            context_id: self.context_id,
            origin_message_id: self.origin_message_id,
            title: self.title,
            description: self.description,
            max_members: u32::try_from(self.max_members)
                .map_err(|_| RepositoryError::corruption("party max_members"))?,
            requirements: from_json(&self.requirements_json, "party requirements JSON")?,
            members: from_json(&self.members_json, "party members JSON")?,
            status: PartyStatus::parse(&self.status)
                .ok_or_else(|| RepositoryError::corruption("party status"))?,
            created_at: timestamp(self.created_at, "party created_at")?,
            version: version(self.version, "party version")?,
        };
        if party.member_count() as i64 != self.member_count {
            return Err(RepositoryError::corruption("party member_count"));
        }
        Ok(party)
    }
}

impl ApplicationRow {
    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            party_id: row.get(1)?,
            applicant_id: row.get(2)?,
            applicant_display_name: row.get(3)?,
            answers_json: row.get(4)?,
            status: row.get(5)?,
            applied_at: row.get(6)?,
            version: row.get(7)?,
        })
    }

    pub fn from_application(application: &Application) -> Result<Self, RepositoryError> {
        Ok(Self {
            id: application.id.to_string(),
            party_id: application.party_id.to_string(),
            applicant_id: application.applicant.to_string(),
            applicant_display_name: application.applicant_display_name.clone(),
            answers_json: to_json(&application.answers, "answers")?,
            status: application.status.as_str().to_string(),
            applied_at: application.applied_at.timestamp_micros(),
            version: stored_version(application.version, "put_application")?,
        })
    }

    pub fn into_application(self) -> Result<Application, RepositoryError> {
        Ok(Application {
            id: self.id.into(),
            party_id: self.party_id.into(),
            applicant: self.applicant_id.into(),
            applicant_display_name: self.applicant_display_name,
            answers: from_json(&self.answers_json, "application answers JSON")?,
            status: ApplicationStatus::parse(&self.status)
                .ok_or_else(|| RepositoryError::corruption("application status"))?,
            applied_at: timestamp(self.applied_at, "application applied_at")?,
            version: version(self.version, "application version")?,
        })
    }
}
