//! Record store abstraction for parties and applications.
//!
//! This module defines the `RecordStore` trait that abstracts durable
//! storage of the two record collections. Implementations provide different
//! backends (in-memory for tests, SQLite for the running service).
//!
//! Writes are per-record compare-and-swap: every record carries a `version`
//! and a write only succeeds when the stored version is the one the caller
//! read. There is no cross-record transaction.

mod memory;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;

use party_core::{
    Application, ApplicationFilter, ApplicationId, Entity, Party, PartyError, PartyFilter, PartyId,
};

/// The version a writer expects to find in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The record must not exist yet.
    Absent,
    /// The stored record must have exactly this version.
    Exactly(u64),
}

impl ExpectedVersion {
    /// Version the record will carry after a successful write.
    pub fn next(self) -> u64 {
        match self {
            Self::Absent => 1,
            Self::Exactly(v) => v + 1,
        }
    }
}

/// Errors that can occur during repository operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend failed (I/O, SQL, task join).
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// A stored row could not be decoded.
    #[error("corrupted {what} in store")]
    Corruption { what: String },

    /// The stored version did not match the expected one.
    #[error("version conflict on {entity} {id}")]
    Conflict { entity: Entity, id: String },

    /// Inserting a pending application when one already exists for the pair.
    #[error("pending application already exists for {applicant} on party {party_id}")]
    DuplicatePending { party_id: String, applicant: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<RepositoryError> for PartyError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Storage { operation, message } => {
                PartyError::Storage { operation, message }
            }
            RepositoryError::Corruption { what } => {
                PartyError::storage("decode", format!("corrupted {}", what))
            }
            RepositoryError::Conflict { entity, id } => {
                PartyError::Contended(format!("{} {}", entity, id))
            }
            RepositoryError::DuplicatePending { .. } => PartyError::DuplicatePending,
        }
    }
}

/// Durable storage for parties and applications.
///
/// `put_*` returns the record as stored, with its version bumped. Find
/// results are ordered oldest first.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_party(&self, id: &PartyId) -> Result<Option<Party>, RepositoryError>;

    async fn put_party(
        &self,
        party: Party,
        expected: ExpectedVersion,
    ) -> Result<Party, RepositoryError>;

    async fn find_parties(&self, filter: &PartyFilter) -> Result<Vec<Party>, RepositoryError>;

    async fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError>;

    /// Write an application. Inserting a pending application fails with
    /// `DuplicatePending` if the applicant already has one for that party.
    async fn put_application(
        &self,
        application: Application,
        expected: ExpectedVersion,
    ) -> Result<Application, RepositoryError>;

    async fn find_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, RepositoryError>;
}
