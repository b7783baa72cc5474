//! SQLite implementation of `RecordStore`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Compare-and-swap
//!
//! Inserts rely on the primary key; updates are `UPDATE ... WHERE id = ? AND
//! version = ?`. A write that touches no row is a `Conflict`. The
//! one-pending-application rule is a partial unique index, so it holds even
//! if two processes share the file.

mod rows;


use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::SubsecRound;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::warn;

use super::{ExpectedVersion, RecordStore, RepositoryError};
use party_core::{
    Application, ApplicationFilter, ApplicationId, Entity, Party, PartyFilter, PartyId,
};
use rows::{ApplicationRow, PartyRow, APPLICATION_COLUMNS, PARTY_COLUMNS};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed record store.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so a committed write survives power loss
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;

                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let dir_permissions = std::fs::Permissions::from_mode(0o700);
                        if let Err(e) = std::fs::set_permissions(parent, dir_permissions) {
                            warn!(
                                "Failed to set restrictive permissions on state directory: {}",
                                e
                            );
                        }
                    }
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite silently keeps DELETE mode on filesystems without shared
        // memory support, so the reported mode has to be checked.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     The record store requires WAL mode for its durability guarantees.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS parties (
                    id TEXT PRIMARY KEY,
                    creator_id TEXT NOT NULL,
                    context_id TEXT NOT NULL,
                    origin_message_id TEXT,
                    title TEXT NOT NULL,
                    description TEXT,
                    max_members INTEGER NOT NULL,
                    member_count INTEGER NOT NULL,
                    requirements_json TEXT NOT NULL,
                    members_json TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    version INTEGER NOT NULL,
                    CHECK (member_count >= 1 AND member_count <= max_members)
                );

                CREATE INDEX IF NOT EXISTS idx_parties_creator
                    ON parties(creator_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_parties_status
                    ON parties(status);

                CREATE TABLE IF NOT EXISTS applications (
                    id TEXT PRIMARY KEY,
                    party_id TEXT NOT NULL,
                    applicant_id TEXT NOT NULL,
                    applicant_display_name TEXT NOT NULL,
                    answers_json TEXT NOT NULL,
                    status TEXT NOT NULL,
                    applied_at INTEGER NOT NULL,
                    version INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_applications_party
                    ON applications(party_id, applied_at);
                CREATE INDEX IF NOT EXISTS idx_applications_applicant
                    ON applications(applicant_id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // At most one pending application per (party, applicant). Older
        // databases may hold duplicates; all but the earliest are rejected
        // before the index is created.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                UPDATE applications SET status = 'rejected', version = version + 1
                WHERE status = 'pending'
                  AND EXISTS (
                      SELECT 1 FROM applications AS earlier
                      WHERE earlier.party_id = applications.party_id
                        AND earlier.applicant_id = applications.applicant_id
                        AND earlier.status = 'pending'
                        AND (earlier.applied_at < applications.applied_at
                             OR (earlier.applied_at = applications.applied_at
                                 AND earlier.id < applications.id))
                  );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_applications_one_pending
                    ON applications(party_id, applicant_id) WHERE status = 'pending';
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

/// Which constraint rejected an insert, if any.
enum ConstraintHit {
    PrimaryKey,
    Unique,
}

fn constraint_hit(err: &rusqlite::Error) -> Option<ConstraintHit> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(ConstraintHit::PrimaryKey),
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => Some(ConstraintHit::Unique),
            _ => None,
        },
        _ => None,
    }
}

fn version_to_i64(version: u64, operation: &'static str) -> Result<i64, RepositoryError> {
    i64::try_from(version).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!("version {} exceeds maximum storable value", version),
        )
    })
}

#[async_trait]
impl RecordStore for SqliteRepository {
    async fn get_party(&self, id: &PartyId) -> Result<Option<Party>, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "get_party")?;
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM parties WHERE id = ?1", PARTY_COLUMNS),
                    params![id],
                    PartyRow::read,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_party", e.to_string()))?;
            row.map(PartyRow::into_party).transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get_party", e.to_string()))?
    }

    async fn put_party(
        &self,
        party: Party,
        expected: ExpectedVersion,
    ) -> Result<Party, RepositoryError> {
        let conn = self.conn.clone();
        let mut party = party;
        party.version = expected.next();
        party.created_at = party.created_at.trunc_subsecs(6);
        let row = PartyRow::from_party(&party)?;
        let expected_version = match expected {
            ExpectedVersion::Absent => None,
            ExpectedVersion::Exactly(v) => Some(version_to_i64(v, "put_party")?),
        };

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "put_party")?;
            let conflict = || RepositoryError::Conflict {
                entity: Entity::Party,
                id: row.id.clone(),
            };

            let changed = match expected_version {
                None => conn
                    .execute(
                        &format!(
                            "INSERT INTO parties ({}) VALUES \
                             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                            PARTY_COLUMNS
                        ),
                        params![
                            row.id,
                            row.creator_id,
                            row.context_id,
                            row.origin_message_id,
                            row.title,
                            row.description,
                            row.max_members,
                            row.member_count,
                            row.requirements_json,
                            row.members_json,
                            row.status,
                            row.created_at,
                            row.version,
                        ],
                    )
                    .map_err(|e| match constraint_hit(&e) {
                        Some(ConstraintHit::PrimaryKey) => conflict(),
                        _ => RepositoryError::storage("put_party", e.to_string()),
                    })?,
                Some(expected_version) => conn
                    .execute(
                        "UPDATE parties SET
                             creator_id = ?2, context_id = ?3, origin_message_id = ?4,
                             title = ?5, description = ?6, max_members = ?7,
                             member_count = ?8, requirements_json = ?9, members_json = ?10,
                             status = ?11, created_at = ?12, version = ?13
                         WHERE id = ?1 AND version = ?14",
                        params![
                            row.id,
                            row.creator_id,
                            row.context_id,
                            row.origin_message_id,
                            row.title,
                            row.description,
                            row.max_members,
                            row.member_count,
                            row.requirements_json,
                            row.members_json,
                            row.status,
                            row.created_at,
                            row.version,
                            expected_version,
                        ],
                    )
                    .map_err(|e| RepositoryError::storage("put_party", e.to_string()))?,
            };

            if changed == 0 {
                return Err(conflict());
            }
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put_party", e.to_string()))??;

        Ok(party)
    }

    async fn find_parties(&self, filter: &PartyFilter) -> Result<Vec<Party>, RepositoryError> {
        let conn = self.conn.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "find_parties")?;

            // Indexed columns narrow the scan; `matches` applies the rest.
            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(creator) = &filter.creator {
                values.push(creator.to_string());
                clauses.push(format!("creator_id = ?{}", values.len()));
            }
            if let Some(status) = filter.status {
                values.push(status.as_str().to_string());
                clauses.push(format!("status = ?{}", values.len()));
            }
            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM parties {} ORDER BY created_at ASC, id ASC",
                    PARTY_COLUMNS, where_clause
                ))
                .map_err(|e| RepositoryError::storage("find_parties", e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), PartyRow::read)
                .map_err(|e| RepositoryError::storage("find_parties", e.to_string()))?;

            let mut parties = Vec::new();
            for row in rows {
                let row = row.map_err(|e| RepositoryError::storage("find_parties", e.to_string()))?;
                let party = row.into_party()?;
                if filter.matches(&party) {
                    parties.push(party);
                }
            }
            Ok(parties)
        })
        .await
        .map_err(|e| RepositoryError::storage("find_parties", e.to_string()))?
    }

    async fn get_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Application>, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "get_application")?;
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM applications WHERE id = ?1",
                        APPLICATION_COLUMNS
                    ),
                    params![id],
                    ApplicationRow::read,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_application", e.to_string()))?;
            row.map(ApplicationRow::into_application).transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get_application", e.to_string()))?
    }

    async fn put_application(
        &self,
        application: Application,
        expected: ExpectedVersion,
    ) -> Result<Application, RepositoryError> {
        let conn = self.conn.clone();
        let mut application = application;
        application.version = expected.next();
        application.applied_at = application.applied_at.trunc_subsecs(6);
        let row = ApplicationRow::from_application(&application)?;
        let expected_version = match expected {
            ExpectedVersion::Absent => None,
            ExpectedVersion::Exactly(v) => Some(version_to_i64(v, "put_application")?),
        };

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "put_application")?;
            let conflict = || RepositoryError::Conflict {
                entity: Entity::Application,
                id: row.id.clone(),
            };
            let map_err = |e: rusqlite::Error| match constraint_hit(&e) {
                Some(ConstraintHit::PrimaryKey) => conflict(),
                Some(ConstraintHit::Unique) => RepositoryError::DuplicatePending {
                    party_id: row.party_id.clone(),
                    applicant: row.applicant_id.clone(),
                },
                None => RepositoryError::storage("put_application", e.to_string()),
            };

            let changed = match expected_version {
                None => conn
                    .execute(
                        &format!(
                            "INSERT INTO applications ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                            APPLICATION_COLUMNS
                        ),
                        params![
                            row.id,
                            row.party_id,
                            row.applicant_id,
                            row.applicant_display_name,
                            row.answers_json,
                            row.status,
                            row.applied_at,
                            row.version,
                        ],
                    )
                    .map_err(map_err)?,
                Some(expected_version) => conn
                    .execute(
                        "UPDATE applications SET
                             party_id = ?2, applicant_id = ?3, applicant_display_name = ?4,
                             answers_json = ?5, status = ?6, applied_at = ?7, version = ?8
                         WHERE id = ?1 AND version = ?9",
                        params![
                            row.id,
                            row.party_id,
                            row.applicant_id,
                            row.applicant_display_name,
                            row.answers_json,
                            row.status,
                            row.applied_at,
                            row.version,
                            expected_version,
                        ],
                    )
                    .map_err(map_err)?,
            };

            if changed == 0 {
                return Err(conflict());
            }
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put_application", e.to_string()))??;

        Ok(application)
    }

    async fn find_applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, RepositoryError> {
        let conn = self.conn.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "find_applications")?;

            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(party) = &filter.party {
                values.push(party.to_string());
                clauses.push(format!("party_id = ?{}", values.len()));
            }
            if let Some(applicant) = &filter.applicant {
                values.push(applicant.to_string());
                clauses.push(format!("applicant_id = ?{}", values.len()));
            }
            if let Some(status) = filter.status {
                values.push(status.as_str().to_string());
                clauses.push(format!("status = ?{}", values.len()));
            }
            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM applications {} ORDER BY applied_at ASC, id ASC",
                    APPLICATION_COLUMNS, where_clause
                ))
                .map_err(|e| RepositoryError::storage("find_applications", e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), ApplicationRow::read)
                .map_err(|e| RepositoryError::storage("find_applications", e.to_string()))?;

            let mut applications = Vec::new();
            for row in rows {
                let row = row
                    .map_err(|e| RepositoryError::storage("find_applications", e.to_string()))?;
                let application = row.into_application()?;
                if filter.matches(&application) {
                    applications.push(application);
                }
            }
            Ok(applications)
        })
        .await
        .map_err(|e| RepositoryError::storage("find_applications", e.to_string()))?
    }
}
