//! Collaborator contracts and SQLite-backed adapters.
//!
//! # Responsibility
//! - Define the CRM (`ContactDirectory`) and platform (`AccountPlatform`)
//!   capabilities the reconciler consumes.
//! - Isolate SQLite query details from reconciliation logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.
//! - Account uniqueness is enforced by the store, never by callers.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod account_repo;
pub mod contact_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by contact and account adapters.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Referenced record does not exist (`entity`, `id`).
    NotFound(&'static str, i64),
    /// Write would violate a uniqueness rule and idempotent mode was off.
    Conflict(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn table_exists(conn: &rusqlite::Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn ensure_tables(conn: &rusqlite::Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::InvalidData(format!(
                "required table `{table}` is missing; run migrations first"
            )));
        }
    }
    Ok(())
}
