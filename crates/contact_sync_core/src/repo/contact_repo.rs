//! CRM contact directory contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve contacts by id or by email for the reconciler.
//! - Offer CRM-side writes used by the host integration and fixtures.
//!
//! # Invariants
//! - Email lookups are case-insensitive and ordered by ascending id, so
//!   "first match" is deterministic.

use crate::model::contact::{Contact, ContactId};
use crate::model::normalize_email;
use crate::repo::{ensure_tables, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CONTACT_SELECT_SQL: &str = "SELECT id, email, first_name, last_name FROM contacts";

/// Read capability the reconciler needs from the CRM.
pub trait ContactDirectory {
    fn get_contact_by_id(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    /// Returns every contact with this email, lowest id first.
    fn get_contacts_by_email(&self, email: &str) -> RepoResult<Vec<Contact>>;
}

/// SQLite-backed contact directory over the shared `contacts` table.
pub struct SqliteContactDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactDirectory<'conn> {
    /// Creates a directory after verifying the schema is migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["contacts"])?;
        Ok(Self { conn })
    }

    /// Inserts or replaces one contact, as the CRM does on save.
    pub fn upsert_contact(&self, contact: &Contact) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO contacts (id, email, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                contact.id,
                contact.email.trim(),
                contact.first_name.as_str(),
                contact.last_name.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Changes a contact's email without touching any linked account.
    pub fn update_contact_email(&self, id: ContactId, email: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE contacts
             SET email = ?1, updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![email.trim(), id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound("contact", id));
        }
        Ok(())
    }
}

impl ContactDirectory for SqliteContactDirectory<'_> {
    fn get_contact_by_id(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let contact = self
            .conn
            .query_row(
                &format!("{CONTACT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_contact_row,
            )
            .optional()?;
        Ok(contact)
    }

    fn get_contacts_by_email(&self, email: &str) -> RepoResult<Vec<Contact>> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE email = ?1 COLLATE NOCASE
             ORDER BY id ASC;"
        ))?;
        let contacts = stmt
            .query_map([normalized], parse_contact_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contacts)
    }
}

fn parse_contact_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
    })
}
