//! Account platform contract and SQLite implementation.
//!
//! # Responsibility
//! - Look up accounts by id or email.
//! - Create accounts from a contact id, honouring idempotent mode.
//! - Maintain the account -> contact back-reference.
//!
//! # Invariants
//! - Account creation runs in an `IMMEDIATE` transaction; the store's
//!   `UNIQUE` constraints on email and `linked_contact_id` decide races.
//! - In idempotent mode a duplicate is never an error: the existing account
//!   is returned with `newly_created = false`.

use crate::model::account::{Account, AccountId, CreateAccountOptions, CreatedAccount};
use crate::model::contact::ContactId;
use crate::model::normalize_email;
use crate::repo::{ensure_tables, RepoError, RepoResult};
use log::{debug, info};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};

const ACCOUNT_SELECT_SQL: &str = "SELECT
    id,
    email,
    linked_contact_id,
    first_name,
    last_name,
    password_reset_required
FROM accounts";

/// Channel used by the platform's default new-account notification.
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "email";
/// Notification kind queued when an account is created with `notify_user`.
pub const NEW_ACCOUNT_NOTIFICATION: &str = "new_account";

/// Queued account notification row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNotification {
    pub account_id: AccountId,
    pub channel: String,
    pub kind: String,
}

/// Capability the reconciler needs from the account platform.
pub trait AccountPlatform {
    fn get_account_by_id(&self, id: AccountId) -> RepoResult<Option<Account>>;
    fn get_account_by_email(&self, email: &str) -> RepoResult<Option<Account>>;
    /// Returns the account whose back-reference points at `contact_id`.
    fn get_account_by_linked_contact(&self, contact_id: ContactId) -> RepoResult<Option<Account>>;
    /// Creates an account keyed from `contact_id`.
    ///
    /// Idempotent with respect to the contact id and its email when
    /// `options.idempotent` is set.
    fn create_account(
        &self,
        contact_id: ContactId,
        options: &CreateAccountOptions,
    ) -> RepoResult<CreatedAccount>;
    fn set_account_contact_link(&self, account_id: AccountId, contact_id: ContactId)
        -> RepoResult<()>;
}

/// SQLite-backed account platform sharing the database with `contacts`.
pub struct SqliteAccountPlatform<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountPlatform<'conn> {
    /// Creates a platform adapter after verifying the schema is migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &["contacts", "accounts", "account_roles", "account_notifications"],
        )?;
        Ok(Self { conn })
    }

    /// Registers an account directly on the platform, with no contact link.
    ///
    /// Models a sign-up that happened outside the CRM.
    pub fn register_account(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> RepoResult<Account> {
        let email = email.trim();
        let result = self.conn.execute(
            "INSERT INTO accounts (email, first_name, last_name) VALUES (?1, ?2, ?3);",
            params![email, first_name, last_name],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(RepoError::Conflict(format!(
                    "account email already registered: {email}"
                )));
            }
            Err(err) => return Err(err.into()),
        }
        let id = self.conn.last_insert_rowid();
        load_account(self.conn, id)?.ok_or(RepoError::NotFound("account", id))
    }

    /// Lists notifications queued for one account, oldest first.
    pub fn notifications_for(&self, account_id: AccountId) -> RepoResult<Vec<AccountNotification>> {
        let mut stmt = self.conn.prepare(
            "SELECT account_id, channel, kind
             FROM account_notifications
             WHERE account_id = ?1
             ORDER BY id ASC;",
        )?;
        let rows = stmt
            .query_map([account_id], |row| {
                Ok(AccountNotification {
                    account_id: row.get(0)?,
                    channel: row.get(1)?,
                    kind: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Lists extra roles granted to one account, sorted by name.
    pub fn roles_for(&self, account_id: AccountId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT role FROM account_roles WHERE account_id = ?1 ORDER BY role ASC;",
        )?;
        let roles = stmt
            .query_map([account_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(roles)
    }

    /// Total number of accounts in the store.
    pub fn count_accounts(&self) -> RepoResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts;", [], |row| row.get(0))?)
    }

    fn insert_from_contact(
        &self,
        contact_id: ContactId,
        options: &CreateAccountOptions,
    ) -> Result<CreatedAccount, CreateAttemptError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let (email, first_name, last_name): (String, String, String) = tx
            .query_row(
                "SELECT email, first_name, last_name FROM contacts WHERE id = ?1;",
                [contact_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or(RepoError::NotFound("contact", contact_id))?;
        let email = email.trim().to_string();
        if email.is_empty() {
            return Err(RepoError::InvalidData(format!(
                "contact {contact_id} has no email; cannot key an account"
            ))
            .into());
        }

        if let Some(existing) = find_existing(&tx, contact_id, &email)? {
            if !options.idempotent {
                return Err(RepoError::Conflict(format!(
                    "account {} already exists for contact {contact_id}",
                    existing.id
                ))
                .into());
            }
            debug!(
                "event=account_create module=repo status=skip reason=exists account_id={} contact_id={}",
                existing.id, contact_id
            );
            return Ok(CreatedAccount {
                account: existing,
                newly_created: false,
            });
        }

        tx.execute(
            "INSERT INTO accounts (
                email,
                linked_contact_id,
                first_name,
                last_name,
                password_reset_required
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                email,
                contact_id,
                first_name,
                last_name,
                bool_to_int(options.force_password_reset),
            ],
        )
        .map_err(CreateAttemptError::from_insert)?;
        let account_id = tx.last_insert_rowid();

        for role in &options.extra_roles {
            let role = role.trim();
            if role.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO account_roles (account_id, role) VALUES (?1, ?2);",
                params![account_id, role],
            )?;
        }

        if options.notify_user {
            tx.execute(
                "INSERT INTO account_notifications (account_id, channel, kind)
                 VALUES (?1, ?2, ?3);",
                params![account_id, DEFAULT_NOTIFICATION_CHANNEL, NEW_ACCOUNT_NOTIFICATION],
            )?;
        }

        let account =
            load_account(&tx, account_id)?.ok_or(RepoError::NotFound("account", account_id))?;
        tx.commit()?;

        info!(
            "event=account_create module=repo status=ok account_id={} contact_id={} notify={}",
            account.id, contact_id, options.notify_user
        );
        Ok(CreatedAccount {
            account,
            newly_created: true,
        })
    }
}

impl AccountPlatform for SqliteAccountPlatform<'_> {
    fn get_account_by_id(&self, id: AccountId) -> RepoResult<Option<Account>> {
        load_account(self.conn, id)
    }

    fn get_account_by_email(&self, email: &str) -> RepoResult<Option<Account>> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Ok(None);
        }
        let account = self
            .conn
            .query_row(
                &format!("{ACCOUNT_SELECT_SQL} WHERE email = ?1;"),
                [normalized],
                parse_account_row,
            )
            .optional()?;
        account.map(validate_account).transpose()
    }

    fn get_account_by_linked_contact(&self, contact_id: ContactId) -> RepoResult<Option<Account>> {
        let account = self
            .conn
            .query_row(
                &format!("{ACCOUNT_SELECT_SQL} WHERE linked_contact_id = ?1;"),
                [contact_id],
                parse_account_row,
            )
            .optional()?;
        account.map(validate_account).transpose()
    }

    fn create_account(
        &self,
        contact_id: ContactId,
        options: &CreateAccountOptions,
    ) -> RepoResult<CreatedAccount> {
        match self.insert_from_contact(contact_id, options) {
            Ok(created) => Ok(created),
            Err(CreateAttemptError::Repo(err)) => Err(err),
            Err(CreateAttemptError::Duplicate(err)) => {
                // Another writer won between our existence check and insert.
                if !options.idempotent {
                    return Err(RepoError::Conflict(err.to_string()));
                }
                let contact_email: Option<String> = self
                    .conn
                    .query_row(
                        "SELECT email FROM contacts WHERE id = ?1;",
                        [contact_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let email = contact_email.unwrap_or_default();
                let existing = find_existing(self.conn, contact_id, email.trim())?
                    .ok_or_else(|| RepoError::Conflict(err.to_string()))?;
                Ok(CreatedAccount {
                    account: existing,
                    newly_created: false,
                })
            }
        }
    }

    fn set_account_contact_link(
        &self,
        account_id: AccountId,
        contact_id: ContactId,
    ) -> RepoResult<()> {
        let result = self.conn.execute(
            "UPDATE accounts
             SET linked_contact_id = ?1, updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![contact_id, account_id],
        );
        let changed = match result {
            Ok(changed) => changed,
            Err(err) if is_constraint_violation(&err) => {
                return Err(RepoError::Conflict(format!(
                    "contact {contact_id} is already linked to another account"
                )));
            }
            Err(err) => return Err(err.into()),
        };
        if changed == 0 {
            return Err(RepoError::NotFound("account", account_id));
        }
        Ok(())
    }
}

/// Internal split between a lost uniqueness race and every other failure.
enum CreateAttemptError {
    Duplicate(rusqlite::Error),
    Repo(RepoError),
}

impl CreateAttemptError {
    fn from_insert(err: rusqlite::Error) -> Self {
        if is_constraint_violation(&err) {
            Self::Duplicate(err)
        } else {
            Self::Repo(err.into())
        }
    }
}

impl From<RepoError> for CreateAttemptError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for CreateAttemptError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

fn find_existing(
    conn: &Connection,
    contact_id: ContactId,
    email: &str,
) -> RepoResult<Option<Account>> {
    let account = conn
        .query_row(
            &format!(
                "{ACCOUNT_SELECT_SQL}
                 WHERE linked_contact_id = ?1 OR email = ?2
                 ORDER BY (linked_contact_id = ?1) DESC, id ASC
                 LIMIT 1;"
            ),
            params![contact_id, email],
            parse_account_row,
        )
        .optional()?;
    account.map(validate_account).transpose()
}

fn load_account(conn: &Connection, id: AccountId) -> RepoResult<Option<Account>> {
    let account = conn
        .query_row(
            &format!("{ACCOUNT_SELECT_SQL} WHERE id = ?1;"),
            [id],
            parse_account_row,
        )
        .optional()?;
    account.map(validate_account).transpose()
}

struct RawAccount {
    account: Account,
    password_reset_flag: i64,
}

fn parse_account_row(row: &Row<'_>) -> rusqlite::Result<RawAccount> {
    Ok(RawAccount {
        account: Account {
            id: row.get("id")?,
            email: row.get("email")?,
            linked_contact_id: row.get("linked_contact_id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            password_reset_required: false,
        },
        password_reset_flag: row.get("password_reset_required")?,
    })
}

fn validate_account(raw: RawAccount) -> RepoResult<Account> {
    let mut account = raw.account;
    account.password_reset_required = match raw.password_reset_flag {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid password_reset_required value `{other}` in accounts.password_reset_required"
            )));
        }
    };
    Ok(account)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
