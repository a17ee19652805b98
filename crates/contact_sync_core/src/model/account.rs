//! Application account record.
//!
//! # Responsibility
//! - Describe the platform-side identity and its optional contact link.
//! - Carry the fixed creation options used by reconciliation.
//!
//! # Invariants
//! - `email` is unique across accounts (case-insensitive).
//! - `linked_contact_id`, once set, is unique across accounts.

use crate::model::contact::ContactId;
use serde::{Deserialize, Serialize};

/// Platform-assigned account identifier.
pub type AccountId = i64;

/// Application-side identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    /// Back-reference to the CRM contact this account was keyed from.
    pub linked_contact_id: Option<ContactId>,
    pub first_name: String,
    pub last_name: String,
    pub password_reset_required: bool,
}

impl Account {
    /// Returns whether the back-reference already points at `contact_id`.
    pub fn is_linked_to(&self, contact_id: ContactId) -> bool {
        self.linked_contact_id == Some(contact_id)
    }
}

/// Options passed to the platform's account creation routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountOptions {
    /// Require a password change on first login.
    pub force_password_reset: bool,
    /// Send the platform's default new-account notification.
    pub notify_user: bool,
    /// Roles granted in addition to the platform default.
    pub extra_roles: Vec<String>,
    /// Return an existing account instead of failing on duplicates.
    pub idempotent: bool,
}

impl CreateAccountOptions {
    /// Fixed options used whenever reconciliation creates an account.
    pub fn for_reconcile() -> Self {
        Self {
            force_password_reset: false,
            notify_user: true,
            extra_roles: Vec::new(),
            idempotent: true,
        }
    }
}

/// Result of an account creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAccount {
    pub account: Account,
    /// `false` when idempotent mode found an existing account.
    pub newly_created: bool,
}

#[cfg(test)]
mod tests {
    use super::CreateAccountOptions;

    #[test]
    fn reconcile_options_are_fixed() {
        let options = CreateAccountOptions::for_reconcile();
        assert!(!options.force_password_reset);
        assert!(options.notify_user);
        assert!(options.extra_roles.is_empty());
        assert!(options.idempotent);
    }
}
