//! CRM contact record.
//!
//! # Responsibility
//! - Mirror the CRM attributes the reconciler reads.
//!
//! # Invariants
//! - Contacts are read-only to this crate outside CRM-side fixtures.
//! - A contact without an email cannot be keyed to an account.

use serde::{Deserialize, Serialize};

/// CRM-assigned contact identifier.
pub type ContactId = i64;

/// CRM-side identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl Contact {
    pub fn new(
        id: ContactId,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Returns whether the contact carries a usable email.
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}
