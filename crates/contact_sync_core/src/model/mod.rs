//! Identity records shared by the CRM and the account platform.
//!
//! # Responsibility
//! - Define the Contact (CRM-side) and Account (platform-side) shapes.
//! - Keep email comparison rules in one place.
//!
//! # Invariants
//! - At most one Account exists per Contact and per email address.
//! - A back-reference is only set while both emails match.

pub mod account;
pub mod contact;

/// Normalizes an email for identity comparison (trimmed, lowercase).
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Returns whether two emails identify the same mailbox.
pub fn emails_match(left: &str, right: &str) -> bool {
    let left = normalize_email(left);
    !left.is_empty() && left == normalize_email(right)
}
