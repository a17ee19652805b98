//! Validation and sanitation of client-supplied sync input.
//!
//! # Responsibility
//! - Strip markup and control characters from free-text fields.
//! - Normalize and validate email addresses.
//! - Build a `SyncRequest` or report which field is unusable.
//!
//! # Invariants
//! - A `SyncRequest` always holds a syntactically valid email and non-empty
//!   first and last names of at most `MAX_NAME_CHARS` characters.

use crate::model::normalize_email;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Longest first/last name accepted from a client.
pub const MAX_NAME_CHARS: usize = 100;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));
static EMAIL_DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9.!#$%&'*+/=?^_`{|}~@-]").expect("valid email charset regex")
});
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("valid email regex")
});

/// Sanitized request for the client-initiated sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Lowercased, validated email.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Client input rejected before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    MissingField(&'static str),
    InvalidEmail(String),
    TooLong { field: &'static str, max_chars: usize },
}

impl Display for InputError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "{field} is required"),
            Self::InvalidEmail(value) => write!(f, "email is not valid: `{value}`"),
            Self::TooLong { field, max_chars } => {
                write!(f, "{field} must be at most {max_chars} characters")
            }
        }
    }
}

impl Error for InputError {}

/// Removes tags and control characters, collapses whitespace and trims.
pub fn sanitize_text_field(value: &str) -> String {
    let without_tags = TAG_RE.replace_all(value, " ");
    let without_controls = without_tags
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>();
    WHITESPACE_RE
        .replace_all(&without_controls, " ")
        .trim()
        .to_string()
}

/// Drops characters that cannot appear in an address and lowercases it.
pub fn sanitize_email(value: &str) -> String {
    let stripped = EMAIL_DISALLOWED_RE.replace_all(value.trim(), "");
    normalize_email(&stripped)
}

/// Conservative `local@domain.tld` check.
pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

/// Validates and sanitizes raw client fields.
pub fn validate_sync_request(
    email: &str,
    first_name: &str,
    last_name: &str,
) -> Result<SyncRequest, InputError> {
    if email.trim().is_empty() {
        return Err(InputError::MissingField("email"));
    }
    let sanitized_email = sanitize_email(email);
    if !is_valid_email(&sanitized_email) {
        return Err(InputError::InvalidEmail(sanitized_email));
    }

    let first_name = required_name("first_name", first_name)?;
    let last_name = required_name("last_name", last_name)?;

    Ok(SyncRequest {
        email: sanitized_email,
        first_name,
        last_name,
    })
}

fn required_name(field: &'static str, raw: &str) -> Result<String, InputError> {
    let value = sanitize_text_field(raw);
    if value.is_empty() {
        return Err(InputError::MissingField(field));
    }
    if value.chars().count() > MAX_NAME_CHARS {
        return Err(InputError::TooLong {
            field,
            max_chars: MAX_NAME_CHARS,
        });
    }
    Ok(value)
}
