//! Freshness tokens guarding the client-initiated sync request.
//!
//! # Responsibility
//! - Issue random tokens bound to an action name with a lifetime.
//! - Verify a token echoed back by a client before any work is done.
//!
//! # Invariants
//! - Tokens are reusable until they expire.
//! - A token issued for one action never verifies for another.
//! - Expired tokens are pruned whenever a new token is issued.

use log::debug;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Action name for the reconcile-by-email request.
pub const SYNC_ACTION: &str = "contact_sync";

/// Token verification failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Missing,
    Unknown,
    WrongAction { expected: String },
    Expired,
}

impl Display for TokenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "freshness token is missing"),
            Self::Unknown => write!(f, "freshness token is not recognized"),
            Self::WrongAction { expected } => {
                write!(f, "freshness token was not issued for `{expected}`")
            }
            Self::Expired => write!(f, "freshness token has expired"),
        }
    }
}

impl Error for TokenError {}

#[derive(Debug, Clone)]
struct IssuedToken {
    action: String,
    expires_at: Instant,
}

/// In-process registry of issued freshness tokens.
#[derive(Debug)]
pub struct TokenRegistry {
    ttl: Duration,
    issued: Mutex<HashMap<String, IssuedToken>>,
}

impl TokenRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a token for `action` valid for the configured lifetime.
    pub fn issue(&self, action: &str) -> String {
        self.issue_at(action, Instant::now())
    }

    /// Verifies that `token` was issued for `action` and is still fresh.
    pub fn verify(&self, action: &str, token: &str) -> Result<(), TokenError> {
        self.verify_at(action, token, Instant::now())
    }

    /// Number of tokens currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn issue_at(&self, action: &str, now: Instant) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut issued = self.lock();
        let before = issued.len();
        issued.retain(|_, entry| entry.expires_at > now);
        let pruned = before - issued.len();
        if pruned > 0 {
            debug!("event=token_prune module=token status=ok pruned={pruned}");
        }
        issued.insert(
            token.clone(),
            IssuedToken {
                action: action.to_string(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    fn verify_at(&self, action: &str, token: &str, now: Instant) -> Result<(), TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }
        let issued = self.lock();
        let entry = issued.get(token).ok_or(TokenError::Unknown)?;
        if entry.action != action {
            return Err(TokenError::WrongAction {
                expected: action.to_string(),
            });
        }
        if entry.expires_at <= now {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IssuedToken>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenError, TokenRegistry, SYNC_ACTION};
    use std::time::{Duration, Instant};

    #[test]
    fn issued_token_verifies_repeatedly_until_expiry() {
        let registry = TokenRegistry::new(Duration::from_secs(60));
        let now = Instant::now();
        let token = registry.issue_at(SYNC_ACTION, now);

        registry
            .verify_at(SYNC_ACTION, &token, now)
            .expect("fresh token");
        registry
            .verify_at(SYNC_ACTION, &token, now + Duration::from_secs(59))
            .expect("token is reusable");
        assert_eq!(
            registry.verify_at(SYNC_ACTION, &token, now + Duration::from_secs(60)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn rejects_missing_unknown_and_foreign_tokens() {
        let registry = TokenRegistry::new(Duration::from_secs(60));
        let token = registry.issue("other_action");

        assert_eq!(registry.verify(SYNC_ACTION, "  "), Err(TokenError::Missing));
        assert_eq!(
            registry.verify(SYNC_ACTION, "forged"),
            Err(TokenError::Unknown)
        );
        assert!(matches!(
            registry.verify(SYNC_ACTION, &token),
            Err(TokenError::WrongAction { .. })
        ));
    }

    #[test]
    fn issuing_prunes_expired_tokens() {
        let registry = TokenRegistry::new(Duration::from_secs(1));
        let now = Instant::now();
        registry.issue_at(SYNC_ACTION, now);
        registry.issue_at(SYNC_ACTION, now);
        assert_eq!(registry.len(), 2);

        registry.issue_at(SYNC_ACTION, now + Duration::from_secs(2));
        assert_eq!(registry.len(), 1);
    }
}
