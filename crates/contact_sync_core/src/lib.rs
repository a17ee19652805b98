//! Core logic for contact/account synchronization.
//! This crate owns the reconciliation invariants; hosts only wire triggers.

pub mod availability;
pub mod config;
pub mod db;
pub mod input;
pub mod logging;
pub mod model;
pub mod repo;
pub mod retry;
pub mod service;
pub mod token;

pub use availability::{Availability, Dependency};
pub use config::{ConfigError, SyncConfig};
pub use input::{InputError, SyncRequest};
pub use logging::{init_logging, mask_email, LoggingError};
pub use model::account::{Account, AccountId, CreateAccountOptions, CreatedAccount};
pub use model::contact::{Contact, ContactId};
pub use repo::account_repo::{AccountNotification, AccountPlatform, SqliteAccountPlatform};
pub use repo::contact_repo::{ContactDirectory, SqliteContactDirectory};
pub use repo::{RepoError, RepoResult};
pub use retry::RetryPolicy;
pub use service::reconciler::{
    Locator, ReconcileError, ReconcileOutcome, ReconcileResult, Reconciler,
};
pub use service::triggers::{ClientSyncRequest, SyncTriggers};
pub use token::{TokenError, TokenRegistry, SYNC_ACTION};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
