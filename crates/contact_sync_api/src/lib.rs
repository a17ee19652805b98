//! Host-facing entry points for contact/account sync.

pub mod api;

pub use api::{
    core_version, init_logging, issue_sync_token, on_contact_created, on_contact_updated, ping,
    reconcile_by_email, SyncResponse,
};
