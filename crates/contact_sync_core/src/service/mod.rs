//! Reconciliation use-cases.
//!
//! # Responsibility
//! - Orchestrate contact/account collaborators into the idempotent upsert.
//! - Adapt CRM events and client requests to that single procedure.

pub mod reconciler;
pub mod triggers;
