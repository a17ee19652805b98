//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `contact_sync_core` linkage.
//! - Run one reconcile round-trip against an in-memory store.
//! - Keep output deterministic for quick local sanity checks.

use contact_sync_core::db::open_db_in_memory;
use contact_sync_core::{
    Availability, Contact, Locator, Reconciler, SqliteAccountPlatform, SqliteContactDirectory,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("contact_sync_core ping={}", contact_sync_core::ping());
    println!("contact_sync_core version={}", contact_sync_core::core_version());

    match smoke_reconcile() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke reconcile failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn smoke_reconcile() -> Result<(), Box<dyn Error>> {
    let conn = open_db_in_memory()?;
    let contacts = SqliteContactDirectory::try_new(&conn)?;
    contacts.upsert_contact(&Contact::new(42, "a@x.com", "A", "X"))?;

    let reconciler = Reconciler::new(
        contacts,
        SqliteAccountPlatform::try_new(&conn)?,
        Availability::all_active(),
    );
    for locator in [
        Locator::ContactId(42),
        Locator::Email("a@x.com".to_string()),
    ] {
        let outcome = reconciler.reconcile(&locator)?;
        println!(
            "reconcile {locator} outcome={} account_id={}",
            outcome.label(),
            outcome.account_id()
        );
    }
    Ok(())
}
