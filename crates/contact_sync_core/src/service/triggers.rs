//! Trigger adapters feeding the reconciler.
//!
//! # Responsibility
//! - Translate CRM creation/update events and client sync requests into
//!   reconcile calls.
//! - Own the per-trigger wait policy; the reconciler itself never retries.
//! - Catch every failure at this boundary: hooks log, the client path
//!   returns a `ReconcileResult` for the caller's envelope.
//!
//! # Invariants
//! - Each trigger calls `reconcile` exactly once.
//! - The client path verifies its freshness token and sanitizes input before
//!   touching either store.

use crate::input::validate_sync_request;
use crate::logging::mask_email;
use crate::model::account::AccountId;
use crate::model::contact::ContactId;
use crate::repo::account_repo::AccountPlatform;
use crate::repo::contact_repo::ContactDirectory;
use crate::retry::{poll_with_backoff, RetryPolicy};
use crate::service::reconciler::{Locator, ReconcileResult, Reconciler};
use crate::token::{TokenRegistry, SYNC_ACTION};
use log::{debug, error, info, warn};
use std::time::Duration;

/// Raw fields of a client-initiated sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSyncRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Freshness token previously issued for `SYNC_ACTION`.
    pub token: String,
}

/// Treats empty, zero and negative event account ids as absent.
pub fn normalize_event_account_id(raw: Option<i64>) -> Option<AccountId> {
    raw.filter(|id| *id > 0)
}

/// The three trigger points, sharing one reconciler.
pub struct SyncTriggers<'t, C: ContactDirectory, P: AccountPlatform> {
    reconciler: Reconciler<C, P>,
    tokens: &'t TokenRegistry,
    retry: RetryPolicy,
    sleep: fn(Duration),
}

impl<'t, C: ContactDirectory, P: AccountPlatform> SyncTriggers<'t, C, P> {
    pub fn new(reconciler: Reconciler<C, P>, tokens: &'t TokenRegistry, retry: RetryPolicy) -> Self {
        Self {
            reconciler,
            tokens,
            retry,
            sleep: std::thread::sleep,
        }
    }

    /// Replaces the blocking sleep used between visibility probes.
    pub fn with_sleeper(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn reconciler(&self) -> &Reconciler<C, P> {
        &self.reconciler
    }

    /// Creation-event hook: the CRM has committed the contact already.
    pub fn on_contact_created(&self, account_id: Option<i64>, contact_id: ContactId) {
        debug!(
            "event=hook_contact_created module=triggers status=start contact_id={} event_account_id={}",
            contact_id,
            account_id.map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        let result = self.reconciler.reconcile(&Locator::ContactId(contact_id));
        log_hook_result("hook_contact_created", contact_id, &result);
    }

    /// Update-event hook: the carried account id may be empty or stale.
    pub fn on_contact_updated(&self, account_id: Option<i64>, contact_id: ContactId) {
        let locator = Locator::Pair {
            account_id: normalize_event_account_id(account_id),
            contact_id,
        };
        let result = self.reconciler.reconcile(&locator);
        log_hook_result("hook_contact_updated", contact_id, &result);
    }

    /// Client-initiated sync by email.
    ///
    /// Waits for the contact to become readable using the configured
    /// backoff, then reconciles once.
    pub fn reconcile_by_email(&self, request: &ClientSyncRequest) -> ReconcileResult {
        self.tokens.verify(SYNC_ACTION, &request.token).map_err(|err| {
            warn!(
                "event=client_sync module=triggers status=error error_code=auth_failed reason={}",
                err
            );
            err
        })?;
        let sync_request = validate_sync_request(
            &request.email,
            &request.first_name,
            &request.last_name,
        )
        .map_err(|err| {
            info!(
                "event=client_sync module=triggers status=error error_code=invalid_input reason={}",
                err
            );
            err
        })?;
        self.reconciler.ensure_available()?;

        let poll = poll_with_backoff(&self.retry, self.sleep, || {
            self.reconciler.find_contact_by_email(&sync_request.email)
        })?;
        debug!(
            "event=client_sync_wait module=triggers status={} attempts={} waited_ms={} email={}",
            if poll.value.is_some() { "ok" } else { "timeout" },
            poll.attempts,
            poll.waited.as_millis(),
            mask_email(&sync_request.email)
        );

        let result = self
            .reconciler
            .reconcile(&Locator::Email(sync_request.email.clone()));
        match &result {
            Ok(outcome) => info!(
                "event=client_sync module=triggers status=ok outcome={} account_id={}",
                outcome.label(),
                outcome.account_id()
            ),
            Err(err) => warn!(
                "event=client_sync module=triggers status=error error_code={} error={}",
                err.code(),
                err
            ),
        }
        result
    }
}

fn log_hook_result(event: &str, contact_id: ContactId, result: &ReconcileResult) {
    match result {
        Ok(outcome) => info!(
            "event={} module=triggers status=ok outcome={} account_id={} contact_id={}",
            event,
            outcome.label(),
            outcome.account_id(),
            contact_id
        ),
        Err(err) => error!(
            "event={} module=triggers status=error error_code={} contact_id={} error={}",
            event,
            err.code(),
            contact_id,
            err
        ),
    }
}
