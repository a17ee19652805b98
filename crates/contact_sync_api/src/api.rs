//! Use-case API for the host integration.
//!
//! # Responsibility
//! - Expose the client-initiated sync request and the CRM event hooks.
//! - Convert every core error into an envelope or a log line.
//!
//! # Invariants
//! - Exported functions must not panic across the host boundary.
//! - Event hooks are fire-and-forget; only `reconcile_by_email` returns a
//!   payload.
//! - Each call opens its own connection; no request state is shared except
//!   the freshness-token registry.

use contact_sync_core::db::open_db;
use contact_sync_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AccountId, ClientSyncRequest, ReconcileError, ReconcileOutcome, Reconciler,
    SqliteAccountPlatform, SqliteContactDirectory, SyncConfig, SyncTriggers, TokenRegistry,
    SYNC_ACTION,
};
use log::{error, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::OnceLock;

const API_DB_FILE_NAME: &str = "contact_sync.sqlite3";
const DB_PATH_ENV: &str = "CONTACT_SYNC_DB_PATH";
const CONFIG_PATH_ENV: &str = "CONTACT_SYNC_CONFIG";

static API_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static API_CONFIG: OnceLock<SyncConfig> = OnceLock::new();
static TOKENS: OnceLock<TokenRegistry> = OnceLock::new();

/// Minimal health-check API.
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Core crate version.
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// Returns an empty string on success and an error message on failure.
/// Safe to call repeatedly with the same `level + log_dir`.
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Response envelope for the client-initiated sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    /// Whether an account exists for the contact after the call.
    pub ok: bool,
    /// Account id on success.
    pub account_id: Option<AccountId>,
    /// Human-readable message for the client.
    pub message: String,
}

impl SyncResponse {
    fn success(message: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            ok: true,
            account_id: Some(account_id),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            account_id: None,
            message: message.into(),
        }
    }
}

/// Issues the freshness token a client must echo back with its request.
pub fn issue_sync_token() -> String {
    tokens().issue(SYNC_ACTION)
}

/// Ensures an account exists for the contact with `email`.
///
/// # Contract
/// - Sync call; may block for the configured visibility backoff.
/// - Requires a token from `issue_sync_token`.
/// - Never panics; returns the account id on success.
pub fn reconcile_by_email(
    email: String,
    first_name: String,
    last_name: String,
    token: String,
) -> SyncResponse {
    let request = ClientSyncRequest {
        email,
        first_name,
        last_name,
        token,
    };
    let conn = match open_api_db() {
        Ok(conn) => conn,
        Err(message) => return SyncResponse::failure(message),
    };
    let result = with_triggers(&conn, |triggers| triggers.reconcile_by_email(&request));
    match result {
        Ok(Ok(outcome)) => SyncResponse::success(success_message(&outcome), outcome.account_id()),
        Ok(Err(err)) => SyncResponse::failure(failure_message(&err)),
        Err(message) => SyncResponse::failure(message),
    }
}

/// CRM creation-event hook. Fire-and-forget.
pub fn on_contact_created(account_id: Option<i64>, contact_id: i64) {
    run_hook("on_contact_created", |triggers| {
        triggers.on_contact_created(account_id, contact_id)
    });
}

/// CRM update-event hook. Fire-and-forget.
pub fn on_contact_updated(account_id: Option<i64>, contact_id: i64) {
    run_hook("on_contact_updated", |triggers| {
        triggers.on_contact_updated(account_id, contact_id)
    });
}

type ApiTriggers<'t> =
    SyncTriggers<'t, SqliteContactDirectory<'t>, SqliteAccountPlatform<'t>>;

fn run_hook(name: &str, f: impl FnOnce(&ApiTriggers<'_>)) {
    let outcome = open_api_db().and_then(|conn| with_triggers(&conn, f));
    if let Err(message) = outcome {
        error!("event=api_hook module=api status=error hook={name} error={message}");
    }
}

fn with_triggers<T>(
    conn: &Connection,
    f: impl FnOnce(&ApiTriggers<'_>) -> T,
) -> Result<T, String> {
    let config = config();
    let contacts = SqliteContactDirectory::try_new(conn)
        .map_err(|err| format!("contact directory init failed: {err}"))?;
    let platform = SqliteAccountPlatform::try_new(conn)
        .map_err(|err| format!("account platform init failed: {err}"))?;
    let reconciler = Reconciler::new(contacts, platform, config.availability);
    let triggers = SyncTriggers::new(reconciler, tokens(), config.retry);
    Ok(f(&triggers))
}

fn open_api_db() -> Result<Connection, String> {
    open_db(resolve_api_db_path()).map_err(|err| format!("sync DB open failed: {err}"))
}

fn success_message(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Created(_) => "Account created.",
        ReconcileOutcome::AlreadyLinked(_) => "Account already exists.",
    }
}

fn failure_message(err: &ReconcileError) -> String {
    match err {
        ReconcileError::InvalidInput(inner) => format!("Please check your details: {inner}."),
        ReconcileError::AuthFailed(_) => {
            "This form has expired. Reload the page and try again.".to_string()
        }
        ReconcileError::ContactNotFound(_) => {
            "We could not find your registration yet. Try again in a moment.".to_string()
        }
        ReconcileError::InvalidContact(_) => {
            "Your registration has no email address.".to_string()
        }
        ReconcileError::DependencyUnavailable(_) => {
            "Account sync is currently unavailable.".to_string()
        }
        ReconcileError::CreationFailed(_) | ReconcileError::Store(_) => {
            "Your account could not be created. Please contact support.".to_string()
        }
    }
}

fn tokens() -> &'static TokenRegistry {
    TOKENS.get_or_init(|| TokenRegistry::new(config().token_ttl()))
}

fn config() -> &'static SyncConfig {
    API_CONFIG.get_or_init(|| {
        let Ok(raw) = std::env::var(CONFIG_PATH_ENV) else {
            return SyncConfig::default();
        };
        let path = raw.trim();
        if path.is_empty() {
            return SyncConfig::default();
        }
        SyncConfig::from_path(path).unwrap_or_else(|err| {
            warn!("event=api_config module=api status=error fallback=defaults error={err}");
            SyncConfig::default()
        })
    })
}

fn resolve_api_db_path() -> PathBuf {
    API_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(API_DB_FILE_NAME)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, init_logging, issue_sync_token, on_contact_created, on_contact_updated,
        ping, reconcile_by_email, resolve_api_db_path,
    };
    use contact_sync_core::db::open_db;
    use contact_sync_core::{
        AccountPlatform, Contact, SqliteAccountPlatform, SqliteContactDirectory,
    };
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn reconcile_by_email_creates_then_reports_existing() {
        let (contact_id, email) = seed_contact("client");

        let first = reconcile_by_email(
            email.clone(),
            "Ada".to_string(),
            "Lovelace".to_string(),
            issue_sync_token(),
        );
        assert!(first.ok, "{}", first.message);
        assert_eq!(first.message, "Account created.");
        let account_id = first.account_id.expect("account id on success");

        let second = reconcile_by_email(
            email.to_uppercase(),
            "Ada".to_string(),
            "Lovelace".to_string(),
            issue_sync_token(),
        );
        assert!(second.ok, "{}", second.message);
        assert_eq!(second.message, "Account already exists.");
        assert_eq!(second.account_id, Some(account_id));

        let conn = open_db(resolve_api_db_path()).expect("open db");
        let linked: Option<i64> = conn
            .query_row(
                "SELECT linked_contact_id FROM accounts WHERE id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .expect("query account row");
        assert_eq!(linked, Some(contact_id));
    }

    #[test]
    fn reconcile_by_email_rejects_forged_token() {
        let (_, email) = seed_contact("forged");
        let response = reconcile_by_email(
            email,
            "Ada".to_string(),
            "Lovelace".to_string(),
            "forged-token".to_string(),
        );
        assert!(!response.ok);
        assert!(response.account_id.is_none());
        assert!(response.message.contains("expired"));
    }

    #[test]
    fn reconcile_by_email_rejects_malformed_email() {
        let response = reconcile_by_email(
            "nope".to_string(),
            "Ada".to_string(),
            "Lovelace".to_string(),
            issue_sync_token(),
        );
        assert!(!response.ok);
        assert!(response.message.contains("email"));
    }

    #[test]
    fn event_hooks_create_and_link_accounts() {
        let (created_id, created_email) = seed_contact("hook-created");
        on_contact_created(None, created_id);

        let (updated_id, updated_email) = seed_contact("hook-updated");
        on_contact_updated(Some(-1), updated_id);

        let conn = open_db(resolve_api_db_path()).expect("open db");
        let platform = SqliteAccountPlatform::try_new(&conn).expect("platform");
        for (contact_id, email) in [(created_id, created_email), (updated_id, updated_email)] {
            let account = platform
                .get_account_by_email(&email)
                .expect("account lookup")
                .expect("hook should create account");
            assert_eq!(account.linked_contact_id, Some(contact_id));
        }
    }

    fn seed_contact(prefix: &str) -> (i64, String) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        let contact_id = (nanos % 1_000_000_000_000) as i64;
        let email = format!("{prefix}-{nanos}@example.com");

        let conn = open_db(resolve_api_db_path()).expect("open db");
        SqliteContactDirectory::try_new(&conn)
            .expect("contact directory")
            .upsert_contact(&Contact::new(contact_id, email.clone(), "Ada", "Lovelace"))
            .expect("seed contact");
        (contact_id, email)
    }
}
