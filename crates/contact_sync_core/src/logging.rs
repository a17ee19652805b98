//! Process-wide logging for the sync core.
//!
//! Log lines are metadata only: ids, codes and masked emails. Contact names
//! never reach a log file.
//!
//! # Invariants
//! - The backend starts at most once per process; later calls must repeat
//!   the same settings.
//! - Initialization never panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info, LevelFilter};
use once_cell::sync::{Lazy, OnceCell};
use regex::{Captures, Regex};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;

const LOG_FILE_BASENAME: &str = "contact_sync";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_PAYLOAD_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: Once = Once::new();
static EMAIL_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\s@<>()]+@[^\s@<>()]+").expect("valid email scan regex"));

/// Requested logging settings after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: LevelFilter,
    dir: PathBuf,
}

impl LogSettings {
    fn parse(level: &str, log_dir: &str) -> Result<Self, LoggingError> {
        let level = match level.trim() {
            "" => return Err(LoggingError::Level(String::new())),
            raw if raw.eq_ignore_ascii_case("warning") => LevelFilter::Warn,
            raw => LevelFilter::from_str(raw)
                .map_err(|_| LoggingError::Level(raw.to_string()))?,
        };
        let dir = PathBuf::from(log_dir.trim());
        if dir.as_os_str().is_empty() || !dir.is_absolute() {
            return Err(LoggingError::Dir(log_dir.trim().to_string()));
        }
        Ok(Self { level, dir })
    }

    fn spec(&self) -> String {
        self.level.as_str().to_ascii_lowercase()
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Logging bootstrap failures.
#[derive(Debug)]
pub enum LoggingError {
    Level(String),
    Dir(String),
    CreateDir(PathBuf, std::io::Error),
    Backend(String),
    /// Logging is already running with different settings.
    Reconfigure { active: String, requested: String },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Level(raw) => write!(
                f,
                "unsupported log level `{raw}`; expected off|error|warn|info|debug|trace"
            ),
            Self::Dir(raw) => write!(f, "log directory must be an absolute path, got `{raw}`"),
            Self::CreateDir(dir, err) => {
                write!(f, "cannot create log directory `{}`: {err}", dir.display())
            }
            Self::Backend(reason) => write!(f, "logger backend failed to start: {reason}"),
            Self::Reconfigure { active, requested } => write!(
                f,
                "logging already active with {active}; refusing to switch to {requested}"
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir(_, err) => Some(err),
            _ => None,
        }
    }
}

/// Starts rolling file logs under `log_dir` at `level`.
///
/// Repeating the call with the same settings is a no-op; any other settings
/// are rejected with [`LoggingError::Reconfigure`].
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = LogSettings::parse(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start_backend(&requested))?;
    if active.settings != requested {
        return Err(LoggingError::Reconfigure {
            active: describe(&active.settings),
            requested: describe(&requested),
        });
    }
    Ok(())
}

fn start_backend(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir)
        .map_err(|err| LoggingError::CreateDir(settings.dir.clone(), err))?;

    let handle = Logger::try_with_str(settings.spec())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    PANIC_HOOK.call_once(install_panic_hook);
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} version={}",
        settings.spec(),
        settings.dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn describe(settings: &LogSettings) -> String {
    format!("level={} dir=`{}`", settings.spec(), settings.dir.display())
}

fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            scrub_payload(&payload)
        );
        previous(info);
    }));
}

/// Flattens a panic payload onto one line, masks emails and caps its length.
fn scrub_payload(payload: &str) -> String {
    let flat = payload.replace(['\n', '\r'], " ");
    let masked = EMAIL_IN_TEXT.replace_all(&flat, |caps: &Captures<'_>| mask_email(&caps[0]));
    let mut scrubbed: String = masked.chars().take(PANIC_PAYLOAD_LIMIT).collect();
    if masked.chars().count() > PANIC_PAYLOAD_LIMIT {
        scrubbed.push_str("...");
    }
    scrubbed
}

/// Masks an email for log output: `ada@example.com` -> `a***@example.com`.
///
/// Values without a local part are fully masked.
pub fn mask_email(email: &str) -> String {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        _ if trimmed.is_empty() => "<empty>".to_string(),
        _ => "***".to_string(),
    }
}
