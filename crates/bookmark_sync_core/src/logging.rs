//! Process-wide logging bootstrap.
//!
//! Diagnostics go to stderr so that stdout stays reserved for command output.
//! Messages use the `event=<name> key=value` shape throughout the crate.

use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use flexi_logger::{Logger, LoggerHandle};
use log::debug;

pub const LOG_LEVEL_ENV: &str = "BOOKMARK_SYNC_LOG";

static LOGGING_STATE: OnceLock<LoggingState> = OnceLock::new();

struct LoggingState {
    level: &'static str,
    _logger: LoggerHandle,
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub fn normalize_level(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" => Ok("off"),
        other => bail!("unsupported log level `{other}`; expected trace|debug|info|warn|error|off"),
    }
}

/// Start the stderr logger once per process.
///
/// Repeating the call with the same level is a no-op. A different level after
/// the logger is running is rejected.
pub fn init_logging(level: &str) -> Result<()> {
    let level = normalize_level(level)?;

    if let Some(state) = LOGGING_STATE.get() {
        if state.level != level {
            bail!(
                "logging already initialized with level `{}`; refusing to switch to `{level}`",
                state.level
            );
        }
        return Ok(());
    }

    let logger = Logger::try_with_str(level)
        .with_context(|| format!("invalid log level `{level}`"))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("failed to start logger")?;

    if LOGGING_STATE
        .set(LoggingState {
            level,
            _logger: logger,
        })
        .is_err()
    {
        bail!("logging initialized concurrently");
    }

    debug!(
        "event=logging_init status=ok level={level} version={}",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

pub fn logging_level() -> Option<&'static str> {
    LOGGING_STATE.get().map(|state| state.level)
}
