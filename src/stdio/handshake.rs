//! Backend handshake.
//!
//! The first line a backend writes to stdout declares its configuration:
//!
//! ```json
//! {"longest-key": 4, "max-latency-ms": 250, "untranslate": true}
//! ```
//!
//! `longest-key` is mandatory and must be a positive integer.
//! `max-latency-ms` defaults to `null` (no ceiling) and may be an integer or
//! a float; when present it must be positive. `untranslate` defaults to
//! `false`. Any violation is a [`AppError::Startup`]: the backend is never
//! used.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{AppError, Result};

/// Backend configuration declared by the handshake line.
///
/// Read once before the first request and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Maximum number of strokes the backend consumes in one translation.
    pub longest_key: usize,
    /// Per-request latency ceiling; `None` waits without bound.
    pub max_latency: Option<Duration>,
    /// Whether the backend answers untranslate requests.
    pub untranslate: bool,
}

impl Configuration {
    /// Parse and validate a handshake line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Startup`] if the line is not a JSON object,
    /// `longest-key` is absent or not a positive integer, `max-latency-ms`
    /// is not a positive number or `null`, or `untranslate` is not a
    /// boolean.
    pub fn from_handshake_line(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| AppError::Startup(format!("handshake is not valid json: {e}")))?;

        let Value::Object(fields) = value else {
            return Err(AppError::Startup(
                "handshake must be a json object".into(),
            ));
        };

        Ok(Self {
            longest_key: longest_key(&fields)?,
            max_latency: max_latency(&fields)?,
            untranslate: untranslate(&fields)?,
        })
    }
}

/// Read the handshake from the first stdout line.
///
/// Exactly one line is read; a blank line is not valid JSON and fails.
///
/// `timeout` bounds the whole read; `None` waits until the backend writes a
/// line or closes stdout.
///
/// # Errors
///
/// - [`AppError::Startup`]`("backend exited before handshake")` on EOF.
/// - [`AppError::Startup`]`("handshake timeout …")` if `timeout` elapses.
/// - [`AppError::Startup`] wrapping framing errors or an invalid handshake.
pub async fn read_handshake<S>(
    dictionary: &str,
    stdout: &mut S,
    timeout: Option<Duration>,
) -> Result<Configuration>
where
    S: Stream<Item = Result<String>> + Unpin,
{
    let line = match timeout {
        Some(limit) => tokio::time::timeout(limit, first_line(stdout))
            .await
            .map_err(|_| {
                AppError::Startup(format!(
                    "handshake timeout: {dictionary} wrote nothing within {limit:?}"
                ))
            })??,
        None => first_line(stdout).await?,
    };

    debug!(dictionary, raw_line = line.as_str(), "handshake line received");
    let config = Configuration::from_handshake_line(&line)?;

    info!(
        dictionary,
        longest_key = config.longest_key,
        max_latency = ?config.max_latency,
        untranslate = config.untranslate,
        "handshake complete"
    );
    Ok(config)
}

// ── Private helpers ───────────────────────────────────────────────────────────

async fn first_line<S>(stdout: &mut S) -> Result<String>
where
    S: Stream<Item = Result<String>> + Unpin,
{
    match stdout.next().await {
        None => Err(AppError::Startup("backend exited before handshake".into())),
        Some(Err(e)) => Err(AppError::Startup(format!("handshake read failed: {e}"))),
        Some(Ok(line)) => Ok(line),
    }
}

fn longest_key(fields: &Map<String, Value>) -> Result<usize> {
    let raw = fields
        .get("longest-key")
        .ok_or_else(|| AppError::Startup("handshake is missing `longest-key`".into()))?;

    raw.as_u64()
        .filter(|&n| n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| AppError::Startup(format!("`longest-key` is not a valid value: {raw}")))
}

fn max_latency(fields: &Map<String, Value>) -> Result<Option<Duration>> {
    match fields.get("max-latency-ms") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) if raw.is_u64() => raw
            .as_u64()
            .filter(|&ms| ms > 0)
            .map(|ms| Some(Duration::from_millis(ms)))
            .ok_or_else(|| {
                AppError::Startup(format!("`max-latency-ms` is not a valid value: {raw}"))
            }),
        Some(raw) => raw
            .as_f64()
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .map(|ms| Some(Duration::from_secs_f64(ms / 1000.0)))
            .ok_or_else(|| {
                AppError::Startup(format!("`max-latency-ms` is not a valid value: {raw}"))
            }),
    }
}

fn untranslate(fields: &Map<String, Value>) -> Result<bool> {
    match fields.get("untranslate") {
        None => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(raw) => Err(AppError::Startup(format!(
            "`untranslate` must be a boolean, got {raw}"
        ))),
    }
}
