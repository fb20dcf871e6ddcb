use std::time::Duration;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend running locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash (default: `http://localhost:8000`).
    pub backend_url: String,
    /// Timeout for plain REST calls (default: 30 s). Streaming responses are
    /// not bounded by it.
    pub request_timeout: Duration,
    /// How long a block deletion stays undoable (default: 5 s).
    pub undo_window: Duration,
}

/// A configuration variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UNDO_WINDOW_SECS: u64 = 5;

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            undo_window: Duration::from_secs(DEFAULT_UNDO_WINDOW_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `QUILL_BACKEND_URL`          | `http://localhost:8000`  |
    /// | `QUILL_REQUEST_TIMEOUT_SECS` | `30`                     |
    /// | `QUILL_UNDO_WINDOW_SECS`     | `5`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url = match lookup("QUILL_BACKEND_URL") {
            Some(url) => parse_url("QUILL_BACKEND_URL", url)?,
            None => DEFAULT_BACKEND_URL.to_string(),
        };
        let request_timeout = secs(
            &lookup,
            "QUILL_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let undo_window = secs(&lookup, "QUILL_UNDO_WINDOW_SECS", DEFAULT_UNDO_WINDOW_SECS)?;

        Ok(Self {
            backend_url,
            request_timeout,
            undo_window,
        })
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

fn parse_url(var: &'static str, raw: String) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/').to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError {
            var,
            value: raw,
            reason: "must start with http:// or https://".into(),
        });
    }
    Ok(url)
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(Duration::from_secs(default));
    };
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
