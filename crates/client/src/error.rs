use quill_core::error::CoreError;
use serde::Deserialize;

use crate::config::ConfigError;

/// Errors from the Quill client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// `detail` from the error body, or the raw body.
        message: String,
    },

    /// A 2xx body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A domain-level error from `quill_core`.
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::Api { status: 404, .. } | ClientError::Core(CoreError::NotFound { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// Error body parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ErrorBody {
    detail: Detail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    Validation(Vec<ValidationItem>),
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct ValidationItem {
    msg: String,
}

/// Human-readable message for a failed response body.
///
/// The backend reports `{"detail": "..."}` for handled errors and
/// `{"detail": [{"msg": "..."}, ...]}` for request validation failures; the
/// latter are joined with `"; "`. Anything else is returned verbatim.
pub(crate) fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Detail::Message(msg),
        }) => msg,
        Ok(ErrorBody {
            detail: Detail::Validation(items),
        }) => items
            .into_iter()
            .map(|i| i.msg)
            .collect::<Vec<_>>()
            .join("; "),
        Ok(ErrorBody {
            detail: Detail::Other(value),
        }) => value.to_string(),
        Err(_) if body.trim().is_empty() => "<empty body>".to_string(),
        Err(_) => body.to_string(),
    }
}
