use reqwest::StatusCode;
use thiserror::Error;

pub const GENERIC_SAVE_FAILURE: &str = "Saving failed. Please try again.";
pub const GENERIC_DELETE_FAILURE: &str = "Deleting failed. Please try again.";
pub const GENERIC_LOAD_FAILURE: &str = "Loading data failed. Please try again.";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential missing or rejected. The session has already been cleared.
    #[error("not authorized; log in again")]
    Unauthorized,
    /// Login refused the username or password. No session is touched.
    #[error("invalid credentials")]
    InvalidCredentials(Option<String>),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected ({status})")]
    Rejected {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("network failure: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response payload: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Message for the user: backend detail when the backend sent one,
    /// otherwise the caller's fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            GatewayError::Unauthorized => "Your session has ended. Please log in again.".to_string(),
            GatewayError::NotFound(detail) => detail.clone(),
            GatewayError::InvalidCredentials(Some(detail)) => detail.clone(),
            GatewayError::Rejected {
                detail: Some(detail),
                ..
            } => detail.clone(),
            GatewayError::Rejected { detail: None, .. }
            | GatewayError::InvalidCredentials(None)
            | GatewayError::Network(_)
            | GatewayError::Decode(_) => fallback.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err)
        }
    }
}

/// Pulls a readable message out of a backend error body.
///
/// The backend answers `{"detail": "..."}` for business rule failures and
/// `{"detail": [{"msg": "...", ...}]}` for schema validation failures.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(|msg| msg.as_str()))
            .map(str::to_string),
        _ => None,
    }
}
