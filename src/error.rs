use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("api error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Message suitable for showing to a user.
    ///
    /// Backend failures carry a JSON body; its `detail` field wins over `message`. Without either the
    /// error's own description is used, and an empty description falls back to a dump of the body.
    pub fn display_message(&self) -> String {
        match self {
            Error::Api { status, body } => {
                let parsed = serde_json::from_str::<Value>(body).ok();
                let fallback = format!("request failed with status code {}", status.as_u16());
                extract_error_message(parsed.as_ref(), &fallback)
            }
            other => extract_error_message(None, &other.to_string()),
        }
    }
}

pub(crate) fn extract_error_message(body: Option<&Value>, fallback: &str) -> String {
    if let Some(body) = body {
        for field in ["detail", "message"] {
            match body.get(field) {
                None | Some(Value::Null) => continue,
                Some(Value::String(text)) if text.trim().is_empty() => continue,
                Some(Value::String(text)) => return text.clone(),
                Some(other) => return other.to_string(),
            }
        }
    }

    if !fallback.trim().is_empty() {
        return fallback.to_string();
    }

    match body {
        Some(body) => body.to_string(),
        None => "unknown error".to_string(),
    }
}
