//! HTTP plumbing shared by the remote backends.

use std::time::Duration;

use gradeforge_core::error::{BackendError, ConfigurationError};

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ConfigurationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigurationError::InvalidValue {
            field: "http_client".into(),
            message: e.to_string(),
        })
}

pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout_secs)
    } else {
        BackendError::NetworkError(e.to_string())
    }
}

/// Map non-success statuses onto [`BackendError`], passing 2xx responses through.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(BackendError::RateLimited {
            retry_after_ms: retry_after,
        });
    }
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::AuthenticationFailed(error_message(&body)));
    }
    if status == 404 {
        return Err(BackendError::ModelNotFound(model.to_string()));
    }
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::ApiError {
            status,
            message: error_message(&body),
        });
    }
    Ok(response)
}

/// Pull the human-readable message out of an error body.
///
/// Understands `{"error": {"message": ..}}` and `{"error": ".."}`; anything
/// else is returned verbatim.
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| match v.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(obj) => obj.get("message").and_then(|m| m.as_str()).map(String::from),
        None => None,
    });
    message.unwrap_or_else(|| body.to_string())
}

pub(crate) fn decode_error(e: reqwest::Error) -> BackendError {
    BackendError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
