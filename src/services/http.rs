use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::ServiceError;

pub(crate) fn api_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn request_error(service: &'static str, err: reqwest::Error) -> ServiceError {
    ServiceError::RequestError {
        service,
        message: err.to_string(),
    }
}

/// Turn a non-success status into the matching error, keeping the vendor's
/// own message when the body carries one.
pub(crate) async fn check_status(
    service: &'static str,
    resp: Response,
) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = error_message(&text).unwrap_or(text);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited(service),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ServiceError::AuthError { service, message }
        }
        _ => ServiceError::ApiError {
            service,
            status: status.as_u16(),
            message,
        },
    })
}

pub(crate) async fn json_body<T: DeserializeOwned>(
    service: &'static str,
    resp: Response,
) -> Result<T, ServiceError> {
    resp.json().await.map_err(|e| ServiceError::ParseError {
        service,
        message: e.to_string(),
    })
}

/// Google: `{"error": {"message"}}`, Spotify: `{"error": {"message"}}`,
/// Notion: `{"message"}`, OAuth: `{"error", "error_description"}`.
fn error_message(text: &str) -> Option<String> {
    let body: serde_json::Value = serde_json::from_str(text).ok()?;
    body["error"]["message"]
        .as_str()
        .or_else(|| body["error_description"].as_str())
        .or_else(|| body["message"].as_str())
        .or_else(|| body["error"].as_str())
        .map(str::to_string)
}
