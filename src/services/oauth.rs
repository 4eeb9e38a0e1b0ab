//! OAuth 2.0 plumbing shared by the Google and Spotify sign-in flows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info};
use url::Url;

use super::ServiceError;
use super::http::{check_status, json_body, request_error};

/// Token endpoint reply for the code, refresh and client-credentials grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Client authentication at the token endpoint.
pub enum ClientAuth<'a> {
    /// `client_id` / `client_secret` in the form body (Google).
    Form { client_id: &'a str, client_secret: &'a str },
    /// HTTP Basic header (Spotify).
    Basic { client_id: &'a str, client_secret: &'a str },
}

/// POST a grant to `token_url` and parse the token reply.
pub async fn request_token(
    client: &Client,
    service: &'static str,
    token_url: &str,
    auth: ClientAuth<'_>,
    grant: &[(&str, &str)],
) -> Result<TokenResponse, ServiceError> {
    let mut form: Vec<(&str, &str)> = grant.to_vec();
    let mut req = client.post(token_url);
    match auth {
        ClientAuth::Form {
            client_id,
            client_secret,
        } => {
            form.push(("client_id", client_id));
            form.push(("client_secret", client_secret));
        }
        ClientAuth::Basic {
            client_id,
            client_secret,
        } => {
            req = req.basic_auth(client_id, Some(client_secret));
        }
    }

    debug!(service, token_url, "Requesting OAuth token");
    let resp = req
        .form(&form)
        .send()
        .await
        .map_err(|e| request_error(service, e))?;

    // Token endpoints answer 400 for bad or revoked grants.
    let resp = match check_status(service, resp).await {
        Ok(resp) => resp,
        Err(ServiceError::ApiError {
            status: 400,
            message,
            ..
        }) => return Err(ServiceError::AuthError { service, message }),
        Err(e) => return Err(e),
    };
    json_body(service, resp).await
}

/// Build a consent URL with properly encoded query parameters.
pub fn authorize_url(
    service: &'static str,
    base: &str,
    params: &[(&str, &str)],
) -> Result<String, ServiceError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| ServiceError::ParseError {
            service,
            message: format!("invalid authorize URL {base}: {e}"),
        })
}

/// Pull the authorization code out of a redirect URL (absolute, or the
/// request target of the local redirect server).
pub fn extract_code(
    service: &'static str,
    redirect: &str,
    expected_state: Option<&str>,
) -> Result<String, ServiceError> {
    let base = Url::parse("http://localhost/").map_err(|e| ServiceError::ParseError {
        service,
        message: e.to_string(),
    })?;
    let url = base
        .join(redirect.trim())
        .map_err(|e| ServiceError::ParseError {
            service,
            message: format!("invalid redirect URL: {e}"),
        })?;

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    code_from_params(service, &params, expected_state)
}

/// Check a redirect's query parameters: consent errors first, then `state`,
/// then the presence of `code`.
fn code_from_params(
    service: &'static str,
    params: &HashMap<String, String>,
    expected_state: Option<&str>,
) -> Result<String, ServiceError> {
    if let Some(error) = params.get("error") {
        return Err(ServiceError::AuthError {
            service,
            message: format!("authorization denied: {error}"),
        });
    }
    if let Some(expected) = expected_state {
        if params.get("state").map(String::as_str) != Some(expected) {
            return Err(ServiceError::AuthError {
                service,
                message: "state mismatch in OAuth redirect".into(),
            });
        }
    }
    params.get("code").cloned().ok_or_else(|| ServiceError::AuthError {
        service,
        message: "no authorization code in redirect URL".into(),
    })
}

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";

/// One-shot loopback server that receives the browser redirect of an
/// installed-app consent flow.
pub struct RedirectListener {
    listener: TcpListener,
    port: u16,
}

/// Shared with the `/` handler while waiting for the redirect.
struct PendingRedirect {
    service: &'static str,
    expected_state: String,
    result: Mutex<Option<oneshot::Sender<Result<String, ServiceError>>>>,
    done: Notify,
}

async fn receive_redirect(
    State(pending): State<Arc<PendingRedirect>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    // Browsers may also request `/` without parameters; keep waiting.
    if !params.contains_key("code") && !params.contains_key("error") {
        return (StatusCode::NOT_FOUND, String::new());
    }

    let result = code_from_params(pending.service, &params, Some(&pending.expected_state));
    let page = match &result {
        Ok(_) => SUCCESS_PAGE.to_string(),
        Err(e) => e.to_string(),
    };
    let sender = pending.result.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        let _ = sender.send(result);
    }
    pending.done.notify_one();
    (StatusCode::OK, page)
}

impl RedirectListener {
    pub async fn bind() -> Result<Self, ServiceError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Serve until the redirect carrying `code` (or a consent error) arrives,
    /// then stop accepting connections.
    pub async fn wait_for_code(
        self,
        service: &'static str,
        expected_state: &str,
    ) -> Result<String, ServiceError> {
        let (sender, receiver) = oneshot::channel();
        let pending = Arc::new(PendingRedirect {
            service,
            expected_state: expected_state.to_string(),
            result: Mutex::new(Some(sender)),
            done: Notify::new(),
        });

        let shutdown = Arc::clone(&pending);
        let app = Router::new()
            .route("/", get(receive_redirect))
            .with_state(pending);

        debug!(port = self.port, "Waiting for OAuth redirect");
        // Idle browser connections can hold the server open after the code
        // arrives, so it winds down in the background.
        tokio::spawn(async move {
            let served = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move { shutdown.done.notified().await })
                .await;
            if let Err(e) = served {
                debug!("OAuth redirect server stopped: {e}");
            }
        });

        let result = receiver.await.map_err(|_| ServiceError::AuthError {
            service,
            message: "redirect listener stopped before a code arrived".into(),
        })?;
        if result.is_ok() {
            info!("{service} authorization code received");
        }
        result
    }
}
