//! Google OAuth for the Gmail agent: an authorized-user token file that is
//! refreshed in place, and the installed-app consent flow when no usable
//! token exists.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ServiceError;
use super::http::api_client;
use super::oauth::{ClientAuth, RedirectListener, TokenResponse, authorize_url, request_token};
use crate::config::ConfigError;
use crate::error::Result;

const SERVICE: &str = "Gmail";

pub const GMAIL_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
];

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.into()
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.into()
}

/// Authorized-user credentials as stored in the token file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, with = "expiry_format", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl AuthorizedUser {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now >= expiry - Duration::seconds(EXPIRY_SKEW_SECS))
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn apply(&mut self, token: TokenResponse, now: DateTime<Utc>) -> std::result::Result<(), ServiceError> {
        let expiry = match token.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| ServiceError::ParseError {
                        service: SERVICE,
                        message: format!("token expires_in out of range: {secs}"),
                    })?,
            ),
            None => None,
        };
        self.token = Some(token.access_token);
        if token.refresh_token.is_some() {
            self.refresh_token = token.refresh_token;
        }
        self.expiry = expiry;
        Ok(())
    }
}

/// The `expiry` field is a naive UTC timestamp with microseconds and a
/// trailing `Z`, e.g. `2024-05-01T12:00:00.123456Z`.
mod expiry_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let trimmed = raw.trim_end_matches('Z');
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .or_else(|_| DateTime::parse_from_rfc3339(&raw).map(|dt| Some(dt.to_utc())))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// OAuth client registration downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::BadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let value = serde_json::from_str(&content).map_err(|e| ConfigError::BadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(value)
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            what: "Gmail credentials",
            path: path.to_path_buf(),
        }
        .into());
    }
    let file: ClientSecretsFile = read_json(path)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| {
            ConfigError::BadFile {
                path: path.to_path_buf(),
                reason: "expected an \"installed\" or \"web\" client section".into(),
            }
            .into()
        })
}

fn print_consent_url(url: &str) {
    println!("Please visit this URL to authorize this application: {url}");
}

pub struct GoogleAuth {
    client: Client,
    credentials_file: PathBuf,
    token_file: PathBuf,
}

impl GoogleAuth {
    pub fn new(credentials_file: impl Into<PathBuf>, token_file: impl Into<PathBuf>) -> Self {
        Self {
            client: api_client(),
            credentials_file: credentials_file.into(),
            token_file: token_file.into(),
        }
    }

    /// Return usable credentials: the stored token if still valid, else a
    /// refreshed one, else a fresh consent. The token file is rewritten
    /// whenever the credentials change.
    pub async fn authorize(&self) -> Result<AuthorizedUser> {
        self.authorize_with(print_consent_url).await
    }

    /// [`authorize`](Self::authorize), handing the consent URL to `present`
    /// when a new consent is needed.
    pub async fn authorize_with(&self, present: impl FnOnce(&str)) -> Result<AuthorizedUser> {
        let now = Utc::now();
        let stored = if self.token_file.exists() {
            Some(read_json::<AuthorizedUser>(&self.token_file)?)
        } else {
            None
        };

        let user = match stored {
            Some(user) if user.is_valid(now) => return Ok(user),
            Some(user) if user.can_refresh() => match self.refresh(&user).await {
                Ok(refreshed) => refreshed,
                Err(ServiceError::AuthError { message, .. }) => {
                    warn!("Stored Gmail token rejected ({message}), starting a new consent");
                    self.run_consent_flow(present).await?
                }
                Err(e) => return Err(e.into()),
            },
            _ => self.run_consent_flow(present).await?,
        };

        self.save(&user)?;
        Ok(user)
    }

    pub async fn refresh(&self, user: &AuthorizedUser) -> std::result::Result<AuthorizedUser, ServiceError> {
        let refresh_token = user.refresh_token.as_deref().ok_or(ServiceError::AuthError {
            service: SERVICE,
            message: "no refresh token stored".into(),
        })?;

        let token = request_token(
            &self.client,
            SERVICE,
            &user.token_uri,
            ClientAuth::Form {
                client_id: &user.client_id,
                client_secret: &user.client_secret,
            },
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await?;

        let mut refreshed = user.clone();
        refreshed.apply(token, Utc::now())?;
        info!("Gmail access token refreshed");
        Ok(refreshed)
    }

    async fn run_consent_flow(&self, present: impl FnOnce(&str)) -> Result<AuthorizedUser> {
        let secrets = load_client_secrets(&self.credentials_file)?;
        let listener = RedirectListener::bind().await?;
        let redirect_uri = listener.redirect_uri();
        let state = uuid::Uuid::new_v4().simple().to_string();
        let scope = GMAIL_SCOPES.join(" ");

        let url = authorize_url(
            SERVICE,
            &secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", &secrets.client_id),
                ("redirect_uri", &redirect_uri),
                ("scope", &scope),
                ("state", &state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        present(&url);

        let code = listener.wait_for_code(SERVICE, &state).await?;
        let token = request_token(
            &self.client,
            SERVICE,
            &secrets.token_uri,
            ClientAuth::Form {
                client_id: &secrets.client_id,
                client_secret: &secrets.client_secret,
            },
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", &redirect_uri),
            ],
        )
        .await?;

        let mut user = AuthorizedUser {
            token: None,
            refresh_token: None,
            token_uri: secrets.token_uri,
            client_id: secrets.client_id,
            client_secret: secrets.client_secret,
            scopes: GMAIL_SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        user.apply(token, Utc::now())?;
        Ok(user)
    }

    pub fn save(&self, user: &AuthorizedUser) -> Result<()> {
        if let Some(parent) = self.token_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ServiceError::from)?;
            }
        }
        let json = serde_json::to_string_pretty(user).map_err(|e| ServiceError::ParseError {
            service: SERVICE,
            message: e.to_string(),
        })?;
        fs::write(&self.token_file, json).map_err(ServiceError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use chrono::TimeZone;

    fn user(expiry: Option<DateTime<Utc>>) -> AuthorizedUser {
        AuthorizedUser {
            token: Some("ya29.token".into()),
            refresh_token: Some("1//refresh".into()),
            token_uri: default_token_uri(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: vec![],
            expiry,
        }
    }

    #[test]
    fn parses_authorized_user_file() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "GOCSPX",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
            "expiry": "2024-05-01T12:00:00.123456Z"
        }"#;
        let user: AuthorizedUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.access_token(), Some("ya29.a0"));
        let expiry = user.expiry.unwrap();
        assert_eq!(expiry.timestamp(), Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().timestamp());
    }

    #[test]
    fn expiry_round_trips_through_token_file_format() {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let json = serde_json::to_value(user(Some(expiry))).unwrap();
        assert_eq!(json["expiry"], "2030-01-02T03:04:05.000000Z");
    }

    #[test]
    fn token_without_expiry_is_valid() {
        assert!(user(None).is_valid(Utc::now()));
    }

    #[test]
    fn token_inside_skew_window_is_expired() {
        let now = Utc::now();
        let u = user(Some(now + Duration::seconds(30)));
        assert!(u.is_expired(now));
        assert!(!u.is_valid(now));
        assert!(u.can_refresh());
    }

    #[test]
    fn apply_keeps_refresh_token_when_not_reissued() {
        let now = Utc::now();
        let mut u = user(None);
        u.apply(
            TokenResponse {
                access_token: "new".into(),
                token_type: Some("Bearer".into()),
                expires_in: Some(3599),
                refresh_token: None,
                scope: None,
            },
            now,
        )
        .unwrap();
        assert_eq!(u.access_token(), Some("new"));
        assert_eq!(u.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(u.expiry, Some(now + Duration::seconds(3599)));
    }

    #[test]
    fn absurd_lifetime_leaves_credentials_untouched() {
        let mut u = user(None);
        let err = u
            .apply(
                TokenResponse {
                    access_token: "new".into(),
                    token_type: None,
                    expires_in: Some(i64::MAX),
                    refresh_token: None,
                    scope: None,
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::ParseError { .. }));
        assert_eq!(u.access_token(), Some("ya29.token"));
    }

    #[test]
    fn missing_credentials_file_names_the_path() {
        let err = load_client_secrets(Path::new("nowhere/gmail_credentials.json")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Gmail credentials file not found"));
        assert!(message.contains("nowhere/gmail_credentials.json"));
    }

    #[test]
    fn reads_installed_client_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(
            &path,
            r#"{"installed": {"client_id": "cid", "client_secret": "cs", "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        let secrets = load_client_secrets(&path).unwrap();
        assert_eq!(secrets.client_id, "cid");
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URI);
    }

    #[tokio::test]
    async fn consent_flow_exchanges_code_and_writes_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let oauth = StubServer::start(vec![(
            200,
            serde_json::json!({"access_token": "ya29.first", "refresh_token": "1//new", "expires_in": 3599}),
        )])
        .await;
        let credentials = dir.path().join("gmail_credentials.json");
        fs::write(
            &credentials,
            serde_json::json!({"installed": {
                "client_id": "cid.apps.googleusercontent.com",
                "client_secret": "csec",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": format!("{}/token", oauth.url()),
            }})
            .to_string(),
        )
        .unwrap();
        let token_file = dir.path().join("tokens").join("gmail_token.json");
        let auth = GoogleAuth::new(&credentials, &token_file);

        let (url_tx, url_rx) = tokio::sync::oneshot::channel::<String>();
        let browser = tokio::spawn(async move {
            let consent = url::Url::parse(&url_rx.await.unwrap()).unwrap();
            let params: std::collections::HashMap<String, String> =
                consent.query_pairs().into_owned().collect();
            let redirect = params["redirect_uri"].replace("localhost", "127.0.0.1");
            reqwest::get(format!("{redirect}?state={}&code=4%2F0Ab", params["state"]))
                .await
                .unwrap();
            params
        });

        let user = auth
            .authorize_with(move |url| {
                let _ = url_tx.send(url.to_string());
            })
            .await
            .unwrap();
        let params = browser.await.unwrap();

        assert_eq!(params["client_id"], "cid.apps.googleusercontent.com");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
        assert_eq!(params["scope"], GMAIL_SCOPES.join(" "));
        assert!(!params["state"].is_empty());
        assert!(params["redirect_uri"].starts_with("http://localhost:"));

        let exchange = &oauth.requests()[0];
        assert_eq!(exchange.path(), "/token");
        assert_eq!(exchange.form("grant_type").as_deref(), Some("authorization_code"));
        assert_eq!(exchange.form("code").as_deref(), Some("4/0Ab"));
        assert_eq!(exchange.form("redirect_uri").as_deref(), Some(params["redirect_uri"].as_str()));
        assert_eq!(exchange.form("client_secret").as_deref(), Some("csec"));

        assert_eq!(user.access_token(), Some("ya29.first"));
        let saved: AuthorizedUser = read_json(&token_file).unwrap();
        assert_eq!(saved.token.as_deref(), Some("ya29.first"));
        assert_eq!(saved.refresh_token.as_deref(), Some("1//new"));
        assert_eq!(saved.scopes.len(), GMAIL_SCOPES.len());
        assert!(saved.expiry.is_some());
    }
}
