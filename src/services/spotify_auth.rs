//! Spotify sign-in: the authorization-code flow with an on-disk token cache,
//! or an app-only client-credentials token.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::ServiceError;
use super::http::api_client;
use super::oauth::{ClientAuth, TokenResponse, authorize_url, extract_code, request_token};
use crate::config::{SpotifyAuthFlow, SpotifyConfig};

const SERVICE: &str = "Spotify";
const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens expiring within this many seconds are refreshed first.
const REFRESH_MARGIN_SECS: i64 = 60;

pub const SPOTIFY_SCOPES: [&str; 11] = [
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-library-read",
    "user-library-modify",
    "user-read-recently-played",
    "user-top-read",
];

/// Token cache entry (`expires_at` is a unix timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn bearer() -> String {
    "Bearer".into()
}

impl CachedToken {
    pub fn from_response(
        token: TokenResponse,
        now: i64,
        previous_refresh: Option<String>,
    ) -> Result<Self, ServiceError> {
        let expires_in = token.expires_in.unwrap_or(3600);
        let expires_at = now
            .checked_add(expires_in)
            .ok_or_else(|| ServiceError::ParseError {
                service: SERVICE,
                message: format!("token expires_in out of range: {expires_in}"),
            })?;
        Ok(Self {
            access_token: token.access_token,
            token_type: token.token_type.unwrap_or_else(bearer),
            expires_in,
            scope: token.scope,
            expires_at,
            refresh_token: token.refresh_token.or(previous_refresh),
        })
    }

    pub fn is_expiring(&self, now: i64) -> bool {
        self.expires_at - now < REFRESH_MARGIN_SECS
    }
}

pub struct SpotifyAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    cache_path: PathBuf,
    flow: SpotifyAuthFlow,
    token_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyAuth {
    pub fn new(config: &SpotifyConfig) -> Self {
        Self {
            client: api_client(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            cache_path: config.cache_path.clone(),
            flow: config.flow,
            token_url: TOKEN_URL.into(),
            token: Mutex::new(None),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_token(self, token: CachedToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
            ..self
        }
    }

    pub fn flow(&self) -> SpotifyAuthFlow {
        self.flow
    }

    /// Fail early for endpoints that act on behalf of a user.
    pub fn require_user(&self, what: &str) -> Result<(), ServiceError> {
        match self.flow {
            SpotifyAuthFlow::User => Ok(()),
            SpotifyAuthFlow::ClientCredentials => Err(ServiceError::AuthError {
                service: SERVICE,
                message: format!(
                    "{what} needs user authorization; set SPOTIFY_AUTH_FLOW=user"
                ),
            }),
        }
    }

    fn client_auth(&self) -> ClientAuth<'_> {
        ClientAuth::Basic {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        }
    }

    /// A bearer token good for at least the next minute.
    pub async fn access_token(&self) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let mut slot = self.token.lock().await;

        if slot.is_none() && self.flow == SpotifyAuthFlow::User {
            *slot = self.load_cache();
        }
        if let Some(token) = slot.as_ref() {
            if !token.is_expiring(now) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = match (self.flow, slot.take()) {
            (SpotifyAuthFlow::ClientCredentials, _) => self.client_credentials(now).await?,
            (SpotifyAuthFlow::User, Some(old)) if old.refresh_token.is_some() => {
                match self.refresh(&old, now).await {
                    Ok(token) => token,
                    Err(ServiceError::AuthError { message, .. }) => {
                        warn!("Cached Spotify token rejected ({message}), authorizing again");
                        self.authorize_user(now).await?
                    }
                    Err(e) => return Err(e),
                }
            }
            (SpotifyAuthFlow::User, _) => self.authorize_user(now).await?,
        };

        if self.flow == SpotifyAuthFlow::User {
            self.save_cache(&fresh);
        }
        let access = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(access)
    }

    async fn client_credentials(&self, now: i64) -> Result<CachedToken, ServiceError> {
        let token = request_token(
            &self.client,
            SERVICE,
            &self.token_url,
            self.client_auth(),
            &[("grant_type", "client_credentials")],
        )
        .await?;
        info!("Spotify app token acquired");
        CachedToken::from_response(token, now, None)
    }

    async fn refresh(&self, old: &CachedToken, now: i64) -> Result<CachedToken, ServiceError> {
        let refresh_token = old.refresh_token.as_deref().unwrap_or_default();
        let token = request_token(
            &self.client,
            SERVICE,
            &self.token_url,
            self.client_auth(),
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await?;
        info!("Spotify access token refreshed");
        CachedToken::from_response(token, now, old.refresh_token.clone())
    }

    /// Print the consent URL and read back the URL the browser landed on.
    async fn authorize_user(&self, now: i64) -> Result<CachedToken, ServiceError> {
        let scope = SPOTIFY_SCOPES.join(" ");
        let url = authorize_url(
            SERVICE,
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ],
        )?;

        println!("Go to the following URL: {url}");
        println!("Enter the URL you were redirected to: ");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

        let code = extract_code(SERVICE, &line, None)?;
        let token = request_token(
            &self.client,
            SERVICE,
            &self.token_url,
            self.client_auth(),
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .await?;
        CachedToken::from_response(token, now, None)
    }

    fn load_cache(&self) -> Option<CachedToken> {
        let content = fs::read_to_string(&self.cache_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring unreadable token cache {}: {e}", self.cache_path.display());
                None
            }
        }
    }

    fn save_cache(&self, token: &CachedToken) {
        let result = serde_json::to_string(token)
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&self.cache_path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Couldn't write token to cache at {}: {e}", self.cache_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::test_support::StubServer;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    #[test]
    fn token_expiring_within_a_minute_needs_refresh() {
        let token = CachedToken {
            access_token: "a".into(),
            token_type: bearer(),
            expires_in: 3600,
            scope: None,
            expires_at: 1_000,
            refresh_token: None,
        };
        assert!(!token.is_expiring(900));
        assert!(token.is_expiring(941));
    }

    #[test]
    fn refresh_keeps_previous_refresh_token() {
        let token = CachedToken::from_response(
            TokenResponse {
                access_token: "new".into(),
                token_type: None,
                expires_in: Some(3600),
                refresh_token: None,
                scope: Some("user-top-read".into()),
            },
            100,
            Some("keep-me".into()),
        )
        .unwrap();
        assert_eq!(token.expires_at, 3700);
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
    }

    #[test]
    fn absurd_lifetime_is_rejected() {
        let err = CachedToken::from_response(
            TokenResponse {
                access_token: "new".into(),
                token_type: None,
                expires_in: Some(i64::MAX),
                refresh_token: None,
                scope: None,
            },
            1_700_000_000,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ParseError { .. }));
    }

    #[test]
    fn parses_spotipy_style_cache() {
        let json = r#"{"access_token": "BQD", "token_type": "Bearer", "expires_in": 3600,
            "scope": "user-read-playback-state", "expires_at": 1700000000, "refresh_token": "AQB"}"#;
        let token: CachedToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.expires_at, 1_700_000_000);
        assert_eq!(token.refresh_token.as_deref(), Some("AQB"));
    }

    fn config(flow: SpotifyAuthFlow, cache_path: PathBuf) -> SpotifyConfig {
        SpotifyConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://example.com/callback".into(),
            cache_path,
            flow,
            model: ModelConfig::from_lookup(|_| None),
        }
    }

    #[tokio::test]
    async fn app_token_is_fetched_once_with_basic_auth() {
        let stub = StubServer::start(vec![(
            200,
            json!({"access_token": "app-token", "token_type": "Bearer", "expires_in": 3600}),
        )])
        .await;
        let auth = SpotifyAuth::new(&config(SpotifyAuthFlow::ClientCredentials, "unused".into()))
            .with_token_url(format!("{}/api/token", stub.url()));

        assert_eq!(auth.access_token().await.unwrap(), "app-token");
        assert_eq!(auth.access_token().await.unwrap(), "app-token");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].form("grant_type").as_deref(), Some("client_credentials"));
        let basic = format!("Basic {}", STANDARD.encode("id:secret"));
        assert_eq!(requests[0].header("authorization"), Some(basic.as_str()));
    }

    #[tokio::test]
    async fn expiring_cache_entry_is_refreshed_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join(".spotify_cache");
        let stale = CachedToken {
            access_token: "old".into(),
            token_type: bearer(),
            expires_in: 3600,
            scope: None,
            expires_at: Utc::now().timestamp() + 10,
            refresh_token: Some("AQB".into()),
        };
        fs::write(&cache, serde_json::to_string(&stale).unwrap()).unwrap();

        let stub = StubServer::start(vec![(200, json!({"access_token": "new", "expires_in": 3600}))]).await;
        let auth = SpotifyAuth::new(&config(SpotifyAuthFlow::User, cache.clone()))
            .with_token_url(format!("{}/api/token", stub.url()));

        assert_eq!(auth.access_token().await.unwrap(), "new");
        let grant = &stub.requests()[0];
        assert_eq!(grant.form("grant_type").as_deref(), Some("refresh_token"));
        assert_eq!(grant.form("refresh_token").as_deref(), Some("AQB"));

        let saved: CachedToken = serde_json::from_str(&fs::read_to_string(&cache).unwrap()).unwrap();
        assert_eq!(saved.access_token, "new");
        assert_eq!(saved.refresh_token.as_deref(), Some("AQB"));
    }

    #[test]
    fn app_tokens_cannot_act_for_a_user() {
        let auth = SpotifyAuth::new(&config(SpotifyAuthFlow::ClientCredentials, "unused".into()));
        let err = auth.require_user("Controlling playback").unwrap_err();
        assert!(err.to_string().contains("SPOTIFY_AUTH_FLOW=user"));
        assert!(SpotifyAuth::new(&config(SpotifyAuthFlow::User, "unused".into()))
            .require_user("Controlling playback")
            .is_ok());
    }
}
