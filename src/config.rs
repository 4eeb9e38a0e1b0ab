use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::provider::{DEFAULT_HOST, DEFAULT_MODEL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found. Set it in the environment or in .env")]
    Missing(&'static str),

    #[error("{name} must be one of {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{what} file not found: {}", path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("Failed to read {}: {reason}", path.display())]
    BadFile { path: PathBuf, reason: String },
}

/// Load `.env` from the working directory if there is one.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_lookup(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// Blank values count as unset.
fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Local model endpoint shared by every agent.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub host: String,
    pub model: String,
}

impl ModelConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: optional(&lookup, "OLLAMA_HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            model: optional(&lookup, "DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub model: ModelConfig,
}

impl NotionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            token: required(&lookup, "NOTION_TOKEN")?,
            model: ModelConfig::from_lookup(lookup),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GmailConfig {
    /// OAuth client secrets downloaded from the Google Cloud console.
    pub credentials_file: PathBuf,
    /// Authorized-user token written after the first consent.
    pub token_file: PathBuf,
    pub model: ModelConfig,
}

impl GmailConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            credentials_file: optional(&lookup, "GMAIL_CREDENTIALS_FILE")
                .unwrap_or_else(|| "credentials/gmail_credentials.json".into())
                .into(),
            token_file: optional(&lookup, "GMAIL_TOKEN_FILE")
                .unwrap_or_else(|| "credentials/gmail_token.json".into())
                .into(),
            model: ModelConfig::from_lookup(lookup),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyAuthFlow {
    /// Authorization-code flow on behalf of the user (playback, library).
    User,
    /// App-only token; catalog endpoints only.
    ClientCredentials,
}

#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub cache_path: PathBuf,
    pub flow: SpotifyAuthFlow,
    pub model: ModelConfig,
}

impl SpotifyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let flow = match optional(&lookup, "SPOTIFY_AUTH_FLOW").as_deref() {
            None | Some("user") => SpotifyAuthFlow::User,
            Some("client_credentials") => SpotifyAuthFlow::ClientCredentials,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SPOTIFY_AUTH_FLOW",
                    value: other.to_string(),
                    expected: "user, client_credentials",
                });
            }
        };

        Ok(Self {
            client_id: required(&lookup, "SPOTIFY_CLIENT_ID")?,
            client_secret: required(&lookup, "SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: optional(&lookup, "SPOTIFY_REDIRECT_URI")
                .unwrap_or_else(|| "https://example.com/callback".into()),
            cache_path: optional(&lookup, "SPOTIFY_CACHE_PATH")
                .unwrap_or_else(|| ".spotify_cache".into())
                .into(),
            flow,
            model: ModelConfig::from_lookup(lookup),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn model_defaults_to_local_ollama() {
        let config = ModelConfig::from_lookup(vars(&[]));
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.model, "llama2");
    }

    #[test]
    fn model_reads_overrides() {
        let config = ModelConfig::from_lookup(vars(&[
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("DEFAULT_MODEL", "mistral"),
        ]));
        assert_eq!(config.host, "http://gpu-box:11434");
        assert_eq!(config.model, "mistral");
    }

    #[test]
    fn notion_token_is_required() {
        let err = NotionConfig::from_lookup(vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NOTION_TOKEN")));
        assert!(err.to_string().contains("NOTION_TOKEN"));
    }

    #[test]
    fn blank_notion_token_counts_as_missing() {
        let err = NotionConfig::from_lookup(vars(&[("NOTION_TOKEN", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NOTION_TOKEN")));
    }

    #[test]
    fn gmail_uses_default_credential_paths() {
        let config = GmailConfig::from_lookup(vars(&[]));
        assert_eq!(
            config.credentials_file,
            PathBuf::from("credentials/gmail_credentials.json")
        );
        assert_eq!(config.token_file, PathBuf::from("credentials/gmail_token.json"));
    }

    #[test]
    fn spotify_requires_client_secret() {
        let err = SpotifyConfig::from_lookup(vars(&[("SPOTIFY_CLIENT_ID", "abc")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SPOTIFY_CLIENT_SECRET")));
    }

    #[test]
    fn spotify_defaults() {
        let config = SpotifyConfig::from_lookup(vars(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.redirect_uri, "https://example.com/callback");
        assert_eq!(config.cache_path, PathBuf::from(".spotify_cache"));
        assert_eq!(config.flow, SpotifyAuthFlow::User);
    }

    #[test]
    fn spotify_rejects_unknown_flow() {
        let err = SpotifyConfig::from_lookup(vars(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
            ("SPOTIFY_AUTH_FLOW", "implicit"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SPOTIFY_AUTH_FLOW"));
    }
}
