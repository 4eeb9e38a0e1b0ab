mod gmail;
mod notion;
mod spotify;

pub use gmail::{GmailAgent, GmailCommand};
pub use notion::{NotionAgent, NotionCommand};
pub use spotify::{SpotifyAgent, SpotifyCommand, genres_for_mood, parse_song_suggestions};

use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;
use crate::provider::OllamaProvider;

/// How `format_response` renders a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Text,
}

/// Pretty JSON, or the value's plain text (strings without quotes).
pub fn format_response(data: &Value, format: Format) -> String {
    match (format, data) {
        (Format::Json, _) => serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
        (Format::Text, Value::String(s)) => s.clone(),
        (Format::Text, _) => data.to_string(),
    }
}

/// Behavior shared by the Notion, Gmail and Spotify agents.
#[allow(async_fn_in_trait)]
pub trait Agent {
    fn name(&self) -> &'static str;

    fn model(&self) -> &OllamaProvider;

    /// Cheapest call that proves the credentials work. Logs who we are
    /// connected as.
    async fn check_service(&self) -> Result<()>;

    /// Account summary; `{"status": "error", "error": ...}` on failure.
    async fn status(&self) -> Value;

    async fn test_connection(&self) -> bool {
        match self.check_service().await {
            Ok(()) => true,
            Err(e) => {
                error!(agent = self.name(), "Connection test failed: {e}");
                false
            }
        }
    }

    fn log_action(&self, action: &str, details: &str) {
        info!(agent = self.name(), "Action: {action} - {details}");
    }

    /// Send `prompt` to the local model unchanged and return its answer.
    async fn ask_ai(&self, prompt: &str) -> Result<String> {
        self.model().generate(prompt).await.map_err(|e| {
            error!(agent = self.name(), model = self.model().model(), "AI request failed: {e}");
            e.into()
        })
    }
}

/// Render `status()` for the console, tagging whether the model answers.
pub(crate) async fn status_report<A: Agent>(agent: &A) -> String {
    let mut status = agent.status().await;
    let model = match agent.model().list_models().await {
        Ok(models) => serde_json::json!({
            "host": agent.model().host(),
            "model": agent.model().model(),
            "installed": models.iter().any(|m| m == agent.model().model()
                || m.strip_suffix(":latest") == Some(agent.model().model())),
        }),
        Err(e) => serde_json::json!({
            "host": agent.model().host(),
            "model": agent.model().model(),
            "error": e.to_string(),
        }),
    };
    if let Value::Object(map) = &mut status {
        map.insert("local_model".into(), model);
    }
    format_response(&status, Format::Json)
}
