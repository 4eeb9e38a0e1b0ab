use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ServiceError;
use super::google_auth::{AuthorizedUser, GoogleAuth};
use super::http::{api_client, check_status, json_body, request_error};

const SERVICE: &str = "Gmail";
const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Characters of body text kept per email.
pub const BODY_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: u64,
    #[serde(default)]
    pub threads_total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub parts: Vec<Payload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub data: Option<String>,
}

/// A message reduced to what the agent prints and feeds the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub body: String,
    pub snippet: String,
    pub labels: Vec<String>,
}

impl From<GmailMessage> for Email {
    fn from(msg: GmailMessage) -> Self {
        let (subject, sender, date, body) = match &msg.payload {
            Some(payload) => (
                header(&payload.headers, "Subject").unwrap_or("No Subject").to_string(),
                header(&payload.headers, "From").unwrap_or("Unknown").to_string(),
                header(&payload.headers, "Date").unwrap_or("Unknown").to_string(),
                extract_body_text(payload),
            ),
            None => (
                "No Subject".to_string(),
                "Unknown".to_string(),
                "Unknown".to_string(),
                String::new(),
            ),
        };

        Self {
            id: msg.id,
            subject,
            sender,
            date,
            body: body.chars().take(BODY_PREVIEW_CHARS).collect(),
            snippet: msg.snippet.unwrap_or_default(),
            labels: msg.label_ids,
        }
    }
}

fn header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn decode_base64url(data: &str) -> String {
    match URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

fn body_data(payload: &Payload) -> Option<&str> {
    payload.body.as_ref().and_then(|b| b.data.as_deref())
}

/// First text/plain part (one level of nesting), else the payload's own body.
pub fn extract_body_text(payload: &Payload) -> String {
    for part in &payload.parts {
        if part.mime_type.as_deref() == Some("text/plain") {
            if let Some(data) = body_data(part) {
                return decode_base64url(data);
            }
        }
        for sub in &part.parts {
            if sub.mime_type.as_deref() == Some("text/plain") {
                if let Some(data) = body_data(sub) {
                    return decode_base64url(data);
                }
            }
        }
    }
    body_data(payload).map(decode_base64url).unwrap_or_default()
}

/// Filters for `users.messages.list`.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub max_results: Option<u32>,
    pub query: Option<String>,
    pub label_ids: Vec<String>,
}

impl MessageQuery {
    pub fn recent(max_results: u32, query: &str) -> Self {
        Self {
            max_results: Some(max_results),
            query: (!query.is_empty()).then(|| query.to_string()),
            label_ids: Vec::new(),
        }
    }

    pub fn label(label: &str) -> Self {
        Self {
            label_ids: vec![label.to_string()],
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(max) = self.max_results {
            params.push(("maxResults", max.to_string()));
        }
        if let Some(q) = &self.query {
            params.push(("q", q.clone()));
        }
        for label in &self.label_ids {
            params.push(("labelIds", label.clone()));
        }
        params
    }
}

/// Gmail REST client for the signed-in user. Refreshes the access token when
/// it expires mid-session.
pub struct GmailClient {
    http: Client,
    base_url: String,
    auth: GoogleAuth,
    user: Mutex<AuthorizedUser>,
}

impl GmailClient {
    pub fn new(auth: GoogleAuth, user: AuthorizedUser) -> Self {
        Self {
            http: api_client(),
            base_url: GMAIL_API.into(),
            auth,
            user: Mutex::new(user),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut user = self.user.lock().await;
        if !user.is_valid(Utc::now()) {
            let refreshed = self.auth.refresh(&user).await?;
            if let Err(e) = self.auth.save(&refreshed) {
                tracing::warn!("Could not persist refreshed Gmail token: {e}");
            }
            *user = refreshed;
        }
        user.access_token()
            .map(str::to_string)
            .ok_or(ServiceError::AuthError {
                service: SERVICE,
                message: "no access token".into(),
            })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(params)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| request_error(SERVICE, e))?;
        let resp = check_status(SERVICE, resp).await?;
        json_body(SERVICE, resp).await
    }

    pub async fn get_profile(&self) -> Result<Profile, ServiceError> {
        self.get("/profile", &[]).await
    }

    pub async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRef>, ServiceError> {
        let list: MessageList = self.get("/messages", &query.params()).await?;
        Ok(list.messages)
    }

    pub async fn get_message(&self, id: &str) -> Result<GmailMessage, ServiceError> {
        let path = format!("/messages/{}", urlencoding::encode(id));
        self.get(&path, &[("format", "full".to_string())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;

    fn encode(text: &str) -> String {
        URL_SAFE.encode(text)
    }

    fn message(json: serde_json::Value) -> GmailMessage {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn extracts_headers_and_plain_text_part() {
        let msg = message(serde_json::json!({
            "id": "18c1",
            "snippet": "Lunch tomorrow?",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Lunch"},
                    {"name": "From", "value": "Ana <ana@example.com>"},
                    {"name": "Date", "value": "Tue, 1 Oct 2024 10:00:00 +0000"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": encode("<p>ignored</p>")}},
                    {"mimeType": "text/plain", "body": {"data": encode("Lunch at noon? ✓")}}
                ]
            }
        }));

        let email = Email::from(msg);
        assert_eq!(email.subject, "Lunch");
        assert_eq!(email.sender, "Ana <ana@example.com>");
        assert_eq!(email.body, "Lunch at noon? ✓");
        assert_eq!(email.labels, vec!["INBOX", "UNREAD"]);
    }

    #[test]
    fn missing_headers_use_placeholders() {
        let email = Email::from(message(serde_json::json!({
            "id": "1",
            "payload": {"headers": [], "body": {"data": encode("hi")}}
        })));
        assert_eq!(email.subject, "No Subject");
        assert_eq!(email.sender, "Unknown");
        assert_eq!(email.date, "Unknown");
        assert_eq!(email.body, "hi");
    }

    #[test]
    fn finds_nested_plain_text() {
        let payload: Payload = serde_json::from_value(serde_json::json!({
            "mimeType": "multipart/mixed",
            "parts": [{
                "mimeType": "multipart/alternative",
                "parts": [{"mimeType": "text/plain", "body": {"data": encode("nested")}}]
            }]
        }))
        .unwrap();
        assert_eq!(extract_body_text(&payload), "nested");
    }

    #[test]
    fn body_is_truncated_by_characters() {
        let long = "é".repeat(BODY_PREVIEW_CHARS + 20);
        let email = Email::from(message(serde_json::json!({
            "id": "1",
            "payload": {"body": {"data": encode(&long)}}
        })));
        assert_eq!(email.body.chars().count(), BODY_PREVIEW_CHARS);
    }

    #[test]
    fn query_params_follow_list_contract() {
        let params = MessageQuery::recent(10, "from:bob").params();
        assert_eq!(
            params,
            vec![("maxResults", "10".to_string()), ("q", "from:bob".to_string())]
        );
        assert_eq!(
            MessageQuery::label("UNREAD").params(),
            vec![("labelIds", "UNREAD".to_string())]
        );
        assert_eq!(MessageQuery::recent(5, "").params().len(), 1);
    }
}
