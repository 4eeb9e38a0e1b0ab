use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use super::ServiceError;
use super::http::{api_client, check_status, json_body, request_error};

const SERVICE: &str = "Notion";
const NOTION_API: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

/// Notion REST client. Records are returned as raw JSON since database
/// properties are user-defined.
pub struct NotionClient {
    http: Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: api_client(),
            base_url: NOTION_API.into(),
            token: token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn results(&self, req: RequestBuilder) -> Result<Vec<Value>, ServiceError> {
        let resp = req.send().await.map_err(|e| request_error(SERVICE, e))?;
        let resp = check_status(SERVICE, resp).await?;
        let body: Value = json_body(SERVICE, resp).await?;
        Ok(match body.get("results") {
            Some(Value::Array(results)) => results.clone(),
            _ => Vec::new(),
        })
    }

    /// Every database shared with the integration.
    pub async fn search_databases(&self) -> Result<Vec<Value>, ServiceError> {
        let req = self.post("/search").json(&json!({
            "filter": {"property": "object", "value": "database"}
        }));
        self.results(req).await
    }

    pub async fn query_database(
        &self,
        database_id: &str,
        page_size: u32,
    ) -> Result<Vec<Value>, ServiceError> {
        let path = format!("/databases/{}/query", urlencoding::encode(database_id));
        let req = self.post(&path).json(&json!({ "page_size": page_size }));
        self.results(req).await
    }
}

fn first_text(rich_text: &Value) -> Option<&str> {
    let first = rich_text.as_array()?.first()?;
    first["text"]["content"]
        .as_str()
        .or_else(|| first["plain_text"].as_str())
}

pub fn database_title(database: &Value) -> String {
    first_text(&database["title"])
        .unwrap_or("Untitled")
        .to_string()
}

/// Title of a page: the first non-empty `title` property.
pub fn page_title(page: &Value) -> String {
    page["properties"]
        .as_object()
        .and_then(|props| {
            props
                .values()
                .filter(|p| p["type"] == "title")
                .find_map(|p| first_text(&p["title"]))
        })
        .unwrap_or("Untitled")
        .to_string()
}

pub fn record_id(record: &Value) -> &str {
    record["id"].as_str().unwrap_or_default()
}
