use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::ProviderError;

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a local Ollama server. Prompts and answers pass through
/// untouched.
pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a single non-streaming prompt to the default model.
    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.generate_with(prompt, &self.model).await
    }

    pub async fn generate_with(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        debug!(model, prompt_len = prompt.len(), "Sending prompt to local model");

        let resp = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(body.response)
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubServer;
    use serde_json::json;

    #[test]
    fn host_loses_trailing_slash() {
        assert_eq!(OllamaProvider::new("http://gpu-box:11434/", "mistral").host(), "http://gpu-box:11434");
    }

    #[tokio::test]
    async fn generate_posts_prompt_unchanged() {
        let stub = StubServer::start(vec![(200, json!({"response": "  raw answer\n", "done": true}))]).await;
        let model = OllamaProvider::new(stub.url(), "llama2");

        let answer = model.generate("Summarize:\n- a\n- b").await.unwrap();
        assert_eq!(answer, "  raw answer\n");

        let requests = stub.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path(), "/api/generate");
        assert_eq!(
            requests[0].json(),
            json!({"model": "llama2", "prompt": "Summarize:\n- a\n- b", "stream": false})
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let stub = StubServer::start(vec![(404, json!({"error": "model 'nope' not found"}))]).await;
        let model = OllamaProvider::new(stub.url(), "nope");

        match model.generate("hi").await {
            Err(ProviderError::HttpStatus { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lists_installed_models() {
        let stub = StubServer::start(vec![(
            200,
            json!({"models": [{"name": "llama2:latest"}, {"name": "mistral:7b"}]}),
        )])
        .await;
        let models = OllamaProvider::new(stub.url(), "llama2").list_models().await.unwrap();
        assert_eq!(models, vec!["llama2:latest", "mistral:7b"]);
        assert_eq!(stub.requests()[0].path(), "/api/tags");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let model = OllamaProvider::new(format!("http://{addr}"), "llama2");
        assert!(matches!(model.generate("hi").await, Err(ProviderError::RequestError(_))));
    }
}
