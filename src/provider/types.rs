use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to local model failed: {0}")]
    RequestError(String),

    #[error("AI request failed with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("unexpected response from local model: {0}")]
    ParseError(String),
}
