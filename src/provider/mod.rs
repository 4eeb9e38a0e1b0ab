mod ollama;
mod types;

pub use ollama::{DEFAULT_HOST, DEFAULT_MODEL, OllamaProvider};
pub use types::ProviderError;
