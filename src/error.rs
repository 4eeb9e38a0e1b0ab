use thiserror::Error;

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::services::ServiceError;

/// Anything an agent command can fail with. The console prints the message
/// and keeps prompting.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("AI Error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Agent(String),
}

pub type Result<T> = std::result::Result<T, Error>;
