use thiserror::Error;

/// Failures talking to a vendor API or its OAuth endpoints.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {message}")]
    RequestError {
        service: &'static str,
        message: String,
    },

    #[error("{service} authentication failed: {message}")]
    AuthError {
        service: &'static str,
        message: String,
    },

    #[error("{0} rate limit reached, try again later")]
    RateLimited(&'static str),

    #[error("{service} API error ({status}): {message}")]
    ApiError {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} returned an unexpected response: {message}")]
    ParseError {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
