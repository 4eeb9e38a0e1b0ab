mod error;
mod http;

pub mod gmail;
pub mod google_auth;
pub mod notion;
pub mod oauth;
pub mod spotify;
pub mod spotify_auth;

pub use error::ServiceError;
