//! Command-line agents for Notion, Gmail and Spotify that hand the fetched
//! data to a locally hosted language model.

pub mod agent;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod provider;
pub mod services;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
