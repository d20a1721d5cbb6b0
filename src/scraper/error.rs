//! Shared error type for site adapters.

use thiserror::Error;

/// Adapter failure: network, HTTP, decoding, page structure, or a missing title/chapter.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Unsupported source '{key}'. Use one of: {known}.")]
    UnsupportedSource { key: String, known: String },

    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    // HTTP and network
    #[error("Network error: could not fetch {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("Unexpected JSON from {url}: {source}")]
    Json {
        url: String,
        source: serde_json::Error,
    },

    // Parsing
    #[error("Could not parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    #[error("Could not decrypt payload: {reason}")]
    Decrypt { reason: String },

    // Lookups
    #[error("No manga found for '{query}'.")]
    NoResults { query: String },

    #[error("Chapter {chapter} not found for '{title}'.")]
    ChapterNotFound { title: String, chapter: String },
}

impl ScraperError {
    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        ScraperError::Network {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn parse(what: &'static str, message: impl Into<String>) -> Self {
        ScraperError::Parse {
            what,
            message: message.into(),
        }
    }
}
