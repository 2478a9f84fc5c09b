//! Error types for catalog search and asset downloads.

use thiserror::Error;

/// Errors that can occur while searching catalogs or fetching imagery.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] seepwatch_core::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Every configured provider failed or returned no scenes
    #[error("Imagery search failed: {0}")]
    ImagerySearch(String),

    /// No asset was obtained after all retries
    #[error(
        "No imagery downloaded after {attempts} attempt(s): \
         obtained {obtained} of {requested} requested asset(s)"
    )]
    DownloadExhausted {
        attempts: u32,
        requested: usize,
        obtained: usize,
    },

    #[error("Operation cancelled during {0}")]
    Cancelled(String),
}

impl CloudError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CloudError::Status { status, .. } => *status == 429 || *status >= 500,
            CloudError::Network(_) | CloudError::Io(_) | CloudError::ImagerySearch(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
