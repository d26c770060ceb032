use thiserror::Error;

pub type Result<T> = std::result::Result<T, DandoriError>;

#[derive(Error, Debug)]
pub enum DandoriError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Vector store error: {0}")]
    Storage(String),

    #[error("Course assistant is still initialising")]
    NotReady,

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`DandoriError`], used by the transports to
/// pick a status code and decide how much detail a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something unusable.
    Validation,
    /// The embedding or chat-completion provider failed.
    Upstream,
    /// The vector store or the catalog file failed.
    Storage,
    /// The service cannot answer right now (starting up, or too slow).
    Unavailable,
    Internal,
}

impl DandoriError {
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Provider(_) => ErrorKind::Upstream,
            Self::Storage(_) | Self::Catalog(_) => ErrorKind::Storage,
            Self::NotReady | Self::Timeout(_) => ErrorKind::Unavailable,
            Self::Config(_) | Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Message that is safe to hand back to an API caller.
    ///
    /// Validation messages are returned verbatim; everything else is replaced
    /// with a generic description so provider responses, file paths and
    /// credentials never leak. The full error is expected to be logged.
    #[inline]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::NotReady => "RAG system is still initialising, please wait...".to_string(),
            Self::Timeout(_) => "Request timeout".to_string(),
            Self::Provider(_) => "The language model provider request failed".to_string(),
            Self::Catalog(_) => "The course catalog could not be read".to_string(),
            Self::Storage(_) => "The course index is unavailable".to_string(),
            Self::Config(_) | Self::Io(_) | Self::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for DandoriError {
    #[inline]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(anyhow::anyhow!("Background task failed: {}", err))
    }
}

pub mod assistant;
pub mod catalog;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod provider;
pub mod server;
pub mod stats;
pub mod stdio;

#[cfg(test)]
mod test_support;
