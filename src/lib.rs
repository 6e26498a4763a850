use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model endpoint unreachable: {0}")]
    ProviderUnavailable(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a failure for callers that map errors onto an
/// HTTP status family or a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself was bad; retrying it unchanged will fail again.
    Client,
    /// A collaborator (model endpoint, vector store) failed.
    Server,
}

impl RagError {
    #[inline]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => ErrorClass::Client,
            Self::ProviderUnavailable(_)
            | Self::Provider(_)
            | Self::Store(_)
            | Self::Generation(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorClass::Server,
        }
    }
}

pub mod commands;
pub mod config;
pub mod providers;
pub mod rag;
pub mod store;
