use thiserror::Error;

/// Failures a generation reports to its caller. Probe and preferred-merge
/// failures are absorbed internally and never show up here.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("speech synthesis failed for chunk {chunk} of {total}: {cause:#}")]
    Backend {
        chunk: usize,
        total: usize,
        cause: anyhow::Error,
    },

    #[error("could not merge audio chunks: {0:#}")]
    Merge(anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    pub fn validation(message: impl Into<String>) -> Self {
        GenerationError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GenerationError::Validation(_))
    }
}
