use thiserror::Error;

/// Errors surfaced by the training core.
#[derive(Debug, Error)]
pub enum Error {
    /// A word index outside `[0, size)`.
    #[error("word index {index} out of range for vocabulary of size {size}")]
    OutOfRange { index: usize, size: usize },

    /// A hyperparameter that cannot be trained with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A model stream that cannot be decoded.
    #[error("cannot deserialize model: {0}")]
    Deserialize(String),

    /// Internal state that contradicts a model invariant. Fatal.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn out_of_range(index: usize, size: usize) -> Self {
        Error::OutOfRange { index, size }
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub(crate) fn deserialize(msg: impl Into<String>) -> Self {
        Error::Deserialize(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
