use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Shape or attribute mismatch found by shape inference.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Plan parameters that cannot be executed (negative pads, non-dividable
    /// broadcast, unsupported precision).
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A broken invariant inside the crate rather than a bad model.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// True for errors caused by the model or its parameters, false for bugs
    /// and environment failures.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Error::ValidationError(_) | Error::ConfigurationError(_) | Error::UnsupportedOperation(_)
        )
    }
}
