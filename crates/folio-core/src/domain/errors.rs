use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data error: {0}")]
    Data(String),

    /// Operand dimensions do not agree (e.g. a quadratic form whose operand
    /// length differs from the matrix order). Evaluation never proceeds past
    /// one of these.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A caller-owned invariant was broken, e.g. portfolio weights that do
    /// not sum to one before an optimizer step. Recoverable by the caller
    /// re-establishing the invariant and retrying.
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FolioError>;
