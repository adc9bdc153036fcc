use mongo_mapping::MappingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    /// The expression cannot be placed in a query document.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A recognized operator or method without a translation.
    #[error("{0}")]
    NotSupported(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl QueryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        QueryError::InvalidQuery(message.into())
    }

    pub(crate) fn not_supported(message: impl Into<String>) -> Self {
        QueryError::NotSupported(message.into())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
