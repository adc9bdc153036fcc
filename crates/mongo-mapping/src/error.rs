use mongo_bson::BsonError;
use thiserror::Error;

/// Errors raised while lowering objects to documents or materializing them
/// back.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("no class map registered for type {0}")]
    ClassMapNotFound(String),
    #[error("discriminator {discriminator:?} does not name {base} or one of its subclasses")]
    UnknownDiscriminator { base: String, discriminator: String },
    #[error("type {type_name} has no member {member}")]
    MemberNotFound { type_name: String, member: String },
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("{0} is abstract and cannot be instantiated")]
    AbstractType(String),
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    #[error(transparent)]
    Bson(#[from] BsonError),
}

impl MappingError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        MappingError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
