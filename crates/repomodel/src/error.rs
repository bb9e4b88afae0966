use crate::store::RowId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown field '{field}' on model {model}")]
    UnknownField { model: String, field: String },

    #[error("Argument error: {0}")]
    Argument(String),

    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    #[error("Reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("Validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Row not found: {table}#{id}")]
    RowNotFound { table: String, id: RowId },

    #[error("Ordering violated in {table}: {message}")]
    OrderingViolation { table: String, message: String },

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),
}

impl ModelError {
    pub(crate) fn unknown_field(model: impl Into<String>, field: impl Into<String>) -> Self {
        ModelError::UnknownField {
            model: model.into(),
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
