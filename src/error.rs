//! Error types for the form engine

use thiserror::Error;

/// Result type for form operations
pub type Result<T> = std::result::Result<T, FormError>;

/// Boxed error returned by user-supplied validators and loaders
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Form engine errors
///
/// Validation failures are never reported through this type; they live in the
/// error map of the owning form.
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Field type \"{0}\" is not registered")]
    FieldTypeNotRegistered(String),

    #[error("Field type \"{0}\" is already registered")]
    DuplicateFieldType(String),

    #[error("Unknown layout \"{layout}\" for field {field}")]
    UnknownLayout { field: String, layout: String },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Duplicate field name: {0}")]
    DuplicateFieldName(String),

    #[error("Invalid field name \"{0}\": names must not contain '.', '[' or ']'")]
    InvalidFieldName(String),

    #[error("Invalid field path \"{path}\": {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Row index {index} out of range for {field} ({len} rows)")]
    RowOutOfRange { field: String, index: usize, len: usize },

    #[error("Field {field} is a {found} field, expected {expected}")]
    KindMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value for {field}: expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("Invalid row limits for {field}: minRows {min} exceeds maxRows {max}")]
    InvalidRowLimits { field: String, min: usize, max: usize },

    #[error("Form configuration error: {0}")]
    InvalidConfig(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Value fetch failed for {field}: {message}")]
    FetchFailed { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FormError {
    /// Whether this error stems from a bad declaration rather than a bad call
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FormError::FieldTypeNotRegistered(_)
                | FormError::DuplicateFieldType(_)
                | FormError::UnknownLayout { .. }
                | FormError::DuplicateFieldName(_)
                | FormError::InvalidFieldName(_)
                | FormError::InvalidRowLimits { .. }
                | FormError::InvalidConfig(_)
                | FormError::InvalidSchema(_)
        )
    }
}
