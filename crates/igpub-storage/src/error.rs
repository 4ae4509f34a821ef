use thiserror::Error;

/// Errors surfaced by repository backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepositoryError {
    /// Create a new NotFound error
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a new Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl From<RepositoryError> for igpub_core::CoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { resource_type, id } => {
                igpub_core::CoreError::resource_not_found(resource_type, id)
            }
            RepositoryError::Backend(message) => igpub_core::CoreError::Storage(message),
            RepositoryError::Serialization(err) => igpub_core::CoreError::Json(err),
        }
    }
}
