use thiserror::Error;

/// Core error types for IG export operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to allocate export workspace: {0}")]
    WorkspaceAllocation(String),

    #[error("Implementation guide '{0}' was not found in the assembled bundle")]
    IgResourceMissing(String),

    #[error("Failed to acquire IG publisher: {0}")]
    PublisherAcquisition(String),

    #[error("IG publisher process error: {0}")]
    PublisherProcess(String),

    #[error("Exported package '{0}' does not exist or was already removed")]
    DownloadTargetNotFound(String),

    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },

    #[error("Unknown FHIR version: {0}")]
    UnknownFhirVersion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML serialization error: {0}")]
    Xml(String),

    #[error("Storage backend error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new WorkspaceAllocation error
    pub fn workspace_allocation(message: impl Into<String>) -> Self {
        Self::WorkspaceAllocation(message.into())
    }

    /// Create a new IgResourceMissing error
    pub fn ig_resource_missing(ig_id: impl Into<String>) -> Self {
        Self::IgResourceMissing(ig_id.into())
    }

    /// Create a new PublisherAcquisition error
    pub fn publisher_acquisition(message: impl Into<String>) -> Self {
        Self::PublisherAcquisition(message.into())
    }

    /// Create a new PublisherProcess error
    pub fn publisher_process(message: impl Into<String>) -> Self {
        Self::PublisherProcess(message.into())
    }

    /// Create a new DownloadTargetNotFound error
    pub fn download_target_not_found(package_id: impl Into<String>) -> Self {
        Self::DownloadTargetNotFound(package_id.into())
    }

    /// Create a new ResourceNotFound error
    pub fn resource_not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a new InvalidResource error
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new Xml error
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// Whether this error only affects a single request rather than the
    /// export pipeline as a whole (e.g. a download for a stale package id).
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::DownloadTargetNotFound(_) | Self::ResourceNotFound { .. }
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::WorkspaceAllocation(_) => ErrorCategory::Workspace,
            Self::IgResourceMissing(_) | Self::ResourceNotFound { .. } => ErrorCategory::NotFound,
            Self::DownloadTargetNotFound(_) => ErrorCategory::NotFound,
            Self::PublisherAcquisition(_) | Self::PublisherProcess(_) => ErrorCategory::Publisher,
            Self::InvalidResource { .. } | Self::UnknownFhirVersion(_) => {
                ErrorCategory::Validation
            }
            Self::Json(_) | Self::Xml(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::Storage(_) => ErrorCategory::Io,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Workspace,
    NotFound,
    Publisher,
    Validation,
    Serialization,
    Io,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workspace => write!(f, "workspace"),
            Self::NotFound => write!(f, "not_found"),
            Self::Publisher => write!(f, "publisher"),
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::Io => write!(f, "io"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ig_resource_missing_message() {
        let err = CoreError::ig_resource_missing("ig-1");
        assert_eq!(
            err.to_string(),
            "Implementation guide 'ig-1' was not found in the assembled bundle"
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_resource_not_found_error() {
        let err = CoreError::resource_not_found("ImplementationGuide", "ig-2");
        assert_eq!(err.to_string(), "Resource not found: ImplementationGuide/ig-2");
        assert!(err.is_request_scoped());
    }

    #[test]
    fn test_download_target_not_found_is_request_scoped() {
        let err = CoreError::download_target_not_found("tmp-abc123");
        assert!(err.is_request_scoped());
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_publisher_errors_category() {
        assert_eq!(
            CoreError::publisher_acquisition("download failed").category(),
            ErrorCategory::Publisher
        );
        assert_eq!(
            CoreError::publisher_process("exit code 1").category(),
            ErrorCategory::Publisher
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ bad json }").unwrap_err();
        let core_err: CoreError = json_err.into();
        assert!(matches!(core_err, CoreError::Json(_)));
        assert_eq!(core_err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
        assert_eq!(core_err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_workspace_allocation_not_request_scoped() {
        let err = CoreError::workspace_allocation("tmpdir failed");
        assert!(!err.is_request_scoped());
        assert_eq!(err.category(), ErrorCategory::Workspace);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Workspace.to_string(), "workspace");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(ErrorCategory::Publisher.to_string(), "publisher");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
