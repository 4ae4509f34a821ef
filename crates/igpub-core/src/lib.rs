pub mod bundle;
pub mod error;
pub mod options;
pub mod version;

pub use bundle::{Bundle, resource_id, resource_type};
pub use error::{CoreError, ErrorCategory, Result};
pub use options::{ExportFormat, ExportOptions, OutputFormat};
pub use version::FhirVersion;
