//! Repository trait for the FHIR store the export pipeline reads from.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RepositoryError;

/// Read-only view of the FHIR resource store backing an export.
///
/// Implementations must be thread-safe (`Send + Sync`). The export
/// pipeline only ever reads: it fetches individual resources by type and
/// id, and resolves the member resources an implementation guide declares.
///
/// # Example
///
/// ```ignore
/// use igpub_storage::{FhirRepository, RepositoryError};
///
/// async fn load_ig(repo: &dyn FhirRepository, id: &str) -> Result<serde_json::Value, RepositoryError> {
///     repo.read("ImplementationGuide", id)
///         .await?
///         .ok_or_else(|| RepositoryError::not_found("ImplementationGuide", id))
/// }
/// ```
#[async_trait]
pub trait FhirRepository: Send + Sync {
    /// Reads a resource by type and ID.
    ///
    /// Returns `None` if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing
    /// resources.
    async fn read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Value>, RepositoryError>;

    /// Resolves every resource the given implementation guide declares as
    /// a package member.
    ///
    /// References that cannot be resolved are skipped; the guide itself is
    /// not included in the result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the implementation guide
    /// itself does not exist.
    async fn implementation_guide_members(
        &self,
        ig_id: &str,
    ) -> Result<Vec<Value>, RepositoryError>;
}
