//! Bundle assembly: resolves an implementation guide and every resource
//! it declares membership for into one ordered, de-duplicated set.

use igpub_core::{Bundle, CoreError, Result};
use igpub_storage::FhirRepository;
use tracing::debug;

/// Assembles the export [`Bundle`] for an implementation guide.
///
/// Leaf dependency of every other pipeline stage. Guarantees the IG
/// resource itself is the first entry of the result; its absence is
/// always fatal, never silently tolerated.
pub struct BundleAssembler<'a> {
    repository: &'a dyn FhirRepository,
}

impl<'a> BundleAssembler<'a> {
    pub fn new(repository: &'a dyn FhirRepository) -> Self {
        Self { repository }
    }

    /// Resolves the guide and its members.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ResourceNotFound` when the guide does not
    /// exist, or the repository's infrastructure errors mapped into
    /// `CoreError`.
    pub async fn assemble(&self, ig_id: &str) -> Result<Bundle> {
        let guide = self
            .repository
            .read("ImplementationGuide", ig_id)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::resource_not_found("ImplementationGuide", ig_id))?;

        let mut bundle = Bundle::new(ig_id);
        bundle.push(guide);

        let members = self
            .repository
            .implementation_guide_members(ig_id)
            .await
            .map_err(CoreError::from)?;
        for member in members {
            bundle.push(member);
        }

        debug!(
            ig_id = %ig_id,
            resources = bundle.len(),
            "Assembled export bundle"
        );

        // The push above makes this infallible today, but downstream
        // stages depend on the invariant, so assert it at the boundary.
        bundle.implementation_guide()?;
        Ok(bundle)
    }
}
