//! In-memory repository backend.
//!
//! Keeps resources in a concurrent map keyed `"ResourceType/id"`. Used by
//! unit tests and by the default server wiring when no external FHIR
//! server is configured.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::RepositoryError;
use crate::traits::FhirRepository;

pub type StorageKey = String; // Format: "ResourceType/id"

pub(crate) fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// Map-backed [`FhirRepository`] implementation.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    data: DashMap<StorageKey, Value>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Inserts a resource, replacing any previous version.
    ///
    /// Resources without `resourceType` or `id` are rejected since they
    /// cannot be addressed.
    pub fn insert(&self, resource: Value) -> Result<(), RepositoryError> {
        let rt = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| RepositoryError::backend("resource is missing resourceType"))?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| RepositoryError::backend("resource is missing id"))?;
        let key = make_storage_key(rt, id);
        self.data.insert(key, resource);
        Ok(())
    }

    /// Seeds the repository from a list of resource documents.
    pub fn seed(&self, resources: impl IntoIterator<Item = Value>) -> Result<(), RepositoryError> {
        for resource in resources {
            self.insert(resource)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Collects `Type/id` member references from both IG generations.
    ///
    /// STU3 nests them under `package[].resource[].sourceReference`, R4
    /// under `definition.resource[].reference`.
    fn member_references(guide: &Value) -> Vec<String> {
        let mut refs = Vec::new();

        if let Some(packages) = guide.get("package").and_then(Value::as_array) {
            for package in packages {
                if let Some(resources) = package.get("resource").and_then(Value::as_array) {
                    for resource in resources {
                        if let Some(reference) = resource
                            .get("sourceReference")
                            .and_then(|r| r.get("reference"))
                            .and_then(Value::as_str)
                        {
                            refs.push(reference.to_string());
                        }
                    }
                }
            }
        }

        if let Some(resources) = guide
            .get("definition")
            .and_then(|d| d.get("resource"))
            .and_then(Value::as_array)
        {
            for resource in resources {
                if let Some(reference) = resource
                    .get("reference")
                    .and_then(|r| r.get("reference"))
                    .and_then(Value::as_str)
                {
                    refs.push(reference.to_string());
                }
            }
        }

        refs
    }
}

#[async_trait]
impl FhirRepository for MemoryRepository {
    async fn read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<Value>, RepositoryError> {
        let key = make_storage_key(resource_type, id);
        Ok(self.data.get(&key).map(|entry| entry.value().clone()))
    }

    async fn implementation_guide_members(
        &self,
        ig_id: &str,
    ) -> Result<Vec<Value>, RepositoryError> {
        let guide = self
            .read("ImplementationGuide", ig_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("ImplementationGuide", ig_id))?;

        let mut members = Vec::new();
        for reference in Self::member_references(&guide) {
            let Some((rt, id)) = reference.split_once('/') else {
                debug!(reference = %reference, "Skipping non-relative member reference");
                continue;
            };
            match self.read(rt, id).await? {
                Some(resource) => members.push(resource),
                None => {
                    debug!(reference = %reference, "Member reference does not resolve, skipping")
                }
            }
        }
        Ok(members)
    }
}
