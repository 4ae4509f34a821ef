use std::collections::HashSet;

use serde_json::{Value, json};

use crate::error::{CoreError, Result};

/// Extracts the `resourceType` field from a resource document.
pub fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

/// Extracts the `id` field from a resource document.
pub fn resource_id(resource: &Value) -> Option<&str> {
    resource.get("id").and_then(Value::as_str)
}

/// Ordered, de-duplicated set of resources assembled for one export.
///
/// Entries are raw FHIR resource documents. Insertion order is preserved
/// and duplicates (same `resourceType` + `id`) are dropped. Once assembly
/// finishes the bundle is treated as immutable, read-only input to every
/// downstream pipeline stage.
#[derive(Debug, Clone)]
pub struct Bundle {
    implementation_guide_id: String,
    entries: Vec<Value>,
    seen: HashSet<(String, String)>,
}

impl Bundle {
    pub fn new(implementation_guide_id: impl Into<String>) -> Self {
        Self {
            implementation_guide_id: implementation_guide_id.into(),
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Adds a resource, dropping duplicates by `(resourceType, id)`.
    ///
    /// Returns `true` if the resource was added. Resources without a type
    /// or id are rejected outright since they can never be addressed by
    /// the control file.
    pub fn push(&mut self, resource: Value) -> bool {
        let Some(rt) = resource_type(&resource).map(str::to_string) else {
            return false;
        };
        let Some(id) = resource_id(&resource).map(str::to_string) else {
            return false;
        };
        if !self.seen.insert((rt, id)) {
            return false;
        }
        self.entries.push(resource);
        true
    }

    pub fn implementation_guide_id(&self) -> &str {
        &self.implementation_guide_id
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, rt: &str, id: &str) -> bool {
        self.seen.contains(&(rt.to_string(), id.to_string()))
    }

    /// Returns the ImplementationGuide resource backing this bundle.
    ///
    /// Its absence after assembly is always fatal; callers rely on this
    /// invariant and must never tolerate a bundle without its IG.
    pub fn implementation_guide(&self) -> Result<&Value> {
        self.entries
            .iter()
            .find(|r| {
                resource_type(r) == Some("ImplementationGuide")
                    && resource_id(r) == Some(self.implementation_guide_id.as_str())
            })
            .ok_or_else(|| CoreError::ig_resource_missing(&self.implementation_guide_id))
    }

    /// Renders the bundle as a FHIR `Bundle` document of type `collection`.
    pub fn to_fhir_json(&self) -> Value {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|resource| json!({ "resource": resource }))
            .collect();
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "total": self.entries.len(),
            "entry": entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ig(id: &str) -> Value {
        json!({ "resourceType": "ImplementationGuide", "id": id, "url": format!("http://example.com/fhir/ImplementationGuide/{id}") })
    }

    #[test]
    fn test_push_deduplicates() {
        let mut bundle = Bundle::new("ig-1");
        assert!(bundle.push(ig("ig-1")));
        assert!(bundle.push(json!({ "resourceType": "ValueSet", "id": "vs-1" })));
        assert!(!bundle.push(json!({ "resourceType": "ValueSet", "id": "vs-1" })));
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn test_push_rejects_untyped_resources() {
        let mut bundle = Bundle::new("ig-1");
        assert!(!bundle.push(json!({ "id": "no-type" })));
        assert!(!bundle.push(json!({ "resourceType": "ValueSet" })));
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_implementation_guide_present() {
        let mut bundle = Bundle::new("ig-1");
        bundle.push(ig("ig-1"));
        let found = bundle.implementation_guide().unwrap();
        assert_eq!(resource_id(found), Some("ig-1"));
    }

    #[test]
    fn test_implementation_guide_missing_is_fatal() {
        let mut bundle = Bundle::new("ig-1");
        bundle.push(json!({ "resourceType": "ValueSet", "id": "vs-1" }));
        let err = bundle.implementation_guide().unwrap_err();
        assert!(matches!(err, CoreError::IgResourceMissing(_)));
    }

    #[test]
    fn test_wrong_ig_id_does_not_satisfy_invariant() {
        let mut bundle = Bundle::new("ig-1");
        bundle.push(ig("ig-2"));
        assert!(bundle.implementation_guide().is_err());
    }

    #[test]
    fn test_to_fhir_json_shape() {
        let mut bundle = Bundle::new("ig-1");
        bundle.push(ig("ig-1"));
        bundle.push(json!({ "resourceType": "StructureDefinition", "id": "sd-1" }));

        let doc = bundle.to_fhir_json();
        assert_eq!(doc["resourceType"], "Bundle");
        assert_eq!(doc["type"], "collection");
        assert_eq!(doc["total"], 2);
        assert_eq!(doc["entry"].as_array().unwrap().len(), 2);
        assert_eq!(doc["entry"][0]["resource"]["resourceType"], "ImplementationGuide");
    }

    #[test]
    fn test_order_preserved() {
        let mut bundle = Bundle::new("ig-1");
        bundle.push(json!({ "resourceType": "ValueSet", "id": "b" }));
        bundle.push(json!({ "resourceType": "ValueSet", "id": "a" }));
        let ids: Vec<_> = bundle.iter().filter_map(resource_id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
