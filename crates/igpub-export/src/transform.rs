//! Pre-serialization resource transforms.
//!
//! The authoring tool stores bookkeeping state in extensions under its
//! own domain. Those are export-only concerns and must not appear in the
//! published package, so every resource passes through a transform
//! before it is written to disk.

use serde_json::Value;

use crate::control::EXTENSION_DOMAIN;

/// Transform applied to each resource before serialization.
pub trait ResourceTransform: Send + Sync {
    fn apply(&self, resource: &Value) -> Value;
}

/// Removes the tool's own extensions from a resource's top-level
/// `extension` array.
pub struct StripExportExtensions {
    url_prefixes: Vec<String>,
}

impl StripExportExtensions {
    pub fn new(url_prefixes: Vec<String>) -> Self {
        Self { url_prefixes }
    }

    fn is_export_only(&self, url: &str) -> bool {
        self.url_prefixes.iter().any(|prefix| url.starts_with(prefix))
    }
}

impl Default for StripExportExtensions {
    fn default() -> Self {
        Self::new(vec![
            EXTENSION_DOMAIN.to_string(),
            "https://trifolia-fhir.lantanagroup.com".to_string(),
        ])
    }
}

impl ResourceTransform for StripExportExtensions {
    fn apply(&self, resource: &Value) -> Value {
        let mut stripped = resource.clone();
        let Some(extensions) = stripped.get_mut("extension").and_then(Value::as_array_mut)
        else {
            return stripped;
        };
        extensions.retain(|ext| {
            ext.get("url")
                .and_then(Value::as_str)
                .is_none_or(|url| !self.is_export_only(url))
        });
        if extensions.is_empty() {
            stripped.as_object_mut().map(|obj| obj.remove("extension"));
        }
        stripped
    }
}

/// Transform that leaves resources untouched. Used when the connected
/// store holds no tool-private state.
pub struct IdentityTransform;

impl ResourceTransform for IdentityTransform {
    fn apply(&self, resource: &Value) -> Value {
        resource.clone()
    }
}
