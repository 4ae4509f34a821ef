//! Schema-generation strategies.
//!
//! STU3 and R4 disagree on how an IG expresses dependency metadata and
//! where nested page content lives. The pipeline itself is written once;
//! everything generation-specific is isolated behind
//! [`GenerationStrategy`] so the two extraction rules stay independently
//! testable.

mod r4;
mod stu3;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use igpub_core::{Bundle, FhirVersion};
use serde_json::Value;

pub use r4::R4Strategy;
pub use stu3::Stu3Strategy;

use crate::control::{Control, ControlDependency};

/// Extension marking a page tree root whose table of contents should be
/// generated from the tree walk rather than taken from page content.
pub const AUTO_GENERATE_TOC_URL: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-page-auto-generate-toc";

/// A page file resolved from the IG's nested page structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub name: String,
    pub content: String,
}

/// Outcome of resolving one page node.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPage {
    /// File to emit, when the node carries resolvable content.
    pub file: Option<PageFile>,
    /// Name recorded in the table of contents; `None` renders the entry
    /// as plain text instead of a link.
    pub toc_file_name: Option<String>,
    /// Decoded page body, present whenever the node carries content,
    /// even when no file is emitted for it.
    pub content: Option<String>,
}

/// Generation-specific extraction rules.
pub trait GenerationStrategy: Send + Sync {
    fn version(&self) -> FhirVersion;

    /// Builds the complete control descriptor for this generation.
    /// Pure: no I/O.
    fn build_control(&self, guide: &Value, bundle: &Bundle) -> Control;

    /// Extracts `{location, name, version}` dependency triples. Entries
    /// missing either a location or a name are silently excluded.
    fn dependency_list(&self, guide: &Value) -> Vec<ControlDependency>;

    /// The root of the IG's nested page tree, when one is declared.
    fn page_root<'a>(&self, guide: &'a Value) -> Option<&'a Value>;

    /// Resolves one page node into its file and table-of-contents name.
    fn resolve_page(&self, guide: &Value, page: &Value) -> ResolvedPage;
}

/// Returns the strategy for a schema generation.
pub fn strategy_for(version: FhirVersion) -> &'static dyn GenerationStrategy {
    match version {
        FhirVersion::Stu3 => &Stu3Strategy,
        FhirVersion::R4 => &R4Strategy,
    }
}

/// Finds the first extension with the given URL in an `extension` array.
pub(crate) fn find_extension<'a>(carrier: &'a Value, url: &str) -> Option<&'a Value> {
    carrier
        .get("extension")
        .and_then(Value::as_array)?
        .iter()
        .find(|ext| ext.get("url").and_then(Value::as_str) == Some(url))
}

/// Dereferences an internal `#fragment` reference into a contained
/// Binary resource.
pub(crate) fn contained_binary<'a>(guide: &'a Value, reference: &str) -> Option<&'a Value> {
    let fragment = reference.strip_prefix('#')?;
    guide
        .get("contained")
        .and_then(Value::as_array)?
        .iter()
        .find(|contained| {
            contained.get("resourceType").and_then(Value::as_str) == Some("Binary")
                && contained.get("id").and_then(Value::as_str) == Some(fragment)
        })
}

/// Decodes a base64 Binary payload into text. Undecodable payloads
/// resolve to no content rather than failing the page walk.
pub(crate) fn decode_binary_content(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

/// File extension for a page without one, chosen by the page's content
/// generation hint.
pub(crate) fn page_extension(page: &Value) -> &'static str {
    match page.get("generation").and_then(Value::as_str) {
        Some("html") | Some("generated") => ".html",
        Some("xml") => ".xml",
        _ => ".md",
    }
}

/// Whether the page tree root opts into an auto-generated table of
/// contents.
pub fn auto_generate_toc(page: &Value) -> bool {
    find_extension(page, AUTO_GENERATE_TOC_URL)
        .and_then(|ext| ext.get("valueBoolean"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_extension() {
        let carrier = json!({
            "extension": [
                { "url": "http://a", "valueString": "one" },
                { "url": "http://b", "valueString": "two" }
            ]
        });
        assert_eq!(find_extension(&carrier, "http://b").unwrap()["valueString"], "two");
        assert!(find_extension(&carrier, "http://c").is_none());
        assert!(find_extension(&json!({}), "http://a").is_none());
    }

    #[test]
    fn test_contained_binary_resolution() {
        let guide = json!({
            "contained": [
                { "resourceType": "Binary", "id": "page1", "content": "aGVsbG8=" },
                { "resourceType": "ValueSet", "id": "not-binary" }
            ]
        });
        assert!(contained_binary(&guide, "#page1").is_some());
        assert!(contained_binary(&guide, "#not-binary").is_none());
        assert!(contained_binary(&guide, "#missing").is_none());
        assert!(contained_binary(&guide, "page1").is_none());
    }

    #[test]
    fn test_decode_binary_content() {
        assert_eq!(decode_binary_content("aGVsbG8=").as_deref(), Some("hello"));
        assert!(decode_binary_content("not base64!!!").is_none());
    }

    #[test]
    fn test_page_extension_hints() {
        assert_eq!(page_extension(&json!({ "generation": "html" })), ".html");
        assert_eq!(page_extension(&json!({ "generation": "generated" })), ".html");
        assert_eq!(page_extension(&json!({ "generation": "xml" })), ".xml");
        assert_eq!(page_extension(&json!({ "generation": "markdown" })), ".md");
        assert_eq!(page_extension(&json!({})), ".md");
    }

    #[test]
    fn test_auto_generate_toc() {
        let page = json!({
            "extension": [{ "url": AUTO_GENERATE_TOC_URL, "valueBoolean": true }]
        });
        assert!(auto_generate_toc(&page));
        assert!(!auto_generate_toc(&json!({})));
        let off = json!({
            "extension": [{ "url": AUTO_GENERATE_TOC_URL, "valueBoolean": false }]
        });
        assert!(!auto_generate_toc(&off));
    }
}
