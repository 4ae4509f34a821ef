//! STU3 extraction rules.
//!
//! STU3 has no first-class dependency model, so dependencies live in a
//! flat set of sibling extensions under a dependency extension. Page
//! content hangs off a page-content extension referencing a contained
//! Binary.

use igpub_core::{Bundle, FhirVersion};
use serde_json::Value;

use super::{
    GenerationStrategy, PageFile, ResolvedPage, contained_binary, decode_binary_content,
    find_extension,
};
use crate::control::{Control, ControlDependency};

const EXT_DEPENDENCY: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-dependency";
const EXT_DEPENDENCY_LOCATION: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-dependency-location";
const EXT_DEPENDENCY_NAME: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-dependency-name";
const EXT_DEPENDENCY_VERSION: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-dependency-version";
const EXT_PACKAGE_ID: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-package-id";
const EXT_PAGE_CONTENT: &str =
    "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-page-content";

pub struct Stu3Strategy;

/// Reads a location value, accepting both `valueUri` and `valueString`
/// spellings seen in the wild.
fn location_value(ext: &Value) -> Option<&str> {
    ext.get("valueUri")
        .or_else(|| ext.get("valueString"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn string_value(ext: &Value) -> Option<&str> {
    ext.get("valueString")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

impl GenerationStrategy for Stu3Strategy {
    fn version(&self) -> FhirVersion {
        FhirVersion::Stu3
    }

    fn build_control(&self, guide: &Value, bundle: &Bundle) -> Control {
        let mut control = Control::base(guide, FhirVersion::Stu3);
        if let Some(package_id) =
            find_extension(guide, EXT_PACKAGE_ID).and_then(string_value)
        {
            control.npm_name = package_id.to_string();
        }
        control.dependency_list = self.dependency_list(guide);
        control.populate_resources(bundle);
        control
    }

    fn dependency_list(&self, guide: &Value) -> Vec<ControlDependency> {
        let Some(extensions) = guide.get("extension").and_then(Value::as_array) else {
            return Vec::new();
        };
        extensions
            .iter()
            .filter(|ext| ext.get("url").and_then(Value::as_str) == Some(EXT_DEPENDENCY))
            .filter_map(|dependency| {
                let location =
                    find_extension(dependency, EXT_DEPENDENCY_LOCATION).and_then(location_value)?;
                let name = find_extension(dependency, EXT_DEPENDENCY_NAME).and_then(string_value)?;
                let version = find_extension(dependency, EXT_DEPENDENCY_VERSION)
                    .and_then(string_value)
                    .map(str::to_string);
                Some(ControlDependency {
                    location: location.to_string(),
                    name: name.to_string(),
                    version,
                })
            })
            .collect()
    }

    fn page_root<'a>(&self, guide: &'a Value) -> Option<&'a Value> {
        guide.get("page")
    }

    fn resolve_page(&self, guide: &Value, page: &Value) -> ResolvedPage {
        let kind = page.get("kind").and_then(Value::as_str);
        let source = page.get("source").and_then(Value::as_str);

        let content = find_extension(page, EXT_PAGE_CONTENT)
            .and_then(|ext| ext.get("valueReference"))
            .and_then(|reference| reference.get("reference"))
            .and_then(Value::as_str)
            .and_then(|reference| contained_binary(guide, reference))
            .and_then(|binary| binary.get("content").and_then(Value::as_str))
            .and_then(decode_binary_content);

        let (file, toc_file_name) = match (source, content.as_ref()) {
            (Some(source), Some(content)) => {
                // "toc" pages carry generated content the publisher
                // produces itself; only record real pages in the TOC.
                let file = (kind != Some("toc")).then(|| PageFile {
                    name: source.to_string(),
                    content: content.clone(),
                });
                let toc_name = (kind == Some("page")).then(|| source.to_string());
                (file, toc_name)
            }
            _ => (None, None),
        };

        ResolvedPage {
            file,
            toc_file_name,
            content,
        }
    }
}
