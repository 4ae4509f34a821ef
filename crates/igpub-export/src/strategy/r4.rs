//! R4 extraction rules.
//!
//! R4 promotes dependencies to a native `dependsOn` field, with parallel
//! extensions for the pieces not yet first-class. Page content lives
//! behind `nameReference` pointing at a contained Binary, with the file
//! name derived from the page title.

use igpub_core::{Bundle, FhirVersion};
use serde_json::Value;

use super::{
    GenerationStrategy, PageFile, ResolvedPage, contained_binary, decode_binary_content,
    find_extension, page_extension,
};
use crate::control::{Control, ControlDependency};

const EXT_DEPENDS_ON_LOCATION: &str =
    "https://trifolia-fhir.lantanagroup.com/r4/StructureDefinition/extension-ig-depends-on-location";
const EXT_DEPENDS_ON_NAME: &str =
    "https://trifolia-fhir.lantanagroup.com/r4/StructureDefinition/extension-ig-depends-on-name";

pub struct R4Strategy;

fn string_value(ext: &Value) -> Option<&str> {
    ext.get("valueString")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

impl GenerationStrategy for R4Strategy {
    fn version(&self) -> FhirVersion {
        FhirVersion::R4
    }

    fn build_control(&self, guide: &Value, bundle: &Bundle) -> Control {
        let mut control = Control::base(guide, FhirVersion::R4);
        if let Some(package_id) = guide
            .get("packageId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            control.npm_name = package_id.to_string();
        }
        if let Some(license) = guide
            .get("license")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            control.license = license.to_string();
        }
        control.fixed_business_version = guide
            .get("fhirVersion")
            .and_then(Value::as_array)
            .and_then(|versions| versions.first())
            .and_then(Value::as_str)
            .map(str::to_string);
        control.dependency_list = self.dependency_list(guide);
        control.populate_resources(bundle);
        control
    }

    fn dependency_list(&self, guide: &Value) -> Vec<ControlDependency> {
        let Some(depends_on) = guide.get("dependsOn").and_then(Value::as_array) else {
            return Vec::new();
        };
        depends_on
            .iter()
            .filter_map(|dependency| {
                let location =
                    find_extension(dependency, EXT_DEPENDS_ON_LOCATION).and_then(string_value)?;
                let name =
                    find_extension(dependency, EXT_DEPENDS_ON_NAME).and_then(string_value)?;
                let version = dependency
                    .get("version")
                    .and_then(Value::as_str)
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
        guide.get("definition").and_then(|definition| definition.get("page"))
    }

    fn resolve_page(&self, guide: &Value, page: &Value) -> ResolvedPage {
        let Some(title) = page.get("title").and_then(Value::as_str) else {
            return ResolvedPage::default();
        };
        let content = page
            .get("nameReference")
            .and_then(|reference| reference.get("reference"))
            .and_then(Value::as_str)
            .and_then(|reference| contained_binary(guide, reference))
            .and_then(|binary| binary.get("data").and_then(Value::as_str))
            .and_then(decode_binary_content);

        let Some(content) = content else {
            return ResolvedPage::default();
        };

        let mut file_name = title.replace(' ', "_");
        if !file_name.contains('.') {
            file_name.push_str(page_extension(page));
        }

        ResolvedPage {
            toc_file_name: Some(file_name.clone()),
            file: Some(PageFile {
                name: file_name,
                content: content.clone(),
            }),
            content: Some(content),
        }
    }
}
