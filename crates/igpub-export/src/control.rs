//! Control descriptor ("control file") consumed by the external IG
//! Publisher toolchain.
//!
//! The descriptor is built once per job from the assembled bundle, is
//! immutable thereafter, and is serialized into the workspace as
//! `ig.json`. Generation-specific field extraction lives in
//! [`crate::strategy`]; this module holds the shared shape.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use igpub_core::{Bundle, FhirVersion, bundle::resource_id, bundle::resource_type};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

/// Domain the tool's own extensions live under; the publisher is told to
/// allow and resolve it.
pub const EXTENSION_DOMAIN: &str = "https://trifolia-on-fhir.lantanagroup.com";

const SCT_EDITION: &str = "http://snomed.info/sct/731000124108";

/// Rendered-file naming for one resource in the control file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResource {
    pub base: String,
    pub defns: String,
}

/// One entry of the control file's `dependencyList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlDependency {
    pub location: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The `paths` block; directory layout the publisher expects.
#[derive(Debug, Clone, Serialize)]
pub struct ControlPaths {
    pub qa: String,
    pub temp: String,
    pub output: String,
    #[serde(rename = "txCache")]
    pub tx_cache: String,
    pub specification: String,
    pub pages: Vec<String>,
    pub resources: Vec<String>,
}

impl ControlPaths {
    fn for_version(version: FhirVersion) -> Self {
        Self {
            qa: "generated_output/qa".to_string(),
            temp: "generated_output/temp".to_string(),
            output: "output".to_string(),
            tx_cache: "generated_output/txCache".to_string(),
            specification: version.specification_url().to_string(),
            pages: vec!["framework".to_string(), "source/pages".to_string()],
            resources: vec!["source/resources".to_string()],
        }
    }
}

/// Declarative build manifest for one export.
#[derive(Debug, Clone, Serialize)]
pub struct Control {
    pub tool: String,
    pub source: String,
    #[serde(rename = "npm-name")]
    pub npm_name: String,
    pub license: String,
    pub paths: ControlPaths,
    pub pages: Vec<String>,
    #[serde(rename = "extension-domains")]
    pub extension_domains: Vec<String>,
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,
    #[serde(rename = "sct-edition")]
    pub sct_edition: String,
    #[serde(rename = "canonicalBase")]
    pub canonical_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "fixed-business-version", skip_serializing_if = "Option::is_none")]
    pub fixed_business_version: Option<String>,
    pub defaults: Value,
    pub resources: BTreeMap<String, ControlResource>,
    #[serde(rename = "dependencyList")]
    pub dependency_list: Vec<ControlDependency>,
}

impl Control {
    /// Shared generation-agnostic skeleton. The strategies fill in the
    /// npm name, license and dependency list afterwards.
    pub fn base(guide: &Value, version: FhirVersion) -> Self {
        let ig_id = resource_id(guide).unwrap_or_default();
        let url = guide.get("url").and_then(Value::as_str).unwrap_or_default();
        Self {
            tool: "jekyll".to_string(),
            // The IG resource is always emitted as XML for the publisher.
            source: format!("implementationguide/{ig_id}.xml"),
            npm_name: format!("{ig_id}-npm"),
            license: "CC0-1.0".to_string(),
            paths: ControlPaths::for_version(version),
            pages: vec!["pages".to_string()],
            extension_domains: vec![EXTENSION_DOMAIN.to_string()],
            allowed_domains: vec![EXTENSION_DOMAIN.to_string()],
            sct_edition: SCT_EDITION.to_string(),
            canonical_base: canonical_base(url),
            version: Some(version.control_version().to_string()),
            fixed_business_version: None,
            defaults: template_defaults().clone(),
            resources: BTreeMap::new(),
            dependency_list: Vec::new(),
        }
    }

    /// Records rendered-file names for every non-IG resource in the
    /// bundle, using the literal `<Type>-<id>.html` convention the
    /// publisher templates key off.
    pub fn populate_resources(&mut self, bundle: &Bundle) {
        for resource in bundle.iter() {
            let (Some(rt), Some(id)) = (resource_type(resource), resource_id(resource)) else {
                continue;
            };
            if rt == "ImplementationGuide" {
                continue;
            }
            self.resources.insert(
                format!("{rt}/{id}"),
                ControlResource {
                    base: format!("{rt}-{id}.html"),
                    defns: format!("{rt}-{id}-definitions.html"),
                },
            );
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Derives the canonical base URL from the IG's own canonical URL by
/// stripping the trailing `/ImplementationGuide/...` segment; when the
/// URL does not match that shape, everything after the last `/` is
/// stripped instead.
pub fn canonical_base(url: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^(.+?)/ImplementationGuide/.+$").expect("static pattern"));
    if let Some(captures) = pattern.captures(url) {
        return captures[1].to_string();
    }
    match url.rfind('/') {
        Some(index) => url[..index].to_string(),
        None => url.to_string(),
    }
}

/// Per-resource-type template defaults.
///
/// This table is data, not logic: the publisher keys off the exact
/// template file names, so it is reproduced verbatim and shared by both
/// schema generations.
pub fn template_defaults() -> &'static Value {
    static DEFAULTS: OnceLock<Value> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        json!({
            "Location": { "template-base": "ex.html" },
            "ProcedureRequest": { "template-base": "ex.html" },
            "Organization": { "template-base": "ex.html" },
            "MedicationStatement": { "template-base": "ex.html" },
            "SearchParameter": { "template-base": "base.html" },
            "StructureDefinition": {
                "template-mappings": "sd-mappings.html",
                "template-base": "sd.html",
                "template-defns": "sd-definitions.html"
            },
            "Immunization": { "template-base": "ex.html" },
            "Patient": { "template-base": "ex.html" },
            "StructureMap": {
                "content": false,
                "script": false,
                "template-base": "ex.html",
                "profiles": false
            },
            "ConceptMap": { "template-base": "base.html" },
            "Practitioner": { "template-base": "ex.html" },
            "OperationDefinition": { "template-base": "base.html" },
            "CodeSystem": { "template-base": "base.html" },
            "Communication": { "template-base": "ex.html" },
            "Any": {
                "template-format": "format.html",
                "template-base": "base.html"
            },
            "PractitionerRole": { "template-base": "ex.html" },
            "ValueSet": { "template-base": "base.html" },
            "CapabilityStatement": { "template-base": "base.html" },
            "Observation": { "template-base": "ex.html" }
        })
    })
}
