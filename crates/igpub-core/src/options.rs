use serde::{Deserialize, Serialize};

/// Overall shape of the exported artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExportFormat {
    /// A single FHIR Bundle document returned inline.
    #[default]
    #[serde(rename = "1")]
    Bundle,
    /// An on-disk publishing package, optionally rendered to HTML.
    #[serde(rename = "2")]
    Html,
}

/// Serialization format for individual resources in the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
}

impl OutputFormat {
    /// Parses the `_format` query parameter, accepting both bare and MIME
    /// spellings. Anything unrecognized falls back to JSON.
    pub fn from_param(param: &str) -> Self {
        match param {
            "xml" | "application/xml" | "application/fhir+xml" => OutputFormat::Xml,
            _ => OutputFormat::Json,
        }
    }

    pub fn is_xml(&self) -> bool {
        matches!(self, OutputFormat::Xml)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => ".json",
            OutputFormat::Xml => ".xml",
        }
    }
}

/// Caller-facing option set for one export request.
///
/// Field names map to the query parameters of `POST /export/{igId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(rename = "_format")]
    pub format: String,
    pub export_format: ExportFormat,
    pub execute_ig_publisher: bool,
    pub use_terminology_server: bool,
    pub use_latest: bool,
    pub download_output: bool,
    pub include_ig_publisher_jar: bool,
    pub socket_id: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            export_format: ExportFormat::Bundle,
            execute_ig_publisher: true,
            use_terminology_server: false,
            use_latest: false,
            download_output: true,
            include_ig_publisher_jar: false,
            socket_id: None,
        }
    }
}

impl ExportOptions {
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_param(&self.format)
    }
}
