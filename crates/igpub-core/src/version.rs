use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Schema generation the connected FHIR server speaks.
///
/// STU3 and R4 disagree on how IG dependency and page metadata is
/// expressed, so the export pipeline selects generation-specific
/// extraction logic based on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FhirVersion {
    Stu3,
    R4,
}

impl FhirVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            FhirVersion::Stu3 => "stu3",
            FhirVersion::R4 => "r4",
        }
    }

    /// Version string written into the IG publisher control file.
    pub fn control_version(&self) -> &'static str {
        match self {
            FhirVersion::Stu3 => "3.0.1",
            FhirVersion::R4 => "4.0.0",
        }
    }

    /// Base URL of the published FHIR specification for this generation,
    /// referenced by the control file's `paths.specification`.
    pub fn specification_url(&self) -> &'static str {
        match self {
            FhirVersion::Stu3 => "http://hl7.org/fhir/STU3",
            FhirVersion::R4 => "http://hl7.org/fhir/R4/",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FhirVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stu3" | "3.0.1" | "3.0.2" => Ok(FhirVersion::Stu3),
            "r4" | "4.0.0" | "4.0.1" => Ok(FhirVersion::R4),
            _ => Err(CoreError::UnknownFhirVersion(s.to_string())),
        }
    }
}

impl Default for FhirVersion {
    fn default() -> Self {
        FhirVersion::R4
    }
}
