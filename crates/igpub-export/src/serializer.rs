//! Resource serialization into the workspace.
//!
//! Each bundle entry is written under `source/resources/<type>/<id>` in
//! the requested format, with one mandatory exception: the IG resource
//! itself is always emitted as indented XML because the publisher cannot
//! consume it any other way. Any write failure is fatal to the job.

use std::fs;
use std::path::Path;

use igpub_core::{Bundle, OutputFormat, Result, bundle::resource_id, bundle::resource_type};
use tracing::debug;

use crate::transform::ResourceTransform;
use crate::xml;

pub struct ResourceSerializer<'a> {
    format: OutputFormat,
    transform: &'a dyn ResourceTransform,
}

impl<'a> ResourceSerializer<'a> {
    pub fn new(format: OutputFormat, transform: &'a dyn ResourceTransform) -> Self {
        Self { format, transform }
    }

    /// Writes every bundle entry under `<root>/source/resources`.
    pub fn write_resources(&self, root: &Path, bundle: &Bundle) -> Result<()> {
        let resources_dir = root.join("source").join("resources");
        for resource in bundle.iter() {
            let (Some(rt), Some(id)) = (resource_type(resource), resource_id(resource)) else {
                continue;
            };
            let stripped = self.transform.apply(resource);
            let type_dir = resources_dir.join(rt.to_lowercase());
            fs::create_dir_all(&type_dir)?;

            let as_xml = self.format.is_xml() || rt == "ImplementationGuide";
            let (path, content) = if as_xml {
                (type_dir.join(format!("{id}.xml")), xml::resource_to_xml(&stripped)?)
            } else {
                (
                    type_dir.join(format!("{id}.json")),
                    serde_json::to_string_pretty(&stripped)?,
                )
            };
            fs::write(&path, content)?;
            debug!(path = %path.display(), "Wrote resource");
        }
        Ok(())
    }
}
