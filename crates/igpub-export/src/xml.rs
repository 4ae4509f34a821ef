//! FHIR JSON-to-XML rendition.
//!
//! The IG Publisher requires the ImplementationGuide resource (and, when
//! XML output is requested, every resource) in FHIR XML form. FHIR XML
//! maps JSON primitives to elements with a `value` attribute, objects to
//! nested elements, arrays to repeated elements, and embeds narrative
//! `div` content as raw XHTML.

use igpub_core::{CoreError, Result, bundle::resource_type};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;

const FHIR_XMLNS: &str = "http://hl7.org/fhir";

/// Renders a resource document as indented FHIR XML.
pub fn resource_to_xml(resource: &Value) -> Result<String> {
    let root_name = resource_type(resource)
        .ok_or_else(|| CoreError::xml("resource is missing resourceType"))?;

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut root = BytesStart::new(root_name);
    root.push_attribute(("xmlns", FHIR_XMLNS));
    writer
        .write_event(Event::Start(root))
        .map_err(|e| CoreError::xml(e.to_string()))?;

    if let Some(fields) = resource.as_object() {
        for (key, value) in fields {
            if key == "resourceType" {
                continue;
            }
            write_field(&mut writer, key, value)?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(root_name)))
        .map_err(|e| CoreError::xml(e.to_string()))?;

    String::from_utf8(writer.into_inner()).map_err(|e| CoreError::xml(e.to_string()))
}

fn write_field(writer: &mut Writer<Vec<u8>>, key: &str, value: &Value) -> Result<()> {
    // Primitive extensions ("_field") have no counterpart in the
    // publisher input we produce.
    if key.starts_with('_') {
        return Ok(());
    }
    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            for item in items {
                write_single(writer, key, item)?;
            }
            Ok(())
        }
        other => write_single(writer, key, other),
    }
}

fn write_single(writer: &mut Writer<Vec<u8>>, key: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(fields) => {
            writer
                .write_event(Event::Start(BytesStart::new(key)))
                .map_err(|e| CoreError::xml(e.to_string()))?;
            for (child_key, child_value) in fields {
                write_field(writer, child_key, child_value)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(key)))
                .map_err(|e| CoreError::xml(e.to_string()))
        }
        Value::String(text) if key == "div" => {
            // Narrative is already a complete xhtml `<div>` element;
            // emit it verbatim rather than as a value attribute.
            writer
                .write_event(Event::Text(BytesText::from_escaped(text.as_str())))
                .map_err(|e| CoreError::xml(e.to_string()))
        }
        primitive => {
            let text = match primitive {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut element = BytesStart::new(key);
            element.push_attribute(("value", text.as_str()));
            writer
                .write_event(Event::Empty(element))
                .map_err(|e| CoreError::xml(e.to_string()))
        }
    }
}
