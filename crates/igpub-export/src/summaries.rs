//! Summary page generation.
//!
//! Emits per-resource include placeholders under `_includes/` and
//! appends categorized listings to the template's landing pages:
//! profiles and extensions, terminology, capability statements, an
//! "other" catch-all, plus description and author sections on the home
//! page.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use igpub_core::{Bundle, Result, resource_id, resource_type};
use serde_json::Value;

/// Per-resource include placeholders: an intro file carrying the
/// resource description and empty search/summary stubs the site
/// template pulls in when rendering the resource page.
pub fn write_resource_includes(root: &Path, bundle: &Bundle) -> Result<()> {
    let includes_path = root.join("source").join("pages").join("_includes");
    fs::create_dir_all(&includes_path)?;

    for resource in bundle.iter() {
        let Some(rt) = resource_type(resource) else {
            continue;
        };
        if rt == "ImplementationGuide" {
            continue;
        }
        let Some(id) = resource_id(resource) else {
            continue;
        };

        let intro_title = format!("{rt}-{id}-intro");
        let mut intro = format!(
            "---\ntitle: {intro_title}\nlayout: default\nactive: {intro_title}\n---\n\n"
        );
        if let Some(description) = resource.get("description").and_then(Value::as_str) {
            intro.push_str(description);
        }
        fs::write(includes_path.join(format!("{id}-intro.md")), intro)?;
        fs::write(includes_path.join(format!("{id}-search.md")), "TODO - Search")?;
        fs::write(includes_path.join(format!("{id}-summary.md")), "TODO - Summary")?;
    }
    Ok(())
}

/// Appends generated sections to the template's landing pages and the
/// home page. Bundle entries are de-duplicated by id first; resources
/// sharing an id are listed once.
pub fn append_summary_pages(root: &Path, bundle: &Bundle) -> Result<()> {
    let pages_path = root.join("source").join("pages");
    fs::create_dir_all(&pages_path)?;

    let resources = distinct_by_id(bundle.entries());
    let buckets = SummaryBuckets::partition(&resources);

    if let Ok(guide) = bundle.implementation_guide() {
        append(&pages_path.join("index.md"), &home_sections(guide))?;
    }
    append(&pages_path.join("profiles.md"), &buckets.profile_sections())?;
    append(&pages_path.join("terminology.md"), &buckets.terminology_sections())?;
    append(
        &pages_path.join("capstatements.md"),
        &buckets.capability_sections(),
    )?;
    append(&pages_path.join("other.md"), &buckets.other_sections())?;
    Ok(())
}

fn append(path: &Path, content: &str) -> Result<()> {
    if content.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn distinct_by_id(entries: &[Value]) -> Vec<&Value> {
    let mut seen = std::collections::HashSet::new();
    entries
        .iter()
        .filter(|resource| match resource_id(resource) {
            Some(id) => seen.insert(id.to_string()),
            None => false,
        })
        .collect()
}

#[derive(Default)]
struct SummaryBuckets<'a> {
    profiles: Vec<&'a Value>,
    extensions: Vec<&'a Value>,
    value_sets: Vec<&'a Value>,
    code_systems: Vec<&'a Value>,
    capability_statements: Vec<&'a Value>,
    other: Vec<&'a Value>,
}

impl<'a> SummaryBuckets<'a> {
    fn partition(resources: &[&'a Value]) -> Self {
        let mut buckets = Self::default();
        for resource in resources {
            match resource_type(resource).unwrap_or_default() {
                "ImplementationGuide" => {}
                "StructureDefinition" => {
                    let base = resource
                        .get("baseDefinition")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if base.ends_with("Extension") {
                        buckets.extensions.push(resource);
                    } else {
                        buckets.profiles.push(resource);
                    }
                }
                "ValueSet" => buckets.value_sets.push(resource),
                "CodeSystem" => buckets.code_systems.push(resource),
                "CapabilityStatement" => buckets.capability_statements.push(resource),
                _ => buckets.other.push(resource),
            }
        }
        buckets
    }

    fn profile_sections(&self) -> String {
        let mut content = String::new();
        content.push_str(&linked_table("Profiles", &self.profiles));
        content.push_str(&linked_table("Extensions", &self.extensions));
        content
    }

    fn terminology_sections(&self) -> String {
        let mut content = String::new();
        content.push_str(&linked_list("Value Sets", "ValueSet", &self.value_sets));
        content.push_str(&linked_list("Code Systems", "CodeSystem", &self.code_systems));
        content
    }

    fn capability_sections(&self) -> String {
        linked_table("Capability Statements", &self.capability_statements)
    }

    fn other_sections(&self) -> String {
        if self.other.is_empty() {
            return String::new();
        }
        let mut entries: Vec<(String, String, String)> = self
            .other
            .iter()
            .map(|resource| {
                let rt = resource_type(resource).unwrap_or_default().to_string();
                let id = resource_id(resource).unwrap_or_default().to_string();
                let name = resource
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| resource.get("name").and_then(display_name))
                    .unwrap_or_else(|| id.clone());
                (rt, id, name)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.cmp(&b.2)));
        let rows: Vec<[String; 2]> = entries
            .into_iter()
            .map(|(rt, id, name)| {
                let link = format!("<a href=\"{rt}-{id}.html\">{name}</a>");
                [rt, link]
            })
            .collect();
        format!("### Other Resources\n\n{}\n\n", html_table(&["Type", "Name"], &rows))
    }
}

/// Home page sections: the guide description plus an authors table
/// built from `contact`, picking each contact's email telecom.
fn home_sections(guide: &Value) -> String {
    let mut content = String::new();
    if let Some(description) = guide.get("description").and_then(Value::as_str) {
        content.push_str(&format!("### Description\n\n{description}\n\n"));
    }
    if let Some(contacts) = guide.get("contact").and_then(Value::as_array) {
        let rows: Vec<[String; 2]> = contacts
            .iter()
            .map(|contact| {
                let name = contact
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let email = contact
                    .get("telecom")
                    .and_then(Value::as_array)
                    .and_then(|telecoms| {
                        telecoms.iter().find(|t| {
                            t.get("system").and_then(Value::as_str) == Some("email")
                        })
                    })
                    .and_then(|t| t.get("value"))
                    .and_then(Value::as_str)
                    .map(|value| {
                        let address = value.strip_prefix("mailto:").unwrap_or(value);
                        format!("<a href=\"mailto:{address}\">{address}</a>")
                    })
                    .unwrap_or_default();
                [name, email]
            })
            .collect();
        if !rows.is_empty() {
            content.push_str(&format!(
                "### Authors\n\n{}\n\n",
                html_table(&["Name", "Email"], &rows)
            ));
        }
    }
    content
}

/// Name/Description table where each name links to the rendered
/// `<Type>-<id>.html` page, sorted by name.
fn linked_table(heading: &str, resources: &[&Value]) -> String {
    if resources.is_empty() {
        return String::new();
    }
    let mut entries: Vec<(String, [String; 2])> = resources
        .iter()
        .map(|resource| {
            let rt = resource_type(resource).unwrap_or_default();
            let id = resource_id(resource).unwrap_or_default();
            let name = resource
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| resource.get("title").and_then(Value::as_str))
                .unwrap_or(id);
            let description = resource
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            (
                name.to_string(),
                [
                    format!("<a href=\"{rt}-{id}.html\">{name}</a>"),
                    description.to_string(),
                ],
            )
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let rows: Vec<[String; 2]> = entries.into_iter().map(|(_, row)| row).collect();
    format!(
        "### {heading}\n\n{}\n\n",
        html_table(&["Name", "Description"], &rows)
    )
}

/// Bullet list of links to `<Type>-<id>.html`, sorted by display text.
fn linked_list(heading: &str, link_type: &str, resources: &[&Value]) -> String {
    if resources.is_empty() {
        return String::new();
    }
    let mut items: Vec<String> = resources
        .iter()
        .map(|resource| {
            let id = resource_id(resource).unwrap_or_default();
            let display = resource
                .get("title")
                .and_then(Value::as_str)
                .or_else(|| resource.get("name").and_then(Value::as_str))
                .unwrap_or(id);
            format!("- [{display}]({link_type}-{id}.html)\n")
        })
        .collect();
    items.sort();
    format!("### {heading}\n\n{}\n", items.concat())
}

/// Contact and resource names are either plain strings or HumanName
/// structures; render the latter as "given family".
fn display_name(name: &Value) -> Option<String> {
    if let Some(name) = name.as_str() {
        return Some(name.to_string());
    }
    let family = name.get("family").and_then(Value::as_str).unwrap_or_default();
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let full = format!("{given} {family}").trim().to_string();
    (!full.is_empty()).then_some(full)
}

fn html_table(headers: &[&str], rows: &[[String; 2]]) -> String {
    let mut table = String::from("<table>\n<thead>\n<tr>\n");
    for header in headers {
        table.push_str(&format!("<th>{header}</th>\n"));
    }
    table.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in rows {
        table.push_str("<tr>\n");
        for cell in row {
            table.push_str(&format!("<td>{cell}</td>\n"));
        }
        table.push_str("</tr>\n");
    }
    table.push_str("</tbody>\n</table>\n");
    table
}
