//! Page tree emission.
//!
//! Walks the IG's nested page hierarchy depth-first in pre-order,
//! extracts page bodies from contained binary attachments, writes one
//! file per resolvable page and accumulates a flat table of contents.
//! The walk itself is generation-agnostic; content resolution is
//! delegated to the active [`GenerationStrategy`].

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use igpub_core::Result;
use serde_json::Value;

use crate::strategy::{GenerationStrategy, auto_generate_toc};

/// One table-of-contents line. Order is significant: entries are
/// collected root-first in pre-order, which is the literal render order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: usize,
    /// `None` renders the entry as plain text, not a link.
    pub file_name: Option<String>,
    pub title: String,
}

pub struct PageTreeWriter<'a> {
    strategy: &'a dyn GenerationStrategy,
}

impl<'a> PageTreeWriter<'a> {
    pub fn new(strategy: &'a dyn GenerationStrategy) -> Self {
        Self { strategy }
    }

    /// Writes all page files under `<root>/source/pages` and appends the
    /// table of contents. Returns the collected entries, one per node.
    pub fn write_pages(&self, root: &Path, guide: &Value) -> Result<Vec<TocEntry>> {
        let Some(page_root) = self.strategy.page_root(guide) else {
            return Ok(Vec::new());
        };
        let pages_path = root.join("source").join("pages");
        fs::create_dir_all(&pages_path)?;

        let mut entries = Vec::new();
        self.walk(&pages_path, guide, page_root, 1, &mut entries)?;

        let fallback = self.strategy.resolve_page(guide, page_root).content;
        write_table_of_contents(root, &entries, auto_generate_toc(page_root), fallback)?;
        Ok(entries)
    }

    fn walk(
        &self,
        pages_path: &Path,
        guide: &Value,
        page: &Value,
        level: usize,
        entries: &mut Vec<TocEntry>,
    ) -> Result<()> {
        let resolved = self.strategy.resolve_page(guide, page);
        let title = page
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(file) = resolved.file {
            let content = format!(
                "---\ntitle: {title}\nlayout: default\nactive: {title}\n---\n\n{}",
                file.content
            );
            fs::write(pages_path.join(&file.name), content)?;
        }

        // One entry per node regardless of whether a file was written.
        entries.push(TocEntry {
            level,
            file_name: resolved.toc_file_name,
            title,
        });

        if let Some(children) = page.get("page").and_then(Value::as_array) {
            for child in children {
                self.walk(pages_path, guide, child, level + 1, entries)?;
            }
        }
        Ok(())
    }
}

/// Appends the table of contents to `source/pages/toc.md`.
///
/// With auto-generation enabled, entries render as an indented bullet
/// list; linked entries swap a `.md` suffix for `.html` since the
/// publisher renders markdown pages to HTML. Otherwise the root page's
/// own content is used verbatim, when it has any.
pub fn write_table_of_contents(
    root: &Path,
    entries: &[TocEntry],
    auto_generate: bool,
    root_content: Option<String>,
) -> Result<()> {
    let mut content = String::new();
    if auto_generate {
        for entry in entries {
            let file_name = entry.file_name.as_deref().map(|name| {
                match name.strip_suffix(".md") {
                    Some(stem) => format!("{stem}.html"),
                    None => name.to_string(),
                }
            });
            for _ in 1..entry.level {
                content.push_str("    ");
            }
            content.push_str("* ");
            match file_name {
                Some(file_name) => {
                    content.push_str(&format!("<a href=\"{file_name}\">{}</a>\n", entry.title))
                }
                None => {
                    content.push_str(&entry.title);
                    content.push('\n');
                }
            }
        }
    } else if let Some(root_content) = root_content {
        content = root_content;
    }

    if !content.is_empty() {
        let toc_path = root.join("source").join("pages").join("toc.md");
        let mut file = OpenOptions::new().create(true).append(true).open(toc_path)?;
        file.write_all(content.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::strategy_for;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use igpub_core::FhirVersion;
    use serde_json::json;

    const AUTO_TOC: &str =
        "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-page-auto-generate-toc";

    fn binary(id: &str, text: &str) -> Value {
        json!({ "resourceType": "Binary", "id": id, "data": BASE64.encode(text) })
    }

    /// R4 guide with a three-level page tree; the middle node has no
    /// resolvable content.
    fn r4_guide() -> Value {
        json!({
            "resourceType": "ImplementationGuide",
            "id": "ig-1",
            "contained": [binary("root", "# Root"), binary("leaf", "# Leaf")],
            "definition": {
                "page": {
                    "title": "Home",
                    "nameReference": { "reference": "#root" },
                    "extension": [{ "url": AUTO_TOC, "valueBoolean": true }],
                    "page": [
                        {
                            "title": "Section One",
                            "page": [{
                                "title": "Leaf Page",
                                "nameReference": { "reference": "#leaf" }
                            }]
                        },
                        {
                            "title": "Downloads",
                            "generation": "html",
                            "nameReference": { "reference": "#leaf" }
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_one_toc_entry_per_node_in_preorder() {
        let dir = tempfile::tempdir().unwrap();
        let guide = r4_guide();
        let entries = PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &guide)
            .unwrap();

        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Home", "Section One", "Leaf Page", "Downloads"]);
        let levels: Vec<_> = entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 3, 2]);
    }

    #[test]
    fn test_unresolvable_node_still_gets_plain_entry() {
        let dir = tempfile::tempdir().unwrap();
        let guide = r4_guide();
        let entries = PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &guide)
            .unwrap();
        let section = &entries[1];
        assert_eq!(section.title, "Section One");
        assert!(section.file_name.is_none());
    }

    #[test]
    fn test_page_files_written_with_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &r4_guide())
            .unwrap();

        let home = fs::read_to_string(dir.path().join("source/pages/Home.md")).unwrap();
        assert!(home.starts_with("---\ntitle: Home\nlayout: default\nactive: Home\n---\n\n# Root"));
        assert!(dir.path().join("source/pages/Leaf_Page.md").is_file());
        assert!(dir.path().join("source/pages/Downloads.html").is_file());
    }

    #[test]
    fn test_auto_generated_toc_links_and_indentation() {
        let dir = tempfile::tempdir().unwrap();
        PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &r4_guide())
            .unwrap();

        let toc = fs::read_to_string(dir.path().join("source/pages/toc.md")).unwrap();
        // .md links are swapped to .html, .html kept as-is.
        assert!(toc.contains("* <a href=\"Home.html\">Home</a>\n"));
        assert!(toc.contains("    * Section One\n"));
        assert!(toc.contains("        * <a href=\"Leaf_Page.html\">Leaf Page</a>\n"));
        assert!(toc.contains("    * <a href=\"Downloads.html\">Downloads</a>\n"));
    }

    #[test]
    fn test_toc_from_root_page_content_when_not_auto_generated() {
        let dir = tempfile::tempdir().unwrap();
        let mut guide = r4_guide();
        guide["definition"]["page"]["extension"] = json!([]);
        PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &guide)
            .unwrap();

        let toc = fs::read_to_string(dir.path().join("source/pages/toc.md")).unwrap();
        assert_eq!(toc, "# Root");
    }

    #[test]
    fn test_stu3_authored_toc_content_kept_when_not_auto_generated() {
        const PAGE_CONTENT: &str =
            "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-page-content";
        let dir = tempfile::tempdir().unwrap();
        let guide = json!({
            "resourceType": "ImplementationGuide",
            "id": "ig-1",
            "contained": [
                { "resourceType": "Binary", "id": "toc", "content": BASE64.encode("* [Home](index.html)") }
            ],
            "page": {
                "kind": "toc",
                "title": "Table of Contents",
                "source": "toc.md",
                "extension": [{
                    "url": PAGE_CONTENT,
                    "valueReference": { "reference": "#toc" }
                }]
            }
        });
        PageTreeWriter::new(strategy_for(FhirVersion::Stu3))
            .write_pages(dir.path(), &guide)
            .unwrap();

        // No page file for the toc node, but its authored body becomes
        // the table of contents.
        let toc = fs::read_to_string(dir.path().join("source/pages/toc.md")).unwrap();
        assert_eq!(toc, "* [Home](index.html)");
    }

    #[test]
    fn test_guide_without_pages_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let guide = json!({ "resourceType": "ImplementationGuide", "id": "ig-1" });
        let entries = PageTreeWriter::new(strategy_for(FhirVersion::R4))
            .write_pages(dir.path(), &guide)
            .unwrap();
        assert!(entries.is_empty());
        assert!(!dir.path().join("source/pages/toc.md").exists());
    }

    #[test]
    fn test_stu3_pages_through_same_walker() {
        const PAGE_CONTENT: &str =
            "https://trifolia-on-fhir.lantanagroup.com/StructureDefinition/extension-ig-page-content";
        let dir = tempfile::tempdir().unwrap();
        let guide = json!({
            "resourceType": "ImplementationGuide",
            "id": "ig-1",
            "contained": [
                { "resourceType": "Binary", "id": "home", "content": BASE64.encode("welcome") }
            ],
            "page": {
                "kind": "page",
                "title": "Home",
                "source": "index.md",
                "extension": [
                    { "url": PAGE_CONTENT, "valueReference": { "reference": "#home" } },
                    { "url": AUTO_TOC, "valueBoolean": true }
                ]
            }
        });
        let entries = PageTreeWriter::new(strategy_for(FhirVersion::Stu3))
            .write_pages(dir.path(), &guide)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name.as_deref(), Some("index.md"));
        assert!(dir.path().join("source/pages/index.md").is_file());
    }
}
