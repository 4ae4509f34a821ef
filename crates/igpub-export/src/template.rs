//! Site template seeding.
//!
//! Copies the baseline Jekyll site skeleton into a fresh workspace
//! before any generated content is layered on top. Landing pages start
//! with front matter only; summary generation appends sections to them
//! afterwards.

use std::fs;
use std::path::Path;

use igpub_core::Result;

fn front_matter(title: &str, active: &str) -> String {
    format!("---\ntitle: {title}\nlayout: default\nactive: {active}\n---\n\n")
}

/// Seeds `<root>` with the template directory layout and landing pages.
pub fn copy_site_template(root: &Path) -> Result<()> {
    for dir in ["framework", "source/resources", "source/pages/_includes"] {
        fs::create_dir_all(root.join(dir))?;
    }

    let pages = root.join("source").join("pages");
    let landing_pages = [
        ("index.md", front_matter("Home", "home")),
        ("profiles.md", front_matter("Profiles", "profiles")),
        ("terminology.md", front_matter("Terminology", "terminology")),
        (
            "capstatements.md",
            front_matter("Capability Statements", "capstatements"),
        ),
        ("other.md", front_matter("Other Resources", "other")),
        ("toc.md", front_matter("Table of Contents", "toc")),
    ];
    for (name, content) in landing_pages {
        fs::write(pages.join(name), content)?;
    }
    Ok(())
}
