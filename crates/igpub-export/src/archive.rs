//! Package download archiving.
//!
//! Zips a finished export workspace into an in-memory archive and
//! removes the workspace afterwards, making downloads one-shot.

use std::fs;
use std::io::{Cursor, Read as _, Write as _};
use std::path::{Path, PathBuf};

use igpub_core::{CoreError, Result};
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub struct PackageArchiveStore {
    export_root: PathBuf,
}

impl PackageArchiveStore {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_root: export_root.into(),
        }
    }

    /// Builds a zip of the named package's workspace and deletes the
    /// workspace once the archive is fully in memory. Unknown or
    /// malformed package ids report as not found.
    pub fn archive(&self, package_id: &str) -> Result<Vec<u8>> {
        let package_path = self.resolve(package_id)?;
        let bytes = zip_directory(&package_path)?;
        fs::remove_dir_all(&package_path)?;
        debug!(package_id, size = bytes.len(), "archived and removed package workspace");
        Ok(bytes)
    }

    fn resolve(&self, package_id: &str) -> Result<PathBuf> {
        // Package ids are single path segments; anything else could
        // escape the export root.
        let valid = !package_id.is_empty()
            && !package_id.contains('/')
            && !package_id.contains('\\')
            && package_id != "."
            && package_id != "..";
        if !valid {
            return Err(CoreError::download_target_not_found(package_id));
        }
        let package_path = self.export_root.join(package_id);
        if !package_path.is_dir() {
            return Err(CoreError::download_target_not_found(package_id));
        }
        Ok(package_path)
    }
}

fn zip_directory(root: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut buffer = Vec::new();
    add_directory(&mut writer, options, root, Path::new(""), &mut buffer)?;
    let cursor = writer
        .finish()
        .map_err(|err| CoreError::Storage(format!("failed to finalize archive: {err}")))?;
    Ok(cursor.into_inner())
}

fn add_directory(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    dir: &Path,
    prefix: &Path,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = prefix.join(entry.file_name());
        // Archive entry names always use forward slashes.
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if path.is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(|err| CoreError::Storage(format!("failed to add directory: {err}")))?;
            add_directory(writer, options, &path, &relative, buffer)?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|err| CoreError::Storage(format!("failed to add file: {err}")))?;
            buffer.clear();
            fs::File::open(&path)?.read_to_end(buffer)?;
            writer.write_all(buffer)?;
        }
    }
    Ok(())
}
