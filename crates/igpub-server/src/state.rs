//! Shared application state.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use igpub_export::{
    ExportOrchestrator, PackageArchiveStore, ProgressBroker, StripExportExtensions,
};
use igpub_storage::MemoryRepository;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<MemoryRepository>,
    pub orchestrator: Arc<ExportOrchestrator>,
    pub archive: Arc<PackageArchiveStore>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        let repository = Arc::new(MemoryRepository::new());
        if let Some(seed_dir) = &config.export.seed_dir {
            match seed_repository(&repository, seed_dir) {
                Ok(count) => info!(count, path = %seed_dir.display(), "seeded repository"),
                Err(err) => warn!(error = %err, "repository seed failed, starting empty"),
            }
        }

        let orchestrator = Arc::new(ExportOrchestrator::new(
            repository.clone(),
            Arc::new(StripExportExtensions::default()),
            ProgressBroker::new(),
            config.orchestrator_config()?,
        ));
        let archive = Arc::new(PackageArchiveStore::new(config.export_root()));

        Ok(Self {
            repository,
            orchestrator,
            archive,
        })
    }

    pub fn broker(&self) -> &ProgressBroker {
        self.orchestrator.broker()
    }
}

/// Loads every `*.json` file in the directory into the repository.
/// Files may hold a single resource or a Bundle of resources.
fn seed_repository(repository: &MemoryRepository, dir: &Path) -> Result<usize, String> {
    let mut count = 0;
    let entries = fs::read_dir(dir).map_err(|e| format!("cannot read {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path).map_err(|e| e.to_string())?;
        let document: Value =
            serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))?;

        if document.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            if let Some(entries) = document.get("entry").and_then(Value::as_array) {
                for entry in entries {
                    if let Some(resource) = entry.get("resource") {
                        repository
                            .insert(resource.clone())
                            .map_err(|e| format!("{}: {e}", path.display()))?;
                        count += 1;
                    }
                }
            }
        } else {
            repository
                .insert(document)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            count += 1;
        }
    }
    Ok(count)
}
