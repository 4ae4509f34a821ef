//! Export orchestration.
//!
//! Drives a full export: allocate a workspace, assemble the bundle,
//! serialize resources, build the control file and site content, then
//! optionally run the IG Publisher and deploy its output. The pipeline
//! runs on a spawned task so the caller gets the package id back
//! immediately and follows progress over the broker.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use igpub_core::{CoreError, ExportOptions, FhirVersion, Result};
use igpub_storage::FhirRepository;
use tracing::{error, info};

use crate::assembler::BundleAssembler;
use crate::progress::{ProgressBroker, ProgressChannel};
use crate::publisher::{LineSanitizer, PublisherAcquirer, PublisherConfig, run_publisher};
use crate::serializer::ResourceSerializer;
use crate::strategy::strategy_for;
use crate::transform::ResourceTransform;
use crate::{pages::PageTreeWriter, summaries, template};

/// Lifecycle of a single export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    InProgress { implementation_guide_id: String },
    Complete,
    Failed { message: String },
}

/// Advisory view of running and finished exports. Callers may consult
/// it before starting an export for the same guide; nothing prevents
/// concurrent exports, each gets its own workspace.
#[derive(Debug, Default)]
pub struct ExportRegistry {
    jobs: DashMap<String, ExportStatus>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, package_id: &str) -> Option<ExportStatus> {
        self.jobs.get(package_id).map(|entry| entry.clone())
    }

    /// Whether any job for this guide is currently in progress.
    pub fn exporting(&self, implementation_guide_id: &str) -> bool {
        self.jobs.iter().any(|entry| {
            matches!(
                entry.value(),
                ExportStatus::InProgress { implementation_guide_id: id } if id == implementation_guide_id
            )
        })
    }

    fn insert(&self, package_id: &str, implementation_guide_id: &str) {
        self.jobs.insert(
            package_id.to_string(),
            ExportStatus::InProgress {
                implementation_guide_id: implementation_guide_id.to_string(),
            },
        );
    }

    fn mark_complete(&self, package_id: &str) {
        self.jobs.insert(package_id.to_string(), ExportStatus::Complete);
    }

    fn mark_failed(&self, package_id: &str, message: impl Into<String>) {
        self.jobs.insert(
            package_id.to_string(),
            ExportStatus::Failed {
                message: message.into(),
            },
        );
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Server identity segment used in deployment paths.
    pub fhir_server_id: String,
    pub fhir_version: FhirVersion,
    /// Root under which per-export workspaces are allocated.
    pub export_root: PathBuf,
    /// Root the publisher's rendered output is deployed beneath.
    pub deploy_root: PathBuf,
    /// How long to wait for a progress subscriber before starting.
    pub ready_grace: Duration,
    pub publisher: PublisherConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fhir_server_id: "default".to_string(),
            fhir_version: FhirVersion::default(),
            export_root: std::env::temp_dir(),
            deploy_root: PathBuf::from("igs"),
            ready_grace: Duration::from_secs(2),
            publisher: PublisherConfig::default(),
        }
    }
}

pub struct ExportOrchestrator {
    repository: Arc<dyn FhirRepository>,
    transform: Arc<dyn ResourceTransform>,
    broker: ProgressBroker,
    registry: Arc<ExportRegistry>,
    config: OrchestratorConfig,
}

impl ExportOrchestrator {
    pub fn new(
        repository: Arc<dyn FhirRepository>,
        transform: Arc<dyn ResourceTransform>,
        broker: ProgressBroker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            transform,
            broker,
            registry: Arc::new(ExportRegistry::new()),
            config,
        }
    }

    pub fn registry(&self) -> &ExportRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &ProgressBroker {
        &self.broker
    }

    /// Kicks off an export and returns its package id. The pipeline
    /// itself runs on a background task; failures surface as error
    /// events and in the registry, never as a panic.
    pub fn start_export(
        self: &Arc<Self>,
        implementation_guide_id: &str,
        options: ExportOptions,
    ) -> Result<String> {
        let workspace = self.allocate_workspace()?;
        let package_id = workspace
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CoreError::workspace_allocation("workspace path has no final segment"))?;

        self.registry.insert(&package_id, implementation_guide_id);
        let channel = self.broker.channel(&package_id, options.socket_id.as_deref());
        info!(package_id, implementation_guide_id, "export started");

        let orchestrator = Arc::clone(self);
        let guide_id = implementation_guide_id.to_string();
        tokio::spawn(async move {
            // Give the announced subscriber a moment to attach so early
            // progress is not dropped.
            channel.await_ready(orchestrator.config.ready_grace).await;
            match orchestrator
                .run_pipeline(&guide_id, &options, &workspace, &channel)
                .await
            {
                Ok(()) => info!(package_id = channel.package_id(), "export finished"),
                Err(err) => {
                    error!(package_id = channel.package_id(), error = %err, "export failed");
                    channel.error(format!("Error during export: {err}"));
                    orchestrator
                        .registry
                        .mark_failed(channel.package_id(), err.to_string());
                }
            }
        });

        Ok(package_id)
    }

    /// Fresh uniquely named directory under the export root. The
    /// directory name doubles as the package id.
    fn allocate_workspace(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.export_root)
            .map_err(|err| CoreError::workspace_allocation(err.to_string()))?;
        let dir = tempfile::Builder::new()
            .prefix("ig-")
            .tempdir_in(&self.config.export_root)
            .map_err(|err| CoreError::workspace_allocation(err.to_string()))?;
        Ok(dir.keep())
    }

    async fn run_pipeline(
        &self,
        implementation_guide_id: &str,
        options: &ExportOptions,
        workspace: &Path,
        channel: &ProgressChannel,
    ) -> Result<()> {
        channel.progress("Created temp directory. Retrieving resources for implementation guide.");
        let bundle = BundleAssembler::new(self.repository.as_ref())
            .assemble(implementation_guide_id)
            .await?;

        channel.progress("Resources retrieved. Packaging.");
        template::copy_site_template(workspace)?;
        ResourceSerializer::new(options.output_format(), self.transform.as_ref())
            .write_resources(workspace, &bundle)?;

        let guide = bundle.implementation_guide()?.clone();
        let strategy = strategy_for(self.config.fhir_version);
        let control = strategy.build_control(&guide, &bundle);
        let control_path = workspace.join("ig.json");
        fs::write(&control_path, control.to_pretty_json()?)?;

        summaries::write_resource_includes(workspace, &bundle)?;
        summaries::append_summary_pages(workspace, &bundle)?;
        PageTreeWriter::new(strategy).write_pages(workspace, &guide)?;
        channel.progress("Done building package");

        let acquirer = PublisherAcquirer::new(self.config.publisher.clone());
        let jar = acquirer
            .acquire(options.use_latest, options.execute_ig_publisher, channel)
            .await?;

        let Some(jar) = jar else {
            // Execution not planned: the raw, unrendered package is the
            // final product.
            self.finish(
                implementation_guide_id,
                options,
                workspace,
                channel,
                "Done. You will be prompted to download the package in a moment.",
            )?;
            return Ok(());
        };

        if options.include_ig_publisher_jar && jar.is_file() {
            channel.progress("Copying IG Publisher JAR to working directory.");
            if let Some(name) = jar.file_name() {
                fs::copy(&jar, workspace.join(name))?;
            }
        }

        let flavor = if options.use_latest { "latest" } else { "default" };
        channel.progress(format!("Running {flavor} IG Publisher"));
        let sanitizer = LineSanitizer::new().with_path(workspace);
        let outcome = run_publisher(
            &self.config.publisher,
            &jar,
            &control_path,
            options.use_terminology_server,
            &sanitizer,
            channel,
        )
        .await?;

        if outcome.timed_out {
            let message = format!(
                "The IG Publisher did not finish within {} seconds and was stopped",
                self.config.publisher.timeout.as_secs()
            );
            channel.error(&message);
            self.registry.mark_failed(channel.package_id(), message);
            // Workspace kept so the partial output stays downloadable.
            return Ok(());
        }

        channel.progress(format!(
            "IG Publisher is done executing with code {}",
            outcome.exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
        ));

        if outcome.succeeded() {
            channel.progress("Copying output to deployment path.");
            let deploy_path = self
                .config
                .deploy_root
                .join(&self.config.fhir_server_id)
                .join(implementation_guide_id);
            fs::create_dir_all(&deploy_path)?;
            copy_dir_recursive(&workspace.join("output"), &deploy_path)?;

            let generated = workspace.join("generated_output");
            if generated.is_dir() {
                fs::remove_dir_all(&generated)?;
            }
        } else {
            channel.progress("The IG Publisher failed. Skipping deployment.");
        }

        self.finish(
            implementation_guide_id,
            options,
            workspace,
            channel,
            "Done executing the FHIR IG Publisher. You will be prompted to download the package in a moment.",
        )?;
        Ok(())
    }

    /// Terminal bookkeeping for a non-failed export: completion event,
    /// registry update, and workspace cleanup when no download follows.
    fn finish(
        &self,
        implementation_guide_id: &str,
        options: &ExportOptions,
        workspace: &Path,
        channel: &ProgressChannel,
        message: &str,
    ) -> Result<()> {
        channel.complete(message);
        self.registry.mark_complete(channel.package_id());
        info!(
            package_id = channel.package_id(),
            implementation_guide_id, "export complete"
        );
        if !options.download_output {
            fs::remove_dir_all(workspace)?;
        }
        Ok(())
    }
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;
    if !source.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressStatus;
    use crate::transform::StripExportExtensions;
    use igpub_storage::MemoryRepository;
    use serde_json::json;

    fn seeded_repository() -> Arc<MemoryRepository> {
        let repository = MemoryRepository::new();
        repository.insert(json!({
            "resourceType": "ImplementationGuide",
            "id": "ig-1",
            "url": "http://example.com/fhir/ImplementationGuide/ig-1",
            "name": "ExampleIg",
            "description": "An example guide.",
            "definition": {
                "resource": [
                    { "reference": { "reference": "StructureDefinition/sd-1" } }
                ]
            }
        })).unwrap();
        repository.insert(json!({
            "resourceType": "StructureDefinition",
            "id": "sd-1",
            "name": "PatientProfile",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Patient"
        })).unwrap();
        Arc::new(repository)
    }

    fn orchestrator(config: OrchestratorConfig) -> Arc<ExportOrchestrator> {
        Arc::new(ExportOrchestrator::new(
            seeded_repository(),
            Arc::new(StripExportExtensions::default()),
            ProgressBroker::new(),
            config,
        ))
    }

    fn no_publisher_options() -> ExportOptions {
        ExportOptions {
            execute_ig_publisher: false,
            ..ExportOptions::default()
        }
    }

    async fn wait_for_terminal(
        events: &mut tokio::sync::broadcast::Receiver<crate::progress::ProgressEvent>,
    ) -> crate::progress::ProgressEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for terminal event")
                .expect("event channel closed");
            if event.status != ProgressStatus::Progress {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_export_without_publisher_builds_package() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(OrchestratorConfig {
            export_root: root.path().to_path_buf(),
            deploy_root: root.path().join("deploy"),
            ready_grace: Duration::from_millis(50),
            ..OrchestratorConfig::default()
        });

        let mut events = orchestrator.broker().subscribe("sock-1");
        orchestrator.broker().mark_ready("sock-1");
        let package_id = orchestrator
            .start_export(
                "ig-1",
                ExportOptions {
                    socket_id: Some("sock-1".to_string()),
                    ..no_publisher_options()
                },
            )
            .unwrap();

        let terminal = wait_for_terminal(&mut events).await;
        assert_eq!(terminal.status, ProgressStatus::Complete);
        assert_eq!(terminal.package_id, package_id);
        assert_eq!(
            orchestrator.registry().status(&package_id),
            Some(ExportStatus::Complete)
        );

        let workspace = root.path().join(&package_id);
        assert!(workspace.join("ig.json").is_file());
        assert!(
            workspace
                .join("source/resources/implementationguide/ig-1.xml")
                .is_file()
        );
        assert!(
            workspace
                .join("source/resources/structuredefinition/sd-1.json")
                .is_file()
        );
        assert!(workspace.join("source/pages/index.md").is_file());
        assert!(workspace.join("source/pages/_includes/sd-1-intro.md").is_file());
    }

    #[tokio::test]
    async fn test_export_without_download_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(OrchestratorConfig {
            export_root: root.path().to_path_buf(),
            deploy_root: root.path().join("deploy"),
            ready_grace: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        });

        let mut events = orchestrator.broker().subscribe("sock-1");
        orchestrator.broker().mark_ready("sock-1");
        let package_id = orchestrator
            .start_export(
                "ig-1",
                ExportOptions {
                    socket_id: Some("sock-1".to_string()),
                    download_output: false,
                    ..no_publisher_options()
                },
            )
            .unwrap();

        let terminal = wait_for_terminal(&mut events).await;
        assert_eq!(terminal.status, ProgressStatus::Complete);
        assert!(!root.path().join(&package_id).exists());
    }

    #[tokio::test]
    async fn test_missing_guide_surfaces_error_event() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(OrchestratorConfig {
            export_root: root.path().to_path_buf(),
            deploy_root: root.path().join("deploy"),
            ready_grace: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        });

        let mut events = orchestrator.broker().subscribe("sock-1");
        orchestrator.broker().mark_ready("sock-1");
        let package_id = orchestrator
            .start_export(
                "no-such-ig",
                ExportOptions {
                    socket_id: Some("sock-1".to_string()),
                    ..no_publisher_options()
                },
            )
            .unwrap();

        let terminal = wait_for_terminal(&mut events).await;
        assert_eq!(terminal.status, ProgressStatus::Error);
        assert!(matches!(
            orchestrator.registry().status(&package_id),
            Some(ExportStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_registry_tracks_in_progress_guides() {
        let registry = ExportRegistry::new();
        registry.insert("pkg-1", "ig-1");
        assert!(registry.exporting("ig-1"));
        assert!(!registry.exporting("ig-2"));
        registry.mark_complete("pkg-1");
        assert!(!registry.exporting("ig-1"));
        assert_eq!(registry.status("pkg-1"), Some(ExportStatus::Complete));
        assert!(registry.status("pkg-2").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_exports_get_distinct_packages() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(OrchestratorConfig {
            export_root: root.path().to_path_buf(),
            deploy_root: root.path().join("deploy"),
            ready_grace: Duration::from_millis(10),
            ..OrchestratorConfig::default()
        });

        let first = orchestrator
            .start_export("ig-1", no_publisher_options())
            .unwrap();
        let second = orchestrator
            .start_export("ig-1", no_publisher_options())
            .unwrap();
        assert_ne!(first, second);
    }
}
