//! IG export pipeline.
//!
//! Takes a named ImplementationGuide, assembles its member resources into
//! an on-disk publishing package, optionally runs the external IG
//! Publisher over it, streams progress to a subscriber, and reconciles
//! the result into a deployable or downloadable location.
//!
//! The pipeline is a strictly sequential state machine per export job
//! (see [`orchestrator::ExportOrchestrator`]); jobs run concurrently
//! system-wide, each owning an exclusive temporary workspace.

pub mod archive;
pub mod assembler;
pub mod control;
pub mod orchestrator;
pub mod pages;
pub mod progress;
pub mod publisher;
pub mod serializer;
pub mod strategy;
pub mod summaries;
pub mod template;
pub mod transform;
pub mod xml;

pub use archive::PackageArchiveStore;
pub use assembler::BundleAssembler;
pub use control::{Control, ControlDependency};
pub use orchestrator::{ExportOrchestrator, ExportRegistry, ExportStatus, OrchestratorConfig};
pub use pages::{PageTreeWriter, TocEntry};
pub use progress::{ProgressBroker, ProgressChannel, ProgressEvent, ProgressStatus};
pub use publisher::{PublisherAcquirer, PublisherConfig, PublisherOutcome};
pub use serializer::ResourceSerializer;
pub use strategy::{GenerationStrategy, strategy_for};
pub use transform::{ResourceTransform, StripExportExtensions};
