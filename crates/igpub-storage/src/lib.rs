//! FHIR repository abstraction for the IG export pipeline.
//!
//! The export pipeline does not own the FHIR resource store; it consumes
//! it through the [`FhirRepository`] trait defined here. The crate also
//! ships an in-memory backend used by tests and by the default server
//! wiring.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::RepositoryError;
pub use memory::MemoryRepository;
pub use traits::FhirRepository;
