//! HTTP surface for the implementation guide export pipeline.
//!
//! Three routes: start an export, download a finished package, and a
//! WebSocket carrying per-export progress events. Everything else lives
//! in the `igpub-export` pipeline crate.

pub mod config;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{AppConfig, load_config, resolve_config_path};
pub use server::{build_router, run};
pub use state::AppState;
