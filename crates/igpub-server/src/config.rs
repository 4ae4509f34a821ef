//! Server configuration.
//!
//! A TOML file with serde-defaulted sections, resolved from the CLI,
//! the `IGPUB_CONFIG` environment variable, or `igpub.toml`, in that
//! order. A handful of flat `IGPUB_*` environment variables override
//! individual fields for container deployments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use igpub_core::FhirVersion;
use igpub_export::{OrchestratorConfig, PublisherConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fhir: FhirSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub publisher: PublisherSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirSettings {
    /// Identity segment for deployment paths; one server process serves
    /// one upstream FHIR server.
    pub server_id: String,
    /// "stu3" or "r4".
    pub version: String,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            server_id: "default".to_string(),
            version: "r4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Where export workspaces are allocated; system temp when unset.
    pub export_root: Option<PathBuf>,
    pub deploy_root: PathBuf,
    /// Seconds to wait for a named progress subscriber to attach.
    pub ready_grace_secs: u64,
    /// Directory of JSON resources loaded into the in-memory repository
    /// at startup.
    pub seed_dir: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            export_root: None,
            deploy_root: PathBuf::from("igs"),
            ready_grace_secs: 2,
            seed_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub default_jar: Option<PathBuf>,
    pub latest_cache_dir: Option<PathBuf>,
    pub latest_url: Option<String>,
    pub java_executable: String,
    pub timeout_secs: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        let defaults = PublisherConfig::default();
        Self {
            default_jar: None,
            latest_cache_dir: None,
            latest_url: None,
            java_executable: defaults.java_executable,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.publisher.timeout_secs == 0 {
            return Err("publisher.timeout_secs must be > 0".into());
        }
        self.fhir_version()?;
        Ok(())
    }

    pub fn fhir_version(&self) -> Result<FhirVersion, String> {
        self.fhir
            .version
            .parse()
            .map_err(|_| format!("unsupported fhir.version {:?}", self.fhir.version))
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        let defaults = PublisherConfig::default();
        PublisherConfig {
            default_jar: self
                .publisher
                .default_jar
                .clone()
                .unwrap_or(defaults.default_jar),
            latest_cache_dir: self
                .publisher
                .latest_cache_dir
                .clone()
                .unwrap_or(defaults.latest_cache_dir),
            latest_url: self
                .publisher
                .latest_url
                .clone()
                .unwrap_or(defaults.latest_url),
            java_executable: self.publisher.java_executable.clone(),
            timeout: Duration::from_secs(self.publisher.timeout_secs),
        }
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, String> {
        Ok(OrchestratorConfig {
            fhir_server_id: self.fhir.server_id.clone(),
            fhir_version: self.fhir_version()?,
            export_root: self
                .export
                .export_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            deploy_root: self.export.deploy_root.clone(),
            ready_grace: Duration::from_secs(self.export.ready_grace_secs),
            publisher: self.publisher_config(),
        })
    }

    pub fn export_root(&self) -> PathBuf {
        self.export
            .export_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From IGPUB_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (igpub.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (IGPUB_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: IGPUB_CONFIG
/// 3. Default: igpub.toml
pub fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = std::env::var("IGPUB_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("igpub.toml".to_string(), ConfigSource::Default)
}

/// Loads configuration from the given TOML file when it exists, then
/// applies environment overrides and validates. A missing file is not
/// an error; defaults apply.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
    let mut config = match path.map(Path::new) {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("config read error: {e}"))?;
            toml::from_str(&raw).map_err(|e| format!("config parse error: {e}"))?
        }
        _ => AppConfig::default(),
    };
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(host) = std::env::var("IGPUB_SERVER_HOST") {
        if !host.is_empty() {
            config.server.host = host;
        }
    }
    if let Ok(port) = std::env::var("IGPUB_SERVER_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(version) = std::env::var("IGPUB_FHIR_VERSION") {
        if !version.is_empty() {
            config.fhir.version = version;
        }
    }
    if let Ok(jar) = std::env::var("IGPUB_PUBLISHER_JAR") {
        if !jar.is_empty() {
            config.publisher.default_jar = Some(PathBuf::from(jar));
        }
    }
    if let Ok(level) = std::env::var("IGPUB_LOG_LEVEL") {
        if !level.is_empty() {
            config.logging.level = level;
        }
    }
}
