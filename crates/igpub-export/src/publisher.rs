//! HL7 IG Publisher acquisition and supervised execution.
//!
//! The publisher is an external Java tool. Acquisition picks between a
//! bundled default JAR and a freshly downloaded latest build, with the
//! download treated as best-effort. Execution pipes both output streams
//! through a sanitizer into the progress channel and enforces a hard
//! wall-clock timeout, killing the process when it is exceeded.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use igpub_core::{CoreError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::progress::ProgressChannel;

pub const PUBLISHER_JAR_NAME: &str = "org.hl7.fhir.igpublisher.jar";

const LATEST_PUBLISHER_URL: &str =
    "https://github.com/HL7/fhir-ig-publisher/releases/latest/download/publisher.jar";

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Bundled JAR used when the latest build is not requested or not
    /// reachable.
    pub default_jar: PathBuf,
    /// Cache directory for downloaded latest builds.
    pub latest_cache_dir: PathBuf,
    pub latest_url: String,
    pub java_executable: String,
    /// Hard ceiling on publisher wall-clock time.
    pub timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            default_jar: PathBuf::from("ig-publisher").join(PUBLISHER_JAR_NAME),
            latest_cache_dir: PathBuf::from("ig-publisher").join("latest"),
            latest_url: LATEST_PUBLISHER_URL.to_string(),
            java_executable: "java".to_string(),
            timeout: Duration::from_secs(1800),
        }
    }
}

pub struct PublisherAcquirer {
    config: PublisherConfig,
    http: reqwest::Client,
}

impl PublisherAcquirer {
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Resolves the JAR to run, or `None` when execution is not planned
    /// (then nothing is downloaded or checked). A latest-build download
    /// failure is reported over the channel and falls back to the
    /// bundled default; only a missing default is unrecoverable.
    pub async fn acquire(
        &self,
        use_latest: bool,
        execute: bool,
        progress: &ProgressChannel,
    ) -> Result<Option<PathBuf>> {
        if !execute {
            return Ok(None);
        }

        if use_latest {
            progress.progress("Downloading the latest FHIR IG Publisher");
            match self.download_latest().await {
                Ok(path) => return Ok(Some(path)),
                Err(err) => {
                    warn!(error = %err, "latest publisher download failed, using default");
                    progress.progress(
                        "Encountered an error downloading the latest IG Publisher. Using the default/stored IG Publisher.",
                    );
                }
            }
        }

        if !self.config.default_jar.is_file() {
            return Err(CoreError::publisher_acquisition(format!(
                "default IG Publisher JAR not found at {}",
                self.config.default_jar.display()
            )));
        }
        Ok(Some(self.config.default_jar.clone()))
    }

    async fn download_latest(&self) -> Result<PathBuf> {
        let response = self
            .http
            .get(&self.config.latest_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| CoreError::publisher_acquisition(err.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| CoreError::publisher_acquisition(err.to_string()))?;

        std::fs::create_dir_all(&self.config.latest_cache_dir)?;
        let jar_path = self.config.latest_cache_dir.join(PUBLISHER_JAR_NAME);
        std::fs::write(&jar_path, &bytes)?;
        debug!(path = %jar_path.display(), size = bytes.len(), "downloaded latest publisher");
        Ok(jar_path)
    }
}

/// Redacts environment-specific path prefixes from publisher output so
/// progress messages never leak local directory layout.
#[derive(Debug, Clone, Default)]
pub struct LineSanitizer {
    secrets: Vec<String>,
}

impl LineSanitizer {
    pub fn new() -> Self {
        let mut sanitizer = Self::default();
        sanitizer.secrets.push(
            std::env::temp_dir().to_string_lossy().into_owned(),
        );
        if let Ok(home) = std::env::var("HOME") {
            if !home.is_empty() {
                sanitizer.secrets.push(home);
            }
        }
        sanitizer
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.secrets.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn redact(&self, line: &str) -> String {
        self.secrets
            .iter()
            .filter(|secret| !secret.is_empty())
            .fold(line.to_string(), |line, secret| line.replace(secret, "XXX"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl PublisherOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Runs the publisher against a control file, streaming sanitized
/// output lines as progress events. Lines that are empty once dots are
/// stripped are dropped. Returns rather than erroring on non-zero exit;
/// only spawn/wait failures are errors.
pub async fn run_publisher(
    config: &PublisherConfig,
    jar: &Path,
    control_path: &Path,
    use_terminology_server: bool,
    sanitizer: &LineSanitizer,
    progress: &ProgressChannel,
) -> Result<PublisherOutcome> {
    let mut command = Command::new(&config.java_executable);
    command.arg("-jar").arg(jar).arg("-ig").arg(control_path);
    if !use_terminology_server {
        command.arg("-tx").arg("N/A");
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|err| CoreError::publisher_process(format!("failed to spawn publisher: {err}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut readers = Vec::new();
    if let Some(stdout) = stdout_lines(stdout) {
        readers.push(tokio::spawn(forward_lines(
            stdout,
            sanitizer.clone(),
            progress.clone(),
        )));
    }
    if let Some(stderr) = stderr_lines(stderr) {
        readers.push(tokio::spawn(forward_lines(
            stderr,
            sanitizer.clone(),
            progress.clone(),
        )));
    }

    let outcome = match tokio::time::timeout(config.timeout, child.wait()).await {
        Ok(Ok(status)) => PublisherOutcome {
            exit_code: status.code(),
            timed_out: false,
        },
        Ok(Err(err)) => {
            return Err(CoreError::publisher_process(format!(
                "failed waiting on publisher: {err}"
            )));
        }
        Err(_) => {
            warn!(timeout_secs = config.timeout.as_secs(), "publisher timed out, killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
            PublisherOutcome {
                exit_code: None,
                timed_out: true,
            }
        }
    };

    for reader in readers {
        let _ = reader.await;
    }
    Ok(outcome)
}

type ChildLines<R> = tokio::io::Lines<BufReader<R>>;

fn stdout_lines(
    stdout: Option<tokio::process::ChildStdout>,
) -> Option<ChildLines<tokio::process::ChildStdout>> {
    stdout.map(|s| BufReader::new(s).lines())
}

fn stderr_lines(
    stderr: Option<tokio::process::ChildStderr>,
) -> Option<ChildLines<tokio::process::ChildStderr>> {
    stderr.map(|s| BufReader::new(s).lines())
}

async fn forward_lines<R>(
    mut lines: ChildLines<R>,
    sanitizer: LineSanitizer,
    progress: ProgressChannel,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        let message = sanitizer.redact(&line);
        // The publisher emits progress-dot lines; skip anything that is
        // only dots and whitespace.
        if message.trim().replace('.', "").is_empty() {
            continue;
        }
        progress.progress(message);
    }
}
