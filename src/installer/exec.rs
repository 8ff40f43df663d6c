// src/installer/exec.rs

//! Installer backed by an external executable
//!
//! Each installer method maps to one subcommand of the installer binary:
//!
//! ```text
//! install <url>                  install-experiment <url>
//! promote-experiment <package>   remove-experiment <package>
//! garbage-collect                state <package>    states
//! ```
//!
//! `state` and `states` print JSON on stdout. A failing subcommand exits
//! non-zero and may print a `{"code": N, "error": "..."}` document on stderr.

use super::errors::InstallerError;
use super::{Installer, PackageState};
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

/// Settings forwarded to the installer binary
#[derive(Debug, Clone, Default)]
pub struct ExecInstallerConfig {
    /// Resolved path of the installer executable
    pub bin: PathBuf,
    /// Package registry override
    pub registry: String,
    /// Registry authentication method
    pub registry_auth: String,
    /// Backend site the host reports to
    pub site: String,
    /// Sanitized API key
    pub api_key: String,
}

impl ExecInstallerConfig {
    pub fn new<P: Into<PathBuf>>(bin: P) -> Self {
        Self {
            bin: bin.into(),
            ..Self::default()
        }
    }

    fn env(&self) -> Vec<(&'static str, &str)> {
        [
            ("FLEET_REGISTRY", self.registry.as_str()),
            ("FLEET_REGISTRY_AUTH", self.registry_auth.as_str()),
            ("FLEET_SITE", self.site.as_str()),
            ("FLEET_API_KEY", self.api_key.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}

/// Installer that shells out to the installer binary
pub struct ExecInstaller {
    config: ExecInstallerConfig,
}

impl ExecInstaller {
    pub fn new(config: ExecInstallerConfig) -> Self {
        Self { config }
    }

    /// Run one installer subcommand and return its stdout
    async fn run(&self, subcommand: &str, arg: Option<&str>) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.config.bin);
        command.arg(subcommand);
        if let Some(arg) = arg {
            command.arg(arg);
        }

        debug!(
            "Running installer: {} {} {}",
            self.config.bin.display(),
            subcommand,
            arg.unwrap_or_default()
        );

        let output = command
            .envs(self.config.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context(format!("could not run installer {}", subcommand))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            for line in stderr.lines() {
                warn!("[installer {}] {}", subcommand, line);
            }
            return Err(failure_from_output(output.status, &stderr).into());
        }

        Ok(output.stdout)
    }
}

/// Build the installer error for a failed subcommand
fn failure_from_output(status: ExitStatus, stderr: &str) -> InstallerError {
    let stderr = stderr.trim();
    if let Ok(structured) = serde_json::from_str::<InstallerError>(stderr) {
        return structured;
    }
    if stderr.is_empty() {
        let code = status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        return InstallerError::unknown(format!("installer exited with status {}", code));
    }
    InstallerError::unknown(stderr)
}

fn parse_json<T: serde::de::DeserializeOwned + Default>(stdout: &[u8]) -> Result<T> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(stdout).map_err(Error::from)
}

#[async_trait]
impl Installer for ExecInstaller {
    async fn install(&self, url: &str) -> Result<()> {
        self.run("install", Some(url)).await.map(drop)
    }

    async fn install_experiment(&self, url: &str) -> Result<()> {
        self.run("install-experiment", Some(url)).await.map(drop)
    }

    async fn promote_experiment(&self, package: &str) -> Result<()> {
        self.run("promote-experiment", Some(package)).await.map(drop)
    }

    async fn remove_experiment(&self, package: &str) -> Result<()> {
        self.run("remove-experiment", Some(package)).await.map(drop)
    }

    async fn state(&self, package: &str) -> Result<PackageState> {
        let stdout = self.run("state", Some(package)).await?;
        parse_json(&stdout).context(format!("could not parse state of {}", package))
    }

    async fn states(&self) -> Result<BTreeMap<String, PackageState>> {
        let stdout = self.run("states", None).await?;
        parse_json(&stdout).context("could not parse installer states")
    }

    async fn garbage_collect(&self) -> Result<()> {
        self.run("garbage-collect", None).await.map(drop)
    }
}
