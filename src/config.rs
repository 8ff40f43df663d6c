// src/config.rs

//! Configuration file parsing for fleetd
//!
//! Supports a TOML configuration file with the following sections:
//! - [daemon] - Remote updates, GC interval, queue capacity, platform
//! - [installer] - Installer executable and registry settings
//!
//! Every field has a default; a missing file yields the default configuration.

use crate::catalog::Platform;
use crate::daemon::{DaemonConfig, DEFAULT_REQUEST_CAPACITY};
use crate::error::{Error, Result};
use crate::installer::ExecInstallerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fleetd/fleetd.toml";

/// Longest accepted garbage collection interval
const MAX_GC_INTERVAL: Duration = Duration::from_secs(52 * 604800);

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub installer: InstallerSection,
}

/// Daemon configuration section
#[derive(Debug, Deserialize)]
pub struct DaemonSection {
    /// Subscribe to the control plane
    #[serde(default)]
    pub remote_updates: bool,

    /// Garbage collection interval (e.g., "1h", "30m")
    #[serde(default = "default_gc_interval")]
    pub gc_interval: String,

    /// Remote requests that can wait for processing
    #[serde(default = "default_request_queue_capacity")]
    pub request_queue_capacity: usize,

    /// Platform override for catalog lookups
    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub arch: Option<String>,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            remote_updates: false,
            gc_interval: default_gc_interval(),
            request_queue_capacity: default_request_queue_capacity(),
            os: None,
            arch: None,
        }
    }
}

fn default_gc_interval() -> String {
    "1h".to_string()
}

fn default_request_queue_capacity() -> usize {
    DEFAULT_REQUEST_CAPACITY
}

/// Installer configuration section
#[derive(Debug, Deserialize)]
pub struct InstallerSection {
    /// Installer executable (default: this executable)
    #[serde(default)]
    pub bin: Option<PathBuf>,

    #[serde(default)]
    pub registry: String,

    #[serde(default)]
    pub registry_auth: String,

    /// Backend site the host reports to
    #[serde(default = "default_site")]
    pub site: String,

    #[serde(default)]
    pub api_key: String,
}

impl Default for InstallerSection {
    fn default() -> Self {
        Self {
            bin: None,
            registry: String::new(),
            registry_auth: String::new(),
            site: default_site(),
            api_key: String::new(),
        }
    }
}

fn default_site() -> String {
    "datadoghq.com".to_string()
}

impl FleetConfig {
    /// Load configuration from a file; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: FleetConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let interval = parse_duration(&self.daemon.gc_interval)?;
        if interval.is_zero() {
            return Err(Error::Config("daemon.gc_interval must be positive".to_string()));
        }
        if interval > MAX_GC_INTERVAL {
            return Err(Error::Config("daemon.gc_interval must be at most 52w".to_string()));
        }
        if self.daemon.request_queue_capacity == 0 {
            return Err(Error::Config(
                "daemon.request_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Platform for catalog lookups: host values unless overridden
    pub fn platform(&self) -> Platform {
        let host = Platform::host();
        Platform::new(
            self.daemon.os.clone().unwrap_or(host.os),
            self.daemon.arch.clone().unwrap_or(host.arch),
        )
    }

    /// In-memory daemon configuration
    pub fn daemon_config(&self) -> Result<DaemonConfig> {
        self.validate()?;
        Ok(DaemonConfig::default()
            .with_remote_updates(self.daemon.remote_updates)
            .with_gc_interval(parse_duration(&self.daemon.gc_interval)?)
            .with_request_capacity(self.daemon.request_queue_capacity)
            .with_platform(self.platform()))
    }

    /// Installer settings with the executable path resolved
    pub fn installer_config(&self) -> Result<ExecInstallerConfig> {
        Ok(ExecInstallerConfig {
            bin: self.resolve_installer_bin()?,
            registry: self.installer.registry.clone(),
            registry_auth: self.installer.registry_auth.clone(),
            site: self.installer.site.clone(),
            api_key: sanitize_api_key(&self.installer.api_key),
        })
    }

    /// Canonical path of the installer executable
    ///
    /// Uses the configured binary, or this executable when none is set.
    pub fn resolve_installer_bin(&self) -> Result<PathBuf> {
        let bin = match &self.installer.bin {
            Some(bin) => bin.clone(),
            None => std::env::current_exe().map_err(|e| {
                Error::InitError(format!("could not get installer executable path: {}", e))
            })?,
        };
        std::fs::canonicalize(&bin).map_err(|e| {
            Error::InitError(format!(
                "could not resolve installer executable path {}: {}",
                bin.display(),
                e
            ))
        })
    }
}

/// Strip whitespace and surrounding quotes from an API key
pub fn sanitize_api_key(key: &str) -> String {
    key.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Parse a duration string like "30s", "15m", "1h", "1d", "1w"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("Empty duration".to_string()));
    }

    let unit_start = s.len() - s.chars().last().map_or(0, char::len_utf8);
    let (num_str, unit) = s.split_at(unit_start);
    let num: u64 = num_str
        .parse()
        .map_err(|_| Error::Config(format!("Invalid duration number: {}", s)))?;

    let factor = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604800,
        _ => {
            return Err(Error::Config(format!("Invalid duration unit: {}", unit)));
        }
    };
    let seconds = num
        .checked_mul(factor)
        .ok_or_else(|| Error::Config(format!("Duration too large: {}", s)))?;

    Ok(Duration::from_secs(seconds))
}
