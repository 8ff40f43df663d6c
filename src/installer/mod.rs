// src/installer/mod.rs

//! Installer interface
//!
//! The installer does the actual work: downloading and unpacking packages,
//! flipping stable/experiment links, and reclaiming unused versions. The
//! daemon only sequences these calls and never retries them; every call is
//! expected to be atomic.

pub mod errors;
pub mod exec;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use errors::{InstallerError, InstallerErrorCode};
pub use exec::{ExecInstaller, ExecInstallerConfig};

/// Installed versions of one package, as reported by the installer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageState {
    /// Production baseline version
    #[serde(default)]
    pub stable: String,
    /// Version under experiment, empty when none is running
    #[serde(default)]
    pub experiment: String,
}

impl PackageState {
    pub fn new(stable: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            stable: stable.into(),
            experiment: experiment.into(),
        }
    }

    /// Whether an experiment is currently running
    pub fn has_experiment(&self) -> bool {
        !self.experiment.is_empty()
    }
}

/// Package installer backend
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the package at `url` as the new stable version
    async fn install(&self, url: &str) -> Result<()>;

    /// Install the package at `url` as an experiment next to stable
    async fn install_experiment(&self, url: &str) -> Result<()>;

    /// Make the running experiment of `package` the new stable version
    async fn promote_experiment(&self, package: &str) -> Result<()>;

    /// Discard the running experiment of `package`
    async fn remove_experiment(&self, package: &str) -> Result<()>;

    /// Installed state of a single package
    async fn state(&self, package: &str) -> Result<PackageState>;

    /// Installed state of every known package
    async fn states(&self) -> Result<BTreeMap<String, PackageState>>;

    /// Remove versions that are neither stable nor experiment
    async fn garbage_collect(&self) -> Result<()>;
}
