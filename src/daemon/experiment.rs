// src/daemon/experiment.rs

//! Experiment lifecycle of a package
//!
//! A package is either running its stable version only, or running an
//! experiment next to stable. Transitions between the two are performed by
//! the installer; this module names them, maps them onto installer calls and
//! gives their failures an operation-identifying context.
//!
//! ```text
//!                 install (any phase, new stable)
//!                 ┌──────────┐
//!                 ▼          │
//!            ┌─────────────────┐  start_experiment   ┌──────────────┐
//!            │   StableOnly    │ ──────────────────► │ Experimenting│
//!            └─────────────────┘ ◄────────────────── └──────────────┘
//!                          promote_experiment (experiment becomes stable)
//!                          stop_experiment    (experiment discarded)
//! ```
//!
//! Whether a transition is allowed from the current phase is the installer's
//! decision. Remote requests are additionally gated on their expected state
//! before a transition is attempted.

use crate::error::{Result, ResultExt};
use crate::installer::{Installer, PackageState};
use std::fmt;

/// Phase of a package, derived from its installed versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentPhase {
    /// No experiment running
    StableOnly,
    /// An experiment version runs next to stable
    Experimenting,
}

impl ExperimentPhase {
    pub fn of(state: &PackageState) -> Self {
        if state.has_experiment() {
            ExperimentPhase::Experimenting
        } else {
            ExperimentPhase::StableOnly
        }
    }
}

impl fmt::Display for ExperimentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentPhase::StableOnly => write!(f, "stable-only"),
            ExperimentPhase::Experimenting => write!(f, "experimenting"),
        }
    }
}

/// A state-changing installer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<'a> {
    /// Install a new stable version from a URL
    Install { url: &'a str },
    /// Install an experiment from a URL
    StartExperiment { url: &'a str },
    /// Make the experiment of a package its stable version
    PromoteExperiment { package: &'a str },
    /// Discard the experiment of a package
    StopExperiment { package: &'a str },
}

impl Transition<'_> {
    /// Operation name, used for spans
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Install { .. } => "install",
            Transition::StartExperiment { .. } => "start_experiment",
            Transition::PromoteExperiment { .. } => "promote_experiment",
            Transition::StopExperiment { .. } => "stop_experiment",
        }
    }

    /// Phase the package is in after the transition succeeds
    pub fn resulting_phase(&self) -> ExperimentPhase {
        match self {
            Transition::StartExperiment { .. } => ExperimentPhase::Experimenting,
            _ => ExperimentPhase::StableOnly,
        }
    }

    fn failure_context(&self) -> &'static str {
        match self {
            Transition::Install { .. } => "could not install",
            Transition::StartExperiment { .. } => "could not install experiment",
            Transition::PromoteExperiment { .. } => "could not promote experiment",
            Transition::StopExperiment { .. } => "could not stop experiment",
        }
    }

    /// Perform the transition through the installer
    pub async fn apply(&self, installer: &dyn Installer) -> Result<()> {
        let result = match *self {
            Transition::Install { url } => installer.install(url).await,
            Transition::StartExperiment { url } => installer.install_experiment(url).await,
            Transition::PromoteExperiment { package } => {
                installer.promote_experiment(package).await
            }
            Transition::StopExperiment { package } => installer.remove_experiment(package).await,
        };
        result.context(self.failure_context())
    }
}

impl fmt::Display for Transition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Install { url } => write!(f, "installing package from {}", url),
            Transition::StartExperiment { url } => {
                write!(f, "starting experiment for package from {}", url)
            }
            Transition::PromoteExperiment { package } => {
                write!(f, "promoting experiment for package {}", package)
            }
            Transition::StopExperiment { package } => {
                write!(f, "stopping experiment for package {}", package)
            }
        }
    }
}
