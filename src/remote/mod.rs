// src/remote/mod.rs

//! Remote control plane interface
//!
//! The control plane pushes two kinds of events to the daemon: catalog
//! updates and remote API requests. In return the daemon publishes the
//! installed state of every package after each change, with the status of
//! the request currently being handled attached to its package.
//!
//! The transport itself (subscription, authentication, wire encoding) lives
//! behind [`RemoteTransport`]; [`loopback`] provides an in-process one.

pub mod loopback;

use crate::catalog::Catalog;
use crate::installer::{InstallerError, PackageState};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

pub use loopback::LoopbackTransport;

/// Operations the control plane can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RemoteMethod {
    StartExperiment,
    StopExperiment,
    PromoteExperiment,
}

/// Versions the requester believes are installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedState {
    #[serde(default)]
    pub stable: String,
    #[serde(default)]
    pub experiment: String,
}

impl ExpectedState {
    pub fn new(stable: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            stable: stable.into(),
            experiment: experiment.into(),
        }
    }

    /// Both versions must be equal for the request to apply
    pub fn matches(&self, observed: &PackageState) -> bool {
        self.stable == observed.stable && self.experiment == observed.experiment
    }
}

impl fmt::Display for ExpectedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stable={:?} experiment={:?}", self.stable, self.experiment)
    }
}

/// An operation requested by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteApiRequest {
    pub id: String,
    pub package: String,
    /// Raw method name, parsed when the request is dispatched
    pub method: String,
    /// Method-specific payload
    #[serde(default)]
    pub params: serde_json::Value,
    pub expected_state: ExpectedState,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub parent_span_id: String,
}

/// Parameters of a request that targets a specific version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWithVersionParams {
    pub version: String,
}

/// Lifecycle of a remote request as seen by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    InvalidState,
    Done,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: u64,
    pub message: String,
}

impl From<&InstallerError> for TaskError {
    fn from(err: &InstallerError) -> Self {
        Self {
            code: err.code.as_u64(),
            message: err.message.clone(),
        }
    }
}

/// Status of the request being handled for a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// Published state of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStateReport {
    pub package: String,
    pub stable_version: String,
    pub experiment_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskReport>,
}

/// Callbacks the daemon registers with the transport
#[async_trait]
pub trait RemoteHandler: Send + Sync {
    /// Replace the catalog
    async fn on_catalog_update(&self, catalog: Catalog) -> Result<()>;

    /// Queue a request; fails only when the request cannot be queued
    async fn on_remote_api_request(&self, request: RemoteApiRequest) -> Result<()>;
}

/// Connection to the control plane
pub trait RemoteTransport: Send + Sync {
    /// Subscribe to remote events, delivering them to `handler`
    fn start(&self, handler: Arc<dyn RemoteHandler>) -> Result<()>;

    /// Drop the subscription
    fn close(&self);

    /// Publish the current state of every package
    fn publish_state(&self, packages: Vec<PackageStateReport>);
}
