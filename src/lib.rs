// src/lib.rs

//! fleetd - package rollout daemon
//!
//! Installs, experiments with, promotes and rolls back versioned packages on
//! a host, driven either by local management calls or by a remote control
//! plane.
//!
//! # Architecture
//!
//! - Serialized: every installer operation runs under one exclusive lock
//! - Experiments: a package runs a stable version and optionally an
//!   experiment, which is later promoted or stopped
//! - Gated remote requests: a request only applies if the package is in the
//!   state the control plane expects
//! - Reported: package state is published before and after every change

pub mod catalog;
pub mod config;
pub mod daemon;
mod error;
pub mod installer;
pub mod remote;

pub use catalog::{Catalog, Package, Platform};
pub use config::FleetConfig;
pub use daemon::{Daemon, DaemonConfig, ExperimentPhase, RequestState, Transition};
pub use error::{Error, Result, ResultExt};
pub use installer::{Installer, InstallerError, InstallerErrorCode, PackageState};
pub use remote::{
    ExpectedState, LoopbackTransport, PackageStateReport, RemoteApiRequest, RemoteHandler,
    RemoteMethod, RemoteTransport, TaskState,
};
