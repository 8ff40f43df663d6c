// src/daemon/reporter.rs

//! Publishes installed package state to the control plane
//!
//! Refreshing is best effort: if the installer cannot report its state the
//! refresh is skipped and the last published snapshot stays in place.

use super::request::RequestState;
use crate::installer::{Installer, PackageState};
use crate::remote::{PackageStateReport, RemoteTransport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

pub struct StateReporter {
    transport: Arc<dyn RemoteTransport>,
    publishing: bool,
}

impl StateReporter {
    /// `publishing` is false when remote updates are disabled; snapshots are
    /// then computed and logged but never sent.
    pub fn new(transport: Arc<dyn RemoteTransport>, publishing: bool) -> Self {
        Self {
            transport,
            publishing,
        }
    }

    /// Query the installer and publish the resulting snapshot
    pub async fn refresh(&self, installer: &dyn Installer, request: Option<&RequestState>) {
        let states = match installer.states().await {
            Ok(states) => states,
            Err(e) => {
                error!("could not get installer state: {}", e);
                return;
            }
        };

        let packages = build_reports(states, request);
        if self.publishing {
            self.transport.publish_state(packages);
        } else {
            debug!("Remote updates disabled, not publishing {} package state(s)", packages.len());
        }
    }
}

/// Turn installer state into published reports
///
/// The request's task block is attached to its package. A request for a
/// package the installer does not know yet still gets an entry, so its
/// status stays visible.
pub fn build_reports(
    states: BTreeMap<String, PackageState>,
    request: Option<&RequestState>,
) -> Vec<PackageStateReport> {
    let mut packages: Vec<PackageStateReport> = states
        .into_iter()
        .map(|(package, state)| PackageStateReport {
            task: request
                .filter(|r| r.package == package)
                .map(RequestState::report),
            package,
            stable_version: state.stable,
            experiment_version: state.experiment,
        })
        .collect();

    if let Some(request) = request
        && !packages.iter().any(|p| p.package == request.package)
    {
        packages.push(PackageStateReport {
            package: request.package.clone(),
            stable_version: String::new(),
            experiment_version: String::new(),
            task: Some(request.report()),
        });
    }

    packages
}
