// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetd::remote::TaskReport;
use fleetd::{
    Catalog, Daemon, DaemonConfig, ExpectedState, Installer, InstallerError, LoopbackTransport,
    Package, PackageState, Platform, RemoteApiRequest, Result,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A call observed by the scripted installer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install(String),
    InstallExperiment(String),
    PromoteExperiment(String),
    RemoveExperiment(String),
    State(String),
    States,
    GarbageCollect,
}

impl Call {
    fn operation(&self) -> &'static str {
        match self {
            Call::Install(_) => "install",
            Call::InstallExperiment(_) => "install_experiment",
            Call::PromoteExperiment(_) => "promote_experiment",
            Call::RemoveExperiment(_) => "remove_experiment",
            Call::State(_) => "state",
            Call::States => "states",
            Call::GarbageCollect => "garbage_collect",
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::State(_) | Call::States)
    }
}

#[derive(Default)]
struct Script {
    packages: BTreeMap<String, PackageState>,
    /// url -> (package, version)
    urls: HashMap<String, (String, String)>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, InstallerError>,
}

/// In-memory installer simulating stable/experiment transitions
#[derive(Default)]
pub struct ScriptedInstaller {
    script: Mutex<Script>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    delay: Mutex<Duration>,
    query_delay: Mutex<Duration>,
}

struct ActiveCall<'a>(&'a ScriptedInstaller);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedInstaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_package(self: Arc<Self>, name: &str, stable: &str, experiment: &str) -> Arc<Self> {
        self.script
            .lock()
            .packages
            .insert(name.to_string(), PackageState::new(stable, experiment));
        self
    }

    /// Make `url` install `package` at `version`
    pub fn with_url(self: Arc<Self>, url: &str, package: &str, version: &str) -> Arc<Self> {
        self.script
            .lock()
            .urls
            .insert(url.to_string(), (package.to_string(), version.to_string()));
        self
    }

    /// Slow down mutating calls
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = delay;
        self
    }

    /// Slow down state queries
    pub fn with_query_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.query_delay.lock() = delay;
        self
    }

    /// Make every call of `operation` fail with `err`
    pub fn fail(&self, operation: &'static str, err: InstallerError) {
        self.script.lock().failures.insert(operation, err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn package(&self, name: &str) -> PackageState {
        self.script
            .lock()
            .packages
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    async fn enter(&self, call: Call) -> Result<ActiveCall<'_>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let guard = ActiveCall(self);

        let failure = {
            let mut script = self.script.lock();
            let failure = script.failures.get(call.operation()).cloned();
            script.calls.push(call.clone());
            failure
        };

        let delay = if call.is_mutating() {
            *self.delay.lock()
        } else {
            *self.query_delay.lock()
        };
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(guard),
        }
    }

    fn resolve_url(&self, url: &str) -> Result<(String, String)> {
        self.script
            .lock()
            .urls
            .get(url)
            .cloned()
            .ok_or_else(|| InstallerError::unknown(format!("unknown url {}", url)).into())
    }
}

#[async_trait]
impl Installer for ScriptedInstaller {
    async fn install(&self, url: &str) -> Result<()> {
        let _active = self.enter(Call::Install(url.to_string())).await?;
        let (package, version) = self.resolve_url(url)?;
        let mut script = self.script.lock();
        let state = script.packages.entry(package).or_default();
        state.stable = version;
        Ok(())
    }

    async fn install_experiment(&self, url: &str) -> Result<()> {
        let _active = self.enter(Call::InstallExperiment(url.to_string())).await?;
        let (package, version) = self.resolve_url(url)?;
        let mut script = self.script.lock();
        let state = script.packages.entry(package).or_default();
        state.experiment = version;
        Ok(())
    }

    async fn promote_experiment(&self, package: &str) -> Result<()> {
        let _active = self.enter(Call::PromoteExperiment(package.to_string())).await?;
        let mut script = self.script.lock();
        let state = script.packages.entry(package.to_string()).or_default();
        if state.experiment.is_empty() {
            return Err(InstallerError::unknown("no experiment to promote").into());
        }
        state.stable = std::mem::take(&mut state.experiment);
        Ok(())
    }

    async fn remove_experiment(&self, package: &str) -> Result<()> {
        let _active = self.enter(Call::RemoveExperiment(package.to_string())).await?;
        let mut script = self.script.lock();
        if let Some(state) = script.packages.get_mut(package) {
            state.experiment.clear();
        }
        Ok(())
    }

    async fn state(&self, package: &str) -> Result<PackageState> {
        let _active = self.enter(Call::State(package.to_string())).await?;
        Ok(self.package(package))
    }

    async fn states(&self) -> Result<BTreeMap<String, PackageState>> {
        let _active = self.enter(Call::States).await?;
        Ok(self.script.lock().packages.clone())
    }

    async fn garbage_collect(&self) -> Result<()> {
        let _active = self.enter(Call::GarbageCollect).await?;
        Ok(())
    }
}

pub fn linux_amd64() -> Platform {
    Platform::new("linux", "amd64")
}

pub fn package(name: &str, version: &str, url: &str) -> Package {
    Package {
        name: name.to_string(),
        version: version.to_string(),
        os: "linux".to_string(),
        arch: "amd64".to_string(),
        url: url.to_string(),
    }
}

/// Catalog with `agent` 2.0 at `u2` for linux/amd64
pub fn agent_catalog() -> Catalog {
    Catalog::new([package("agent", "2.0", "u2")])
}

pub fn request(id: &str, method: &str, expected: ExpectedState) -> RemoteApiRequest {
    RemoteApiRequest {
        id: id.to_string(),
        package: "agent".to_string(),
        method: method.to_string(),
        params: serde_json::Value::Null,
        expected_state: expected,
        trace_id: "4242".to_string(),
        parent_span_id: "17".to_string(),
    }
}

/// Daemon with remote updates on, over a loopback transport
pub fn new_daemon(
    installer: Arc<ScriptedInstaller>,
    config: DaemonConfig,
) -> (Daemon, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let config = config.with_remote_updates(true).with_platform(linux_amd64());
    let daemon = Daemon::new(config, installer, transport.clone());
    (daemon, transport)
}

/// Same as [`new_daemon`], already started
pub async fn start_daemon(
    installer: Arc<ScriptedInstaller>,
    config: DaemonConfig,
) -> (Daemon, Arc<LoopbackTransport>) {
    let (daemon, transport) = new_daemon(installer, config);
    daemon.start().await.unwrap();
    (daemon, transport)
}

/// Latest published task block for request `id`
pub fn latest_task(transport: &LoopbackTransport, id: &str) -> Option<TaskReport> {
    transport
        .published()
        .iter()
        .rev()
        .flat_map(|snapshot| snapshot.iter())
        .filter_map(|report| report.task.clone())
        .find(|task| task.id == id)
}

/// Wait until request `id` has a terminal status published
pub async fn wait_for_task(transport: &LoopbackTransport, id: &str) -> TaskReport {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = latest_task(transport, id)
                && task.state.is_terminal()
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("request {} never finished", id))
}
