// src/daemon/mod.rs

//! Fleet daemon - orchestrates package rollouts on a host
//!
//! The daemon provides:
//! - Local management calls (install, start/promote/stop experiment)
//! - A queue of remote requests, each gated on the state the control plane
//!   expects the package to be in
//! - Periodic garbage collection of unused package versions
//! - State publication to the control plane around every change
//!
//! # Architecture
//!
//! Every operation that touches the installer runs under one exclusive
//! session lock, so installer calls never interleave. Remote requests and
//! the GC timer are multiplexed by a single dispatch loop:
//!
//! ```text
//! control plane ──► transport ──► RequestQueue ──┐
//!                                                │
//!                        GC interval ────────────┼──► dispatch loop ──┐
//!                        stop signal ────────────┘                    │
//!                                                                     ▼
//! management API (install, experiments) ─────────────────────► Session lock
//!                                                                     │
//!                                        refresh ◄── installer ◄──────┘
//!                                           │
//!                                           └──► transport.publish_state
//! ```
//!
//! Shutdown is cooperative: [`Daemon::stop`] signals the loop, which drains
//! the requests already queued, then waits for every outstanding request to
//! be released. It never takes the session lock.

pub mod experiment;
pub mod queue;
pub mod reporter;
pub mod request;

use crate::catalog::{Catalog, Package, Platform};
use crate::config::FleetConfig;
use crate::error::{Error, Result, ResultExt};
use crate::installer::{ExecInstaller, Installer, PackageState};
use crate::remote::{
    RemoteApiRequest, RemoteHandler, RemoteMethod, RemoteTransport, TaskWithVersionParams,
};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

pub use experiment::{ExperimentPhase, Transition};
pub use queue::{QueuedRequest, RequestQueue, DEFAULT_REQUEST_CAPACITY};
pub use reporter::StateReporter;
pub use request::RequestState;

/// Interval between two garbage collections
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Subscribe to the control plane and publish state (default: false)
    pub remote_updates: bool,
    /// Garbage collection interval (default: 1 hour)
    pub gc_interval: Duration,
    /// Remote requests that can wait for the dispatch loop (default: 32)
    pub request_capacity: usize,
    /// Platform used for catalog lookups (default: host)
    pub platform: Platform,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            remote_updates: false,
            gc_interval: DEFAULT_GC_INTERVAL,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            platform: Platform::host(),
        }
    }
}

impl DaemonConfig {
    /// Enable or disable remote updates
    pub fn with_remote_updates(mut self, enable: bool) -> Self {
        self.remote_updates = enable;
        self
    }

    /// Set the garbage collection interval
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Set the request queue capacity
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity;
        self
    }

    /// Override the platform used for catalog lookups
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

/// State only reachable while holding the session lock
struct Session {
    catalog: Catalog,
    installer: Arc<dyn Installer>,
    reporter: StateReporter,
}

impl Session {
    async fn refresh(&self, request: Option<&RequestState>) {
        self.reporter.refresh(self.installer.as_ref(), request).await;
    }

    /// Run one transition, refreshing state before and after it
    async fn run_transition(
        &self,
        transition: Transition<'_>,
        request: Option<&RequestState>,
    ) -> Result<()> {
        let span = info_span!("transition", operation = transition.name());
        async {
            self.refresh(request).await;

            info!("Daemon: {}", transition);
            let result = transition.apply(self.installer.as_ref()).await;
            if result.is_ok() {
                info!(
                    "Daemon: done {}, package is now {}",
                    transition,
                    transition.resulting_phase()
                );
            }

            self.refresh(request).await;
            result
        }
        .instrument(span)
        .await
    }

    fn resolve(&self, name: &str, version: &str, platform: &Platform) -> Result<&Package> {
        self.catalog
            .resolve(name, version, platform)
            .ok_or_else(|| Error::PackageNotFound {
                name: name.to_string(),
                version: version.to_string(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
            })
    }

    /// Handle one remote request and publish its final status
    async fn handle_remote_request(
        &self,
        request: &RemoteApiRequest,
        platform: &Platform,
    ) -> Result<()> {
        let span = info_span!(
            "remote_request",
            request_id = %request.id,
            package = %request.package,
            method = %request.method,
            trace_id = %request.trace_id,
            parent_span_id = %request.parent_span_id,
        );
        async {
            let mut task = RequestState::new(request);
            self.refresh(Some(&task)).await;

            let result = self.apply_remote_request(request, platform, &mut task).await;
            if !task.state.is_terminal() {
                task.set_done(result.as_ref().map(|_| ()));
            }

            self.refresh(Some(&task)).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn apply_remote_request(
        &self,
        request: &RemoteApiRequest,
        platform: &Platform,
        task: &mut RequestState,
    ) -> Result<()> {
        let observed = self
            .installer
            .state(&request.package)
            .await
            .context("could not get installer state")?;
        if !request.expected_state.matches(&observed) {
            info!(
                "remote request {} not executed as state does not match: expected {}, got stable={:?} experiment={:?}",
                request.id, request.expected_state, observed.stable, observed.experiment
            );
            task.set_invalid();
            return Ok(());
        }
        debug!(
            "Package {} is {}",
            request.package,
            ExperimentPhase::of(&observed)
        );

        let method: RemoteMethod = request
            .method
            .parse()
            .map_err(|_| Error::UnknownMethod(request.method.clone()))?;
        let task = Some(&*task);

        match method {
            RemoteMethod::StartExperiment => {
                let params: TaskWithVersionParams = serde_json::from_value(request.params.clone())
                    .map_err(|source| Error::InvalidParams {
                        method: request.method.clone(),
                        source,
                    })?;
                let package = self.resolve(&request.package, &params.version, platform)?;
                info!(
                    "Daemon: received remote request {} to start experiment for package {} version {}",
                    request.id, request.package, params.version
                );
                self.run_transition(Transition::StartExperiment { url: &package.url }, task)
                    .await
            }
            RemoteMethod::StopExperiment => {
                info!(
                    "Daemon: received remote request {} to stop experiment for package {}",
                    request.id, request.package
                );
                self.run_transition(
                    Transition::StopExperiment {
                        package: &request.package,
                    },
                    task,
                )
                .await
            }
            RemoteMethod::PromoteExperiment => {
                info!(
                    "Daemon: received remote request {} to promote experiment for package {}",
                    request.id, request.package
                );
                self.run_transition(
                    Transition::PromoteExperiment {
                        package: &request.package,
                    },
                    task,
                )
                .await
            }
        }
    }
}

struct Inner {
    config: DaemonConfig,
    session: Mutex<Session>,
    transport: Arc<dyn RemoteTransport>,
    queue: RequestQueue,
    stop: CancellationToken,
    dispatcher: SyncMutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Dispatch loop: GC ticks, queued requests and the stop signal
    async fn dispatch(self: Arc<Self>, mut requests: mpsc::Receiver<QueuedRequest>) {
        let period = self.config.gc_interval;
        let mut gc = tokio::time::interval_at(Instant::now() + period, period);
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = gc.tick() => self.garbage_collect().await,
                _ = self.stop.cancelled() => break,
                Some(queued) = requests.recv() => self.process(queued).await,
            }
        }

        // Requests accepted before the stop signal still get a terminal status.
        requests.close();
        while let Some(queued) = requests.recv().await {
            self.process(queued).await;
        }
        debug!("Daemon: dispatch loop stopped");
    }

    async fn garbage_collect(&self) {
        let session = self.session.lock().await;
        debug!("Daemon: running garbage collection");
        if let Err(e) = session.installer.garbage_collect().await {
            error!("Daemon: could not run GC: {}", e);
        }
    }

    /// Handle a queued request; its outstanding token is released on return
    async fn process(&self, queued: QueuedRequest) {
        let session = self.session.lock().await;
        if let Err(e) = session
            .handle_remote_request(&queued.request, &self.config.platform)
            .await
        {
            error!("Daemon: could not handle remote request {}: {}", queued.request.id, e);
        }
    }

    async fn handle_catalog_update(&self, catalog: Catalog) -> Result<()> {
        let mut session = self.session.lock().await;
        info!("Daemon: received catalog update ({} packages)", catalog.len());
        session.catalog = catalog;
        Ok(())
    }

    async fn schedule_remote_request(&self, request: RemoteApiRequest) -> Result<()> {
        debug!("Daemon: queueing remote request {}", request.id);
        self.queue.enqueue(request, &self.stop).await
    }
}

/// Callbacks registered with the transport
///
/// Holds the daemon weakly so the transport never keeps it alive.
struct Subscriber(Weak<Inner>);

impl Subscriber {
    fn daemon(&self) -> Result<Arc<Inner>> {
        self.0.upgrade().ok_or(Error::QueueClosed)
    }
}

#[async_trait]
impl RemoteHandler for Subscriber {
    async fn on_catalog_update(&self, catalog: Catalog) -> Result<()> {
        self.daemon()?.handle_catalog_update(catalog).await
    }

    async fn on_remote_api_request(&self, request: RemoteApiRequest) -> Result<()> {
        self.daemon()?.schedule_remote_request(request).await
    }
}

/// Handle to the fleet daemon
///
/// Construct once at startup and clone it into whatever needs it.
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<Inner>,
}

impl Daemon {
    /// Create a daemon from its collaborators
    pub fn new(
        config: DaemonConfig,
        installer: Arc<dyn Installer>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        let reporter = StateReporter::new(Arc::clone(&transport), config.remote_updates);
        let queue = RequestQueue::new(config.request_capacity);
        let session = Session {
            catalog: Catalog::default(),
            installer,
            reporter,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                session: Mutex::new(session),
                transport,
                queue,
                stop: CancellationToken::new(),
                dispatcher: SyncMutex::new(None),
            }),
        }
    }

    /// Create a daemon backed by the installer executable from `config`
    ///
    /// Fails if the installer executable cannot be resolved.
    pub fn from_config(config: &FleetConfig, transport: Arc<dyn RemoteTransport>) -> Result<Self> {
        let installer = ExecInstaller::new(config.installer_config()?);
        Ok(Self::new(config.daemon_config()?, Arc::new(installer), transport))
    }

    /// Remote requests accepted but not yet finished
    pub fn outstanding_requests(&self) -> usize {
        self.inner.queue.outstanding()
    }

    /// Publish initial state, start the dispatch loop and, if enabled,
    /// subscribe to remote updates
    pub async fn start(&self) -> Result<()> {
        if self.inner.stop.is_cancelled() {
            return Err(Error::QueueClosed);
        }
        let requests = self
            .inner
            .queue
            .take_receiver()
            .ok_or(Error::AlreadyStarted)?;

        {
            let session = self.inner.session.lock().await;
            session.refresh(None).await;

            // `stop` may have completed while the refresh was running.
            let mut dispatcher = self.inner.dispatcher.lock();
            if self.inner.stop.is_cancelled() {
                return Err(Error::QueueClosed);
            }
            *dispatcher = Some(tokio::spawn(Arc::clone(&self.inner).dispatch(requests)));
        }

        if !self.inner.config.remote_updates {
            info!("Daemon: remote updates are disabled");
            return Ok(());
        }
        let subscriber = Subscriber(Arc::downgrade(&self.inner));
        self.inner
            .transport
            .start(Arc::new(subscriber))
            .context("could not subscribe to remote updates")?;
        if self.inner.stop.is_cancelled() {
            self.inner.transport.close();
            return Err(Error::QueueClosed);
        }
        info!("Daemon: subscribed to remote updates");
        Ok(())
    }

    /// Close the subscription, stop the loop and wait for queued requests
    pub async fn stop(&self) -> Result<()> {
        // Signal first: a concurrent `start` re-checks it after subscribing.
        self.inner.stop.cancel();
        if self.inner.config.remote_updates {
            self.inner.transport.close();
        }
        self.inner.queue.close();

        let dispatcher = self.inner.dispatcher.lock().take();
        if let Some(handle) = dispatcher
            && let Err(e) = handle.await
        {
            error!("Daemon: dispatch loop ended abnormally: {}", e);
        }

        self.inner.queue.wait_drained().await;
        info!("Daemon: stopped");
        Ok(())
    }

    /// Install the package at `url` as the new stable version
    pub async fn install(&self, url: &str) -> Result<()> {
        let session = self.inner.session.lock().await;
        session.run_transition(Transition::Install { url }, None).await
    }

    /// Start an experiment with the package at `url`
    pub async fn start_experiment(&self, url: &str) -> Result<()> {
        let session = self.inner.session.lock().await;
        session
            .run_transition(Transition::StartExperiment { url }, None)
            .await
    }

    /// Discard the experiment of `package`
    pub async fn stop_experiment(&self, package: &str) -> Result<()> {
        let session = self.inner.session.lock().await;
        session
            .run_transition(Transition::StopExperiment { package }, None)
            .await
    }

    /// Promote the experiment of `package` to stable
    pub async fn promote_experiment(&self, package: &str) -> Result<()> {
        let session = self.inner.session.lock().await;
        session
            .run_transition(Transition::PromoteExperiment { package }, None)
            .await
    }

    /// Catalog entry of `name` at `version` for the daemon platform
    pub async fn get_package(&self, name: &str, version: &str) -> Result<Package> {
        let session = self.inner.session.lock().await;
        session
            .resolve(name, version, &self.inner.config.platform)
            .cloned()
    }

    /// Installed state of every package
    pub async fn get_state(&self) -> Result<BTreeMap<String, PackageState>> {
        let session = self.inner.session.lock().await;
        session
            .installer
            .states()
            .await
            .context("could not get installer state")
    }
}
