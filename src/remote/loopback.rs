// src/remote/loopback.rs

//! In-process remote transport
//!
//! Keeps every published state snapshot and lets the embedder push catalog
//! updates and requests straight into the subscribed daemon.

use super::{PackageStateReport, RemoteApiRequest, RemoteHandler, RemoteTransport};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct LoopbackTransport {
    handler: Mutex<Option<Arc<dyn RemoteHandler>>>,
    published: Mutex<Vec<Vec<PackageStateReport>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a handler is currently subscribed
    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().is_some()
    }

    fn handler(&self) -> Result<Arc<dyn RemoteHandler>> {
        self.handler
            .lock()
            .clone()
            .ok_or_else(|| Error::Transport("no subscriber".to_string()))
    }

    /// Deliver a catalog update to the subscriber
    pub async fn deliver_catalog(&self, catalog: Catalog) -> Result<()> {
        self.handler()?.on_catalog_update(catalog).await
    }

    /// Deliver a remote API request to the subscriber
    pub async fn deliver_request(&self, request: RemoteApiRequest) -> Result<()> {
        self.handler()?.on_remote_api_request(request).await
    }

    /// Every snapshot published so far, oldest first
    pub fn published(&self) -> Vec<Vec<PackageStateReport>> {
        self.published.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }

    /// Most recent snapshot
    pub fn last_published(&self) -> Option<Vec<PackageStateReport>> {
        self.published.lock().last().cloned()
    }
}

impl RemoteTransport for LoopbackTransport {
    fn start(&self, handler: Arc<dyn RemoteHandler>) -> Result<()> {
        *self.handler.lock() = Some(handler);
        Ok(())
    }

    fn close(&self) {
        self.handler.lock().take();
    }

    fn publish_state(&self, packages: Vec<PackageStateReport>) {
        debug!("Publishing state of {} package(s)", packages.len());
        self.published.lock().push(packages);
    }
}
