// src/daemon/queue.rs

//! Bounded queue of remote requests
//!
//! Requests are handed to the dispatch loop over a bounded FIFO channel.
//! Each queued request carries an outstanding-work token that is released
//! once the loop has finished with it, so shutdown can wait until every
//! accepted request reached a terminal status.

use crate::error::{Error, Result};
use crate::remote::RemoteApiRequest;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::{TaskTracker, TaskTrackerToken};

/// Default number of requests that can wait for the dispatch loop
pub const DEFAULT_REQUEST_CAPACITY: usize = 32;

/// A request waiting for the dispatch loop
pub struct QueuedRequest {
    pub request: RemoteApiRequest,
    /// Released on drop, once the request is finished with
    _outstanding: TaskTrackerToken,
}

pub struct RequestQueue {
    sender: mpsc::Sender<QueuedRequest>,
    receiver: Mutex<Option<mpsc::Receiver<QueuedRequest>>>,
    outstanding: TaskTracker,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            outstanding: TaskTracker::new(),
        }
    }

    /// Requests accepted but not yet finished
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Hand the receiving end to the dispatch loop; only the first call gets it
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<QueuedRequest>> {
        self.receiver.lock().take()
    }

    /// Queue a request for the dispatch loop
    ///
    /// Waits while the queue is full. Gives up with [`Error::QueueClosed`]
    /// once `stop` fires or the queue has been closed.
    pub async fn enqueue(&self, request: RemoteApiRequest, stop: &CancellationToken) -> Result<()> {
        if self.outstanding.is_closed() || stop.is_cancelled() {
            return Err(Error::QueueClosed);
        }
        let queued = QueuedRequest {
            request,
            _outstanding: self.outstanding.token(),
        };

        tokio::select! {
            sent = self.sender.send(queued) => sent.map_err(|_| Error::QueueClosed),
            _ = stop.cancelled() => Err(Error::QueueClosed),
        }
    }

    /// Stop accepting requests
    ///
    /// If no loop ever took the receiver, queued requests are dropped here.
    pub fn close(&self) {
        self.outstanding.close();
        self.receiver.lock().take();
    }

    /// Wait until every accepted request has been released
    pub async fn wait_drained(&self) {
        self.outstanding.wait().await;
    }
}
