// src/daemon/request.rs

//! Per-request status record
//!
//! One [`RequestState`] exists for each remote request being handled. It is
//! passed by reference down the handling path and read by the state reporter,
//! which attaches it to the request's package in every published snapshot.

use crate::error::Error;
use crate::installer::InstallerError;
use crate::remote::{RemoteApiRequest, TaskError, TaskReport, TaskState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    pub package: String,
    pub id: String,
    pub state: TaskState,
    pub error: Option<InstallerError>,
}

impl RequestState {
    /// Start tracking a request; it begins as running
    pub fn new(request: &RemoteApiRequest) -> Self {
        Self {
            package: request.package.clone(),
            id: request.id.clone(),
            state: TaskState::Running,
            error: None,
        }
    }

    /// Observed state did not match the request's expectation
    pub fn set_invalid(&mut self) {
        self.state = TaskState::InvalidState;
    }

    /// Record the outcome of the request
    pub fn set_done(&mut self, result: Result<(), &Error>) {
        match result {
            Ok(()) => {
                self.state = TaskState::Done;
                self.error = None;
            }
            Err(err) => {
                self.state = TaskState::Error;
                self.error = Some(InstallerError::from_error(err));
            }
        }
    }

    /// Task block published for this request's package
    pub fn report(&self) -> TaskReport {
        TaskReport {
            id: self.id.clone(),
            state: self.state,
            error: self.error.as_ref().map(TaskError::from),
        }
    }
}
