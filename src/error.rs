// src/error.rs

//! Error types for the fleet daemon
//!
//! Every failure the daemon can surface is an [`Error`]. Installer failures
//! keep their structured [`InstallerError`] so the code survives wrapping and
//! can be reported back to the control plane.

use crate::installer::errors::InstallerError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the daemon and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// Structured failure reported by the installer
    #[error(transparent)]
    Installer(#[from] InstallerError),

    /// An error wrapped with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// No catalog entry for the requested package build
    #[error("could not get package {name}, {version} for {os}, {arch}")]
    PackageNotFound {
        name: String,
        version: String,
        os: String,
        arch: String,
    },

    /// Remote request carried a method the daemon does not handle
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Remote request parameters could not be decoded
    #[error("could not unmarshal {method} params: {source}")]
    InvalidParams {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request queue no longer accepts work (daemon stopping or stopped)
    #[error("request queue is closed")]
    QueueClosed,

    /// `start` was called on a daemon that is already running
    #[error("daemon already started")]
    AlreadyStarted,

    /// Remote transport failure
    #[error("remote transport error: {0}")]
    Transport(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Construction-time failure (executable resolution, client setup)
    #[error("initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap this error with an operation-identifying message
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a context chain
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Extension for attaching context to fallible results
pub trait ResultExt<T> {
    /// Wrap the error (if any) with an operation-identifying message
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}
