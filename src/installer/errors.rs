// src/installer/errors.rs

//! Structured installer errors
//!
//! The control plane only sees a numeric code and a message for a failed
//! task. [`InstallerError::from_error`] turns any daemon error into that
//! shape, keeping the code of the innermost installer failure.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes understood by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u64", from = "u64")]
pub enum InstallerErrorCode {
    /// Anything without a more specific code
    Unknown,
    /// Not enough disk space to install
    NotEnoughDiskSpace,
    /// Package build not found
    PackageNotFound,
    /// Filesystem operation failed
    FilesystemIssue,
}

impl InstallerErrorCode {
    /// Wire value of this code
    pub fn as_u64(self) -> u64 {
        match self {
            InstallerErrorCode::Unknown => 0,
            InstallerErrorCode::NotEnoughDiskSpace => 1,
            InstallerErrorCode::PackageNotFound => 2,
            InstallerErrorCode::FilesystemIssue => 3,
        }
    }
}

impl From<InstallerErrorCode> for u64 {
    fn from(code: InstallerErrorCode) -> Self {
        code.as_u64()
    }
}

impl From<u64> for InstallerErrorCode {
    fn from(value: u64) -> Self {
        match value {
            1 => InstallerErrorCode::NotEnoughDiskSpace,
            2 => InstallerErrorCode::PackageNotFound,
            3 => InstallerErrorCode::FilesystemIssue,
            _ => InstallerErrorCode::Unknown,
        }
    }
}

/// A coded installer failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerError {
    pub code: InstallerErrorCode,
    #[serde(rename = "error")]
    pub message: String,
}

impl InstallerError {
    pub fn new(code: InstallerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(InstallerErrorCode::Unknown, message)
    }

    /// Translate an arbitrary daemon error for remote visibility
    ///
    /// The message is the fully wrapped error; the code comes from the
    /// innermost installer error, or from the error kind when it has an
    /// obvious installer meaning.
    pub fn from_error(err: &Error) -> Self {
        let code = match err.root() {
            Error::Installer(inner) => inner.code,
            Error::PackageNotFound { .. } => InstallerErrorCode::PackageNotFound,
            _ => InstallerErrorCode::Unknown,
        };
        Self::new(code, err.to_string())
    }
}

impl fmt::Display for InstallerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InstallerError {}
