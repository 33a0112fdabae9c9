// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for reboot coordination.

use crate::hierarchy::StoreError;
use crate::machine::MachineId;
use crate::machine::MachineTagParseError;
use crate::params::ErrorCode;
use crate::params::ServerError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("machine {0} not found")]
    NotFound(MachineId),
    #[error("permission denied")]
    PermissionDenied,
    #[error(transparent)]
    InvalidTag(#[from] MachineTagParseError),
    #[error("watcher {0:?} not found")]
    WatcherNotFound(String),
    #[error("hierarchy store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error fails a whole batch rather than a single
    /// entity within it.
    pub fn is_call_level(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) => true,

            Error::NotFound(_)
            | Error::PermissionDenied
            | Error::InvalidTag(_)
            | Error::WatcherNotFound(_)
            | Error::Internal(_) => false,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Error::NotFound(id),
            StoreError::Unavailable(message) => {
                Error::StoreUnavailable(message)
            }
            StoreError::AlreadyExists(_)
            | StoreError::Misplaced { .. }
            | StoreError::HasContainers { .. } => {
                Error::Internal(err.to_string())
            }
        }
    }
}

impl From<Error> for ServerError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::NotFound(_) | Error::WatcherNotFound(_) => {
                ErrorCode::NotFound
            }
            Error::PermissionDenied => ErrorCode::Unauthorized,
            Error::InvalidTag(_) => ErrorCode::NotValid,
            Error::StoreUnavailable(_) | Error::Internal(_) => {
                ErrorCode::Internal
            }
        };
        ServerError { code, message: err.to_string() }
    }
}
