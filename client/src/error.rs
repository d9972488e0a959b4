// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed client-side errors.

use crate::transport::TransportError;
use datasync_core::Version;
use http::StatusCode;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

/// A 409/412 answer: the server refused the write and sent its current
/// copy so the caller can reconcile without a second GET.
#[derive(Debug, Clone)]
pub struct Conflict<T> {
    pub status: StatusCode,
    /// What this client submitted, when the operation carried a body.
    pub client_entity: Option<T>,
    /// The server's current copy, when the response body held one.
    pub server_entity: Option<T>,
    /// The server's current version, from the response ETag or body.
    pub server_version: Option<Version>,
}

/// Failure of a table operation.
#[derive(Debug)]
pub enum ClientError<T> {
    /// Network-level failure; retryable.
    Transport(TransportError),
    /// The response body did not decode as the expected shape.
    Decode(TransportError),
    /// The server rejected the request as malformed. Carries the
    /// server's message when one was sent.
    BadRequest(Option<String>),
    /// 401 or 403.
    Unauthorized(StatusCode),
    /// The entity does not exist.
    NotFound,
    /// The entity is soft-deleted.
    Gone,
    /// A conditional GET answered 304; use the cached copy.
    NotModified,
    /// 409/412 with the server's current entity.
    Conflict(Box<Conflict<T>>),
    /// Any other unexpected status.
    Unexpected(StatusCode),
}

impl<T> ClientError<T> {
    /// Whether retrying later could succeed without a reconcile step.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Unexpected(status) => status.is_server_error(),
            _ => false,
        }
    }

    #[must_use]
    pub fn into_conflict(self) -> Option<Conflict<T>> {
        match self {
            Self::Conflict(conflict) => Some(*conflict),
            _ => None,
        }
    }
}

impl<T> Display for ClientError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Transport(e) => write!(f, "transport failure: {}", e),
            Self::Decode(e) => write!(f, "response decode failure: {}", e),
            Self::BadRequest(Some(msg)) => write!(f, "bad request: {}", msg),
            Self::BadRequest(None) => write!(f, "bad request"),
            Self::Unauthorized(status) => write!(f, "not authorized ({})", status),
            Self::NotFound => write!(f, "entity does not exist"),
            Self::Gone => write!(f, "entity has been deleted"),
            Self::NotModified => write!(f, "entity is not modified"),
            Self::Conflict(conflict) => write!(f, "server returned {}", conflict.status),
            Self::Unexpected(status) => write!(f, "unexpected status {}", status),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl<T: Debug> std::error::Error for ClientError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) | Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<TransportError> for ClientError<T> {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Decode(_) => Self::Decode(value),
            other => Self::Transport(other),
        }
    }
}
