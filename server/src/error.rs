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

//! Table operation outcomes and their HTTP mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use datasync_core::TableRow;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

/// Non-success outcome of a table operation.
///
/// Conflict-class variants carry the server's current copy of the
/// entity; the HTTP mapping serializes it as the response body together
/// with its ETag so clients reconcile without a second GET. 304 is
/// modeled here too because it shares the "stop and answer with a bare
/// status" control flow.
#[derive(Debug)]
pub enum TableError {
    /// Malformed query, invalid id or invalid payload. 400.
    BadRequest(String),
    /// The access hook did not recognize the caller. 401.
    Unauthenticated,
    /// The access hook rejected the operation. 403.
    Forbidden,
    /// No row with the requested id. 404.
    NotFound,
    /// The row is soft-deleted. 410.
    Gone,
    /// A negative precondition matched on a read. 304.
    NotModified,
    /// The id is already taken; body is the current row. 409.
    Conflict(Box<TableRow>),
    /// A precondition failed; body is the current row when one exists
    /// (an `If-Match` sent with a create has none). 412.
    PreconditionFailed(Option<Box<TableRow>>),
    /// Storage failure. 500.
    Repository(String),
}

impl TableError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Gone => StatusCode::GONE,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The server's current row, when this outcome carries one.
    #[must_use]
    pub fn current_row(&self) -> Option<&TableRow> {
        match self {
            Self::Conflict(row) => Some(row),
            Self::PreconditionFailed(row) => row.as_deref(),
            _ => None,
        }
    }
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {}", msg),
            Self::Unauthenticated => write!(f, "request is not authenticated"),
            Self::Forbidden => write!(f, "operation is not permitted"),
            Self::NotFound => write!(f, "entity does not exist"),
            Self::Gone => write!(f, "entity has been deleted"),
            Self::NotModified => write!(f, "entity is not modified"),
            Self::Conflict(row) => write!(f, "entity {:?} already exists", row.system.id),
            Self::PreconditionFailed(Some(row)) => {
                write!(f, "precondition failed for entity {:?}", row.system.id)
            }
            Self::PreconditionFailed(None) => write!(f, "precondition failed"),
            Self::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for TableError {}

impl IntoResponse for TableError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Conflict(row) | Self::PreconditionFailed(Some(row)) => {
                let etag = row
                    .system
                    .version
                    .as_ref()
                    .map(|v| v.etag().to_string())
                    .and_then(|text| HeaderValue::from_str(&text).ok());
                let mut response = (status, Json(*row)).into_response();
                if let Some(etag) = etag {
                    response.headers_mut().insert(header::ETAG, etag);
                }
                response
            }
            Self::BadRequest(message) => (
                status,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            Self::Repository(message) => {
                tracing::error!(error = %message, "repository failure");
                status.into_response()
            }
            _ => status.into_response(),
        }
    }
}
