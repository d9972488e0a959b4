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

//! Push driver
//!
//! Replays a table's pending operations against the server in
//! `sequence` order. Every operation becomes exactly one HTTP call:
//! POST for Add, PUT with `If-Match` for Replace, DELETE with
//! `If-Match` for Delete. Successes update the local mirror and drop
//! the record; conflicts and other rejections mark it Failed and are
//! reported; transport failures put it back to Pending and stop the
//! table, so a later push resumes exactly where this one stopped.

use crate::error::OfflineError;
use crate::operation::{Operation, OperationKind, OperationState};
use crate::store::{LocalStore, StoreBatch};
use datasync_client::{ClientError, DatasyncClient, ItemOptions, Transport};
use datasync_core::{EdmDateTimeOffset, TableRow, Version};
use http::StatusCode;
use serde_json::Value as Json;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// One request the push (or pull) driver could not complete.
#[derive(Debug, Clone, Default)]
pub struct FailedRequest {
    pub status: Option<StatusCode>,
    /// The server's current entity, when the response carried one.
    pub server_entity: Option<Json>,
    /// Transport-level failure description, when no response arrived.
    pub error: Option<String>,
}

/// Outcome of a push across one or more tables.
#[derive(Debug, Default)]
pub struct PushResult {
    /// Operations applied on the server and removed from the queue.
    pub completed: usize,
    /// Failed requests keyed by request URL.
    pub failed_requests: HashMap<String, FailedRequest>,
}

impl PushResult {
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.failed_requests.is_empty()
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.completed += other.completed;
        self.failed_requests.extend(other.failed_requests);
    }
}

/// Push every pending operation of one table, sequentially.
pub(crate) async fn push_table<S: LocalStore, C: Transport>(
    store: &S,
    client: &DatasyncClient<C>,
    table_name: &str,
    cancel: &CancellationToken,
) -> Result<PushResult, OfflineError> {
    let table = client.table_named::<TableRow>(table_name);
    let operations = store
        .pending_operations(&[table_name.to_string()])
        .await?;
    let mut result = PushResult::default();

    tracing::debug!(table = table_name, pending = operations.len(), "push starting");

    for mut operation in operations {
        if cancel.is_cancelled() {
            tracing::debug!(table = table_name, "push cancelled, remaining operations stay pending");
            break;
        }

        operation.state = OperationState::Attempted;
        operation.last_attempt = Some(EdmDateTimeOffset::now());
        let mut batch = StoreBatch::new();
        batch.upsert_operation(operation.clone());
        store.commit(batch).await?;

        let url = match operation.kind {
            OperationKind::Add => table.collection_url().to_string(),
            _ => table.item_url(&operation.item_id).to_string(),
        };

        match send_operation(&table, &operation).await {
            Ok(stored) => {
                let mut batch = StoreBatch::new();
                if let Some(row) = stored {
                    let mirrored = serde_json::to_value(&row)
                        .map_err(|e| OfflineError::Internal(e.to_string()))?;
                    batch.upsert_entity(operation.table.clone(), operation.item_id.clone(), mirrored);
                }
                batch.remove_operation(operation.id);
                store.commit(batch).await?;
                result.completed += 1;
            }
            Err(error) => {
                let transient = error.is_transient();
                let failed = failed_request(&error);
                let status = failed.status;

                operation.state = if transient {
                    OperationState::Pending
                } else {
                    OperationState::Failed
                };
                operation.http_status_code = status.map(|s| s.as_u16());
                let mut batch = StoreBatch::new();
                batch.upsert_operation(operation.clone());
                store.commit(batch).await?;

                tracing::warn!(
                    table = table_name,
                    item = %operation.item_id,
                    status = ?status,
                    transient,
                    "push operation failed"
                );
                result.failed_requests.insert(url, failed);

                if transient {
                    // the service is unreachable; later operations would
                    // fail the same way and must stay pending
                    break;
                }
            }
        }
    }

    Ok(result)
}

async fn send_operation<C: Transport>(
    table: &datasync_client::RemoteTable<TableRow, C>,
    operation: &Operation,
) -> Result<Option<TableRow>, ClientError<TableRow>> {
    let row = TableRow::from_json(operation.item.clone())
        .map_err(|e| ClientError::BadRequest(Some(e.to_string())))?;
    match operation.kind {
        OperationKind::Add => table.add(&row, &ItemOptions::default()).await.map(Some),
        OperationKind::Replace => {
            let options = conditional_options(&operation.entity_version)?;
            table.replace(&row, &options).await
        }
        OperationKind::Delete => {
            let options = conditional_options(&operation.entity_version)?;
            table.remove(&operation.item_id, &options).await.map(|_| None)
        }
    }
}

fn conditional_options(
    entity_version: &str,
) -> Result<ItemOptions, ClientError<TableRow>> {
    if entity_version.is_empty() {
        return Ok(ItemOptions::default());
    }
    let version = Version::from_base64(entity_version)
        .map_err(|e| ClientError::BadRequest(Some(e.to_string())))?;
    Ok(ItemOptions::new().with_version(version).if_match())
}

pub(crate) fn failed_request<T: serde::Serialize>(error: &ClientError<T>) -> FailedRequest {
    match error {
        ClientError::Conflict(conflict) => FailedRequest {
            status: Some(conflict.status),
            server_entity: conflict
                .server_entity
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok()),
            error: None,
        },
        ClientError::BadRequest(message) => FailedRequest {
            status: Some(StatusCode::BAD_REQUEST),
            server_entity: None,
            error: message.clone(),
        },
        ClientError::Unauthorized(status) => FailedRequest {
            status: Some(*status),
            server_entity: None,
            error: None,
        },
        ClientError::NotFound => FailedRequest {
            status: Some(StatusCode::NOT_FOUND),
            ..FailedRequest::default()
        },
        ClientError::Gone => FailedRequest {
            status: Some(StatusCode::GONE),
            ..FailedRequest::default()
        },
        ClientError::NotModified => FailedRequest {
            status: Some(StatusCode::NOT_MODIFIED),
            ..FailedRequest::default()
        },
        ClientError::Unexpected(status) => FailedRequest {
            status: Some(*status),
            ..FailedRequest::default()
        },
        ClientError::Transport(e) | ClientError::Decode(e) => FailedRequest {
            status: None,
            server_entity: None,
            error: Some(e.to_string()),
        },
    }
}
