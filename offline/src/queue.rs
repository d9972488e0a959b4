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

//! Operations queue
//!
//! Captures client mutations: one [`enqueue`](OperationsQueue::enqueue)
//! writes the local entity and the queue record in a single store
//! batch, applying the collapsing rules when the entity already has a
//! queued operation. The whole save is atomic; an invalid id fails
//! before anything is written.

use crate::error::OfflineError;
use crate::operation::{collapse, CollapseOutcome, Operation, OperationKind, OperationState};
use crate::store::{LocalStore, StoreBatch};
use datasync_core::validate_id;
use serde_json::Value as Json;

/// Queue service over a local store.
pub struct OperationsQueue<'a, S> {
    store: &'a S,
}

impl<'a, S: LocalStore> OperationsQueue<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Capture one mutation: apply it to the local mirror and merge it
    /// into the queue.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        table: &str,
        item: Json,
    ) -> Result<(), OfflineError> {
        let item_id = item
            .get("id")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        validate_id(&item_id).map_err(|_| OfflineError::InvalidId(item_id.clone()))?;

        let mut batch = StoreBatch::new();
        match kind {
            OperationKind::Add | OperationKind::Replace => {
                batch.upsert_entity(table, item_id.clone(), item.clone());
            }
            OperationKind::Delete => {
                batch.delete_entity(table, item_id.clone());
            }
        }

        match self.store.operation_for_item(table, &item_id).await? {
            None => {
                let sequence = self.store.max_sequence().await? + 1;
                batch.upsert_operation(Operation::new(kind, table, &item_id, item, sequence));
            }
            Some(existing) => {
                if existing.state == OperationState::Attempted {
                    let sequence = self.store.max_sequence().await? + 1;
                    let incoming = Operation::new(kind, table, &item_id, item, sequence);
                    return Err(OfflineError::QueueConflict {
                        existing: Box::new(existing),
                        incoming: Box::new(incoming),
                    });
                }
                match collapse(existing.kind, kind) {
                    Ok(CollapseOutcome::Becomes(new_kind)) => {
                        let mut merged = existing;
                        merged.kind = new_kind;
                        merged.item = item;
                        merged.state = OperationState::Pending;
                        merged.version += 1;
                        // the first-seen server version stays authoritative
                        batch.upsert_operation(merged);
                    }
                    Ok(CollapseOutcome::Cancel) => {
                        batch.remove_operation(existing.id);
                    }
                    Err(()) => {
                        let sequence = self.store.max_sequence().await? + 1;
                        let incoming = Operation::new(kind, table, &item_id, item, sequence);
                        return Err(OfflineError::QueueConflict {
                            existing: Box::new(existing),
                            incoming: Box::new(incoming),
                        });
                    }
                }
            }
        }

        self.store.commit(batch).await?;
        Ok(())
    }

    /// Pending operations for the given tables, in `sequence` order.
    pub async fn pending(&self, tables: &[String]) -> Result<Vec<Operation>, OfflineError> {
        Ok(self.store.pending_operations(tables).await?)
    }
}
