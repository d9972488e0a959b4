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

//! Local store contract
//!
//! The engine owns two tables next to the application's entity tables:
//! `datasync_operations_queue` (the [`Operation`] records) and
//! `datasync_delta_tokens` (`id → last-seen updatedAt in ms`). All
//! engine writes go through [`LocalStore::commit`] with a single
//! [`StoreBatch`], and the contract is all-or-nothing: a crash between
//! entity writes and a token bump must not be observable. Relational
//! implementations map one batch to one transaction; [`MemoryStore`]
//! applies it under one lock.

use crate::operation::{Operation, OperationState};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::Future;
use std::sync::Mutex;
use uuid::Uuid;

/// One atomic set of local writes.
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    pub upsert_entities: Vec<(String, String, Json)>,
    pub delete_entities: Vec<(String, String)>,
    pub upsert_operations: Vec<Operation>,
    pub remove_operations: Vec<Uuid>,
    pub set_tokens: Vec<(String, i64)>,
    pub remove_tokens: Vec<String>,
}

impl StoreBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upsert_entities.is_empty()
            && self.delete_entities.is_empty()
            && self.upsert_operations.is_empty()
            && self.remove_operations.is_empty()
            && self.set_tokens.is_empty()
            && self.remove_tokens.is_empty()
    }

    pub fn upsert_entity(&mut self, table: impl Into<String>, id: impl Into<String>, item: Json) {
        self.upsert_entities.push((table.into(), id.into(), item));
    }

    pub fn delete_entity(&mut self, table: impl Into<String>, id: impl Into<String>) {
        self.delete_entities.push((table.into(), id.into()));
    }

    pub fn upsert_operation(&mut self, operation: Operation) {
        self.upsert_operations.push(operation);
    }

    pub fn remove_operation(&mut self, id: Uuid) {
        self.remove_operations.push(id);
    }

    pub fn set_token(&mut self, id: impl Into<String>, value: i64) {
        self.set_tokens.push((id.into(), value));
    }

    pub fn remove_token(&mut self, id: impl Into<String>) {
        self.remove_tokens.push(id.into());
    }
}

/// Transactional local persistence used by the offline engine.
pub trait LocalStore: Send + Sync {
    /// One local entity by table and id.
    fn entity(
        &self,
        table: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Json>, StoreError>> + Send;

    /// Every local entity of a table, as `(id, item)` pairs.
    fn entities(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<Vec<(String, Json)>, StoreError>> + Send;

    /// Pending operations for the given tables (all tables when the
    /// slice is empty), ordered by `sequence` ascending.
    fn pending_operations(
        &self,
        tables: &[String],
    ) -> impl Future<Output = Result<Vec<Operation>, StoreError>> + Send;

    /// The queued (non-completed) operation for one entity, if any.
    fn operation_for_item(
        &self,
        table: &str,
        item_id: &str,
    ) -> impl Future<Output = Result<Option<Operation>, StoreError>> + Send;

    /// Largest `sequence` ever assigned, 0 when the queue was never
    /// used.
    fn max_sequence(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// A delta-token value by id.
    fn delta_token(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Apply a batch atomically.
    fn commit(&self, batch: StoreBatch) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Backend(msg) => write!(f, "store backend error: {}", msg),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for StoreError {}

#[derive(Default)]
struct MemoryInner {
    entities: HashMap<(String, String), Json>,
    operations: HashMap<Uuid, Operation>,
    tokens: HashMap<String, i64>,
    max_sequence: u64,
}

/// In-memory [`LocalStore`] for tests and cache-only hosts.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::backend(e.to_string()))
    }
}

impl LocalStore for MemoryStore {
    async fn entity(&self, table: &str, id: &str) -> Result<Option<Json>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .entities
            .get(&(table.to_string(), id.to_string()))
            .cloned())
    }

    async fn entities(&self, table: &str) -> Result<Vec<(String, Json)>, StoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<(String, Json)> = inner
            .entities
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((_, id), item)| (id.clone(), item.clone()))
            .collect();
        rows.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(rows)
    }

    async fn pending_operations(&self, tables: &[String]) -> Result<Vec<Operation>, StoreError> {
        let inner = self.lock()?;
        let mut ops: Vec<Operation> = inner
            .operations
            .values()
            .filter(|op| op.state == OperationState::Pending)
            .filter(|op| tables.is_empty() || tables.iter().any(|t| *t == op.table))
            .cloned()
            .collect();
        ops.sort_by_key(|op| op.sequence);
        Ok(ops)
    }

    async fn operation_for_item(
        &self,
        table: &str,
        item_id: &str,
    ) -> Result<Option<Operation>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .operations
            .values()
            .find(|op| {
                op.table == table
                    && op.item_id == item_id
                    && op.state != OperationState::Completed
            })
            .cloned())
    }

    async fn max_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.max_sequence)
    }

    async fn delta_token(&self, id: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.lock()?.tokens.get(id).copied())
    }

    async fn commit(&self, batch: StoreBatch) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        for (table, id, item) in batch.upsert_entities {
            inner.entities.insert((table, id), item);
        }
        for (table, id) in batch.delete_entities {
            inner.entities.remove(&(table, id));
        }
        for operation in batch.upsert_operations {
            inner.max_sequence = inner.max_sequence.max(operation.sequence);
            inner.operations.insert(operation.id, operation);
        }
        for id in batch.remove_operations {
            inner.operations.remove(&id);
        }
        for (id, value) in batch.set_tokens {
            inner.tokens.insert(id, value);
        }
        for id in batch.remove_tokens {
            inner.tokens.remove(&id);
        }
        Ok(())
    }
}
