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

//! Repository contract
//!
//! Abstract CRUD over a typed store of [`TableRow`]s. The repository
//! owns the server-side metadata invariants: every successful mutation
//! assigns a fresh [`Version`] and a per-entity monotonically
//! non-decreasing `updatedAt`. The precondition check of `replace` and
//! `delete` is atomic with the mutation — the returned
//! [`RepositoryError::PreconditionFailed`] carries the current row.
//!
//! [`InMemoryRepository`] is the only implementation shipped here;
//! relational adapters are host concerns and bind the same trait.

use datasync_core::{EdmDateTimeOffset, TableRow, Version};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::Future;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

/// Abstract store of one table's rows.
pub trait Repository: Send + Sync + 'static {
    /// A snapshot of every row, soft-deleted rows included.
    fn queryable(&self)
        -> impl Future<Output = Result<Vec<TableRow>, RepositoryError>> + Send;

    /// Insert a new row. Fails with [`RepositoryError::Conflict`] when
    /// the id is taken, even by a soft-deleted row.
    fn create(
        &self,
        row: TableRow,
    ) -> impl Future<Output = Result<TableRow, RepositoryError>> + Send;

    /// Read one row by id, soft-deleted rows included.
    fn read(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TableRow>, RepositoryError>> + Send;

    /// Replace a row. With `expected`, fails unless the stored version
    /// matches; the check and the write are atomic.
    fn replace(
        &self,
        row: TableRow,
        expected: Option<&Version>,
    ) -> impl Future<Output = Result<TableRow, RepositoryError>> + Send;

    /// Remove a row outright. Soft deletion is a controller concern and
    /// goes through [`Repository::replace`]; this permanently drops the
    /// row (tombstone purges, test cleanup).
    fn delete(
        &self,
        id: &str,
        expected: Option<&Version>,
    ) -> impl Future<Output = Result<TableRow, RepositoryError>> + Send;
}

#[derive(Debug)]
pub enum RepositoryError {
    NotFound,
    Conflict(Box<TableRow>),
    PreconditionFailed(Box<TableRow>),
    Store(String),
}

impl Display for RepositoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::NotFound => write!(f, "row does not exist"),
            Self::Conflict(row) => write!(f, "row {:?} already exists", row.system.id),
            Self::PreconditionFailed(row) => {
                write!(f, "stored version of {:?} differs", row.system.id)
            }
            Self::Store(msg) => write!(f, "store error: {}", msg),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for RepositoryError {}

/// Mutex-guarded in-memory repository.
///
/// Writes are serialized per table by the lock, which also makes the
/// version check and the mutation atomic. Rows iterate in id order so
/// unordered queries page deterministically, and `updatedAt` stamps
/// are strictly increasing across the whole table so the timestamp is
/// a safe pull cursor.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<String, TableRow>,
    last_stamp: Option<OffsetDateTime>,
}

impl Inner {
    /// Assign a fresh version and the next strictly-greater timestamp.
    fn stamp(&mut self, row: &mut TableRow) {
        let mut stamped = OffsetDateTime::now_utc();
        if let Some(last) = self.last_stamp {
            let floor = last + Duration::milliseconds(1);
            if floor > stamped {
                stamped = floor;
            }
        }
        self.last_stamp = Some(stamped);
        row.system.updated_at = Some(EdmDateTimeOffset::from(stamped));
        row.system.version = Some(Version::random());
    }
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly, assigning metadata as a mutation would.
    pub fn seed(&self, rows: impl IntoIterator<Item = TableRow>) {
        let mut inner = self.inner.lock().expect("not poisoned");
        for mut row in rows {
            inner.stamp(&mut row);
            inner.rows.insert(row.system.id.clone(), row);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|e| RepositoryError::Store(e.to_string()))
    }
}

impl Repository for InMemoryRepository {
    async fn queryable(&self) -> Result<Vec<TableRow>, RepositoryError> {
        Ok(self.lock()?.rows.values().cloned().collect())
    }

    async fn create(&self, mut row: TableRow) -> Result<TableRow, RepositoryError> {
        let mut inner = self.lock()?;
        if let Some(current) = inner.rows.get(&row.system.id) {
            return Err(RepositoryError::Conflict(Box::new(current.clone())));
        }
        inner.stamp(&mut row);
        inner.rows.insert(row.system.id.clone(), row.clone());
        Ok(row)
    }

    async fn read(&self, id: &str) -> Result<Option<TableRow>, RepositoryError> {
        Ok(self.lock()?.rows.get(id).cloned())
    }

    async fn replace(
        &self,
        mut row: TableRow,
        expected: Option<&Version>,
    ) -> Result<TableRow, RepositoryError> {
        let mut inner = self.lock()?;
        let current = match inner.rows.get(&row.system.id) {
            Some(current) => current.clone(),
            None => return Err(RepositoryError::NotFound),
        };
        if let Some(expected) = expected {
            if current.system.version.as_ref() != Some(expected) {
                return Err(RepositoryError::PreconditionFailed(Box::new(current)));
            }
        }
        inner.stamp(&mut row);
        inner.rows.insert(row.system.id.clone(), row.clone());
        Ok(row)
    }

    async fn delete(&self, id: &str, expected: Option<&Version>) -> Result<TableRow, RepositoryError> {
        let mut inner = self.lock()?;
        let current = match inner.rows.get(id) {
            Some(current) => current.clone(),
            None => return Err(RepositoryError::NotFound),
        };
        if let Some(expected) = expected {
            if current.system.version.as_ref() != Some(expected) {
                return Err(RepositoryError::PreconditionFailed(Box::new(current)));
            }
        }
        inner.rows.remove(id);
        Ok(current)
    }
}
