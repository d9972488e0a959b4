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

//! Offline engine errors.

use crate::operation::Operation;
use crate::store::StoreError;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

#[derive(Debug)]
pub enum OfflineError {
    /// Local store failure; the surrounding transaction rolled back.
    Store(StoreError),
    /// The mutation carried an id outside the allowed grammar; nothing
    /// was written.
    InvalidId(String),
    /// The requested collapse is contradictory (double add, double
    /// delete, replace after delete). Carries both operations; the
    /// caller must resolve explicitly.
    QueueConflict {
        existing: Box<Operation>,
        incoming: Box<Operation>,
    },
    /// Pull refused to run: these tables have pending operations that
    /// must be pushed first.
    OfflinePending(Vec<String>),
    /// Another push or pull is running on this store.
    SyncInProgress,
    /// The table is marked local-only and cannot be synchronized.
    NotSynchronizable(String),
    /// Engine invariant violation.
    Internal(String),
}

impl Display for OfflineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Store(e) => write!(f, "local store error: {}", e),
            Self::InvalidId(id) => write!(f, "invalid entity id: {:?}", id),
            Self::QueueConflict { existing, incoming } => write!(
                f,
                "operation {:?} for {:?} conflicts with queued {:?}",
                incoming.kind, incoming.item_id, existing.kind
            ),
            Self::OfflinePending(tables) => write!(
                f,
                "tables have pending operations, push before pulling: {}",
                tables.join(", ")
            ),
            Self::SyncInProgress => write!(f, "a push or pull is already running on this store"),
            Self::NotSynchronizable(table) => {
                write!(f, "table {:?} is local-only and cannot be synchronized", table)
            }
            Self::Internal(msg) => write!(f, "offline engine failure: {}", msg),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for OfflineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for OfflineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
