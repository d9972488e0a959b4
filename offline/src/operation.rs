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

//! Queued operation records and collapsing rules.
//!
//! One record describes one pending mutation against the server. A new
//! mutation for an entity that already has a queued record collapses
//! into it ([`collapse`]) so at most one operation per entity is ever
//! in flight, and the queue stays a faithful reconstruction of the
//! client's intent.

use datasync_core::EdmDateTimeOffset;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// The mutation a queued operation performs on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Replace,
    Delete,
}

/// Lifecycle state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Not yet sent; eligible for collapsing and for the next push.
    Pending,
    /// Handed to the push driver; in flight.
    Attempted,
    /// The last push attempt failed; kept for retry or reconciliation.
    Failed,
    /// Applied on the server.
    Completed,
}

/// One row of the `datasync_operations_queue` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub table: String,
    pub item_id: String,
    /// JSON snapshot of the entity at capture time (the last write
    /// wins across collapses).
    pub item: Json,
    /// Base64 of the last server version this client saw; empty when
    /// the entity has never round-tripped.
    pub entity_version: String,
    pub state: OperationState,
    /// Queue position; assigned once and kept across collapses.
    pub sequence: u64,
    /// Collapse counter, incremented each time a mutation merges in.
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<EdmDateTimeOffset>,
}

impl Operation {
    #[must_use]
    pub fn new(
        kind: OperationKind,
        table: impl Into<String>,
        item_id: impl Into<String>,
        item: Json,
        sequence: u64,
    ) -> Self {
        let entity_version = item
            .get("version")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id: Uuid::new_v4(),
            kind,
            table: table.into(),
            item_id: item_id.into(),
            item,
            entity_version,
            state: OperationState::Pending,
            sequence,
            version: 0,
            http_status_code: None,
            last_attempt: None,
        }
    }
}

/// What saving a new mutation does to an already-queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseOutcome {
    /// The queued record survives with this kind and the new snapshot.
    Becomes(OperationKind),
    /// The queued record is removed and no new one is written (an Add
    /// undone by a Delete).
    Cancel,
}

/// The collapse matrix. `Err` cells are contradictory histories the
/// caller must surface as a queue conflict.
pub fn collapse(existing: OperationKind, incoming: OperationKind) -> Result<CollapseOutcome, ()> {
    use OperationKind::{Add, Delete, Replace};
    match (existing, incoming) {
        (Add, Add) => Err(()),
        (Add, Replace) => Ok(CollapseOutcome::Becomes(Add)),
        (Add, Delete) => Ok(CollapseOutcome::Cancel),
        (Replace, Add) => Err(()),
        (Replace, Replace) => Ok(CollapseOutcome::Becomes(Replace)),
        (Replace, Delete) => Ok(CollapseOutcome::Becomes(Delete)),
        (Delete, Add) => Ok(CollapseOutcome::Becomes(Replace)),
        (Delete, Replace) => Err(()),
        (Delete, Delete) => Err(()),
    }
}
