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

//! Pull driver
//!
//! Replicates server changes into the local store with a per-query
//! watermark: the request filter is conjoined with
//! `updatedAt gt cast(<token>,Edm.DateTimeOffset)`, ordered by
//! `updatedAt`, counted, and includes soft-deleted rows. Each page is
//! applied in one store batch; the token advances only past fully
//! applied pages and never regresses. Rows older than the token are
//! still applied (server state wins) without moving it.

use crate::delta::{token_id, DeltaTokens};
use crate::error::OfflineError;
use crate::push::{failed_request, FailedRequest};
use crate::store::{LocalStore, StoreBatch};
use datasync_client::{DatasyncClient, Transport};
use datasync_core::ast::{BinaryOp, Expr, OrderBy, Value};
use datasync_core::query::Query;
use datasync_core::{EdmDateTimeOffset, TableRow};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// One incremental replication request.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub table: String,
    /// Distinguishes watermarks of different filters over one table:
    /// `None` shares the table-wide token, `Some("")` derives a token
    /// from the query text, anything else names the token explicitly.
    pub query_id: Option<String>,
    pub query: Query,
}

impl PullRequest {
    /// Pull the whole table under its table-wide token.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            query_id: None,
            query: Query::default(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }
}

/// Outcome of a pull across one or more requests.
#[derive(Debug, Default)]
pub struct PullResult {
    pub additions: usize,
    pub replacements: usize,
    pub deletions: usize,
    /// Failed requests keyed by request URL.
    pub failed_requests: HashMap<String, FailedRequest>,
}

impl PullResult {
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.failed_requests.is_empty()
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.additions += other.additions;
        self.replacements += other.replacements;
        self.deletions += other.deletions;
        self.failed_requests.extend(other.failed_requests);
    }
}

/// Compose the wire query for a request and its current watermark.
pub(crate) fn incremental_query(request: &PullRequest, token: i64) -> Result<Query, OfflineError> {
    let mut query = request.query.clone();
    if token > 0 {
        let since = EdmDateTimeOffset::from_unix_millis(token)
            .map_err(|e| OfflineError::Internal(e.to_string()))?;
        let watermark = Expr::Binary(
            BinaryOp::Gt,
            Box::new(Expr::Member("updatedAt".to_string())),
            Box::new(Expr::Constant(Value::DateTimeOffset(since))),
        );
        query.filter = Some(match query.filter.take() {
            Some(filter) => filter.and(watermark),
            None => watermark,
        });
    }
    query.order_by = vec![OrderBy::asc("updatedAt")];
    query.count = true;
    query.include_deleted = true;
    query.skip = None;
    query.top = None;
    Ok(query)
}

/// Run one pull request, paging until done, cancelled or failed.
pub(crate) async fn pull_table<S: LocalStore, C: Transport>(
    store: &S,
    client: &DatasyncClient<C>,
    request: &PullRequest,
    save_after_every_service_request: bool,
    cancel: &CancellationToken,
) -> Result<PullResult, OfflineError> {
    let tokens = DeltaTokens::new(store);
    let token_key = token_id(
        &request.table,
        request.query_id.as_deref(),
        &request.query.to_query_string(),
    );
    let starting_token = tokens.value(&token_key).await?;

    let query = incremental_query(request, starting_token)?;
    let table = client.table_named::<TableRow>(&request.table);
    let mut result = PullResult::default();
    let mut watermark = starting_token;
    let mut query_string = query.to_encoded_query_string();

    tracing::debug!(
        table = %request.table,
        token = starting_token,
        "pull starting"
    );

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(table = %request.table, "pull cancelled before next page");
            return Ok(result);
        }

        let page = match table.get_page(&query_string).await {
            Ok(page) => page,
            Err(error) => {
                let url = format!("{}?{}", table.collection_url(), query_string);
                result.failed_requests.insert(url, failed_request(&error));
                break;
            }
        };

        // the token may have fired while the fetch was in flight; a
        // page that arrives after cancellation is discarded whole, so
        // neither the store nor the watermark moves for it
        if cancel.is_cancelled() {
            tracing::debug!(
                table = %request.table,
                "pull cancelled during page fetch, page discarded"
            );
            return Ok(result);
        }

        let mut batch = StoreBatch::new();
        let mut page_max = watermark;
        for row in &page.items {
            let id = row.system.id.clone();
            let exists = store.entity(&request.table, &id).await?.is_some();
            if row.system.deleted {
                if exists {
                    batch.delete_entity(request.table.clone(), id);
                    result.deletions += 1;
                }
            } else {
                let mirrored = serde_json::to_value(row)
                    .map_err(|e| OfflineError::Internal(e.to_string()))?;
                batch.upsert_entity(request.table.clone(), id, mirrored);
                if exists {
                    result.replacements += 1;
                } else {
                    result.additions += 1;
                }
            }
            if let Some(updated_at) = row.system.updated_at {
                page_max = page_max.max(updated_at.unix_millis());
            }
        }

        if save_after_every_service_request && page_max > watermark {
            batch.set_token(token_key.clone(), page_max);
        }
        if !batch.is_empty() {
            store.commit(batch).await?;
        }
        watermark = watermark.max(page_max);

        match page.next_link {
            Some(next) => query_string = next,
            None => break,
        }
    }

    if !save_after_every_service_request && watermark > starting_token {
        tokens.set(&token_key, watermark).await?;
    }

    tracing::debug!(
        table = %request.table,
        additions = result.additions,
        replacements = result.replacements,
        deletions = result.deletions,
        token = watermark,
        "pull finished"
    );
    Ok(result)
}
