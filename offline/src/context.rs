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

//! Sync context
//!
//! The single owner of a local store's synchronization state: it
//! captures mutations into the queue, runs pushes and pulls, and
//! enforces the coarse engine lock — while one push or pull runs on a
//! store, starting another fails fast with `SyncInProgress`. Tables in
//! `local_only` are excluded from capture and refused by push/pull.

use crate::error::OfflineError;
use crate::operation::OperationKind;
use crate::pull::{pull_table, PullRequest, PullResult};
use crate::push::{push_table, PushResult};
use crate::queue::OperationsQueue;
use crate::store::{LocalStore, StoreBatch};
use datasync_client::{DatasyncClient, Transport};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value as Json;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent per-table drivers during push/pull; paging within a
    /// table is always sequential.
    pub parallel_operations: usize,
    /// Advance the delta token after every applied page instead of
    /// once at the end of a pull.
    pub save_after_every_service_request: bool,
    /// Tables excluded from capture, push and pull.
    pub local_only: HashSet<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallel_operations: 1,
            save_after_every_service_request: true,
            local_only: HashSet::new(),
        }
    }
}

/// Offline synchronization engine over a local store and a service
/// client.
pub struct SyncContext<S, C> {
    store: S,
    client: DatasyncClient<C>,
    options: SyncOptions,
    sync_lock: tokio::sync::Mutex<()>,
    queue_lock: tokio::sync::Mutex<()>,
}

impl<S: LocalStore, C: Transport> SyncContext<S, C> {
    pub fn new(store: S, client: DatasyncClient<C>) -> Self {
        Self {
            store,
            client,
            options: SyncOptions::default(),
            sync_lock: tokio::sync::Mutex::new(()),
            queue_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self.options.parallel_operations = self.options.parallel_operations.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn client(&self) -> &DatasyncClient<C> {
        &self.client
    }

    /// Capture a local insert.
    pub async fn add_item(&self, table: &str, item: Json) -> Result<(), OfflineError> {
        self.capture(OperationKind::Add, table, item).await
    }

    /// Capture a local update.
    pub async fn replace_item(&self, table: &str, item: Json) -> Result<(), OfflineError> {
        self.capture(OperationKind::Replace, table, item).await
    }

    /// Capture a local delete. The queued snapshot is the current
    /// local copy, so the push can carry its version as `If-Match`.
    pub async fn remove_item(&self, table: &str, id: &str) -> Result<(), OfflineError> {
        let snapshot = self
            .store
            .entity(table, id)
            .await?
            .ok_or_else(|| {
                OfflineError::Internal(format!(
                    "cannot delete {:?} from {:?}: not in the local store",
                    id, table
                ))
            })?;
        self.capture(OperationKind::Delete, table, snapshot).await
    }

    async fn capture(
        &self,
        kind: OperationKind,
        table: &str,
        item: Json,
    ) -> Result<(), OfflineError> {
        if self.options.local_only.contains(table) {
            // local-only tables mirror writes without queue records
            let mut batch = StoreBatch::new();
            let id = item
                .get("id")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            match kind {
                OperationKind::Delete => batch.delete_entity(table, id),
                _ => batch.upsert_entity(table, id, item),
            }
            self.store.commit(batch).await?;
            return Ok(());
        }
        let _guard = self.queue_lock.lock().await;
        OperationsQueue::new(&self.store)
            .enqueue(kind, table, item)
            .await
    }

    /// Pending operations for the given tables (all when empty), in
    /// queue order.
    pub async fn pending_operations(
        &self,
        tables: &[String],
    ) -> Result<Vec<crate::operation::Operation>, OfflineError> {
        OperationsQueue::new(&self.store).pending(tables).await
    }

    /// Push pending operations for `tables` (every table with pending
    /// work when empty) to the server.
    pub async fn push(
        &self,
        tables: &[String],
        cancel: &CancellationToken,
    ) -> Result<PushResult, OfflineError> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| OfflineError::SyncInProgress)?;
        self.reject_local_only(tables.iter())?;

        let tables = if tables.is_empty() {
            let mut seen = Vec::new();
            for op in self.store.pending_operations(&[]).await? {
                if !seen.contains(&op.table) {
                    seen.push(op.table);
                }
            }
            seen
        } else {
            tables.to_vec()
        };

        let mut result = PushResult::default();
        let outcomes: Vec<PushResult> = stream::iter(tables)
            .map(|table| {
                let store = &self.store;
                let client = &self.client;
                async move { push_table(store, client, &table, cancel).await }
            })
            .buffer_unordered(self.options.parallel_operations)
            .try_collect()
            .await?;
        for outcome in outcomes {
            result.merge(outcome);
        }
        tracing::info!(
            completed = result.completed,
            failed = result.failed_requests.len(),
            "push finished"
        );
        Ok(result)
    }

    /// Pull incremental changes for the given requests.
    ///
    /// Fails fast with `OfflinePending` when any requested table still
    /// has pending operations; applying server state over un-pushed
    /// edits would lose them.
    pub async fn pull(
        &self,
        requests: &[PullRequest],
        cancel: &CancellationToken,
    ) -> Result<PullResult, OfflineError> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| OfflineError::SyncInProgress)?;
        self.reject_local_only(requests.iter().map(|r| &r.table))?;

        let mut tables: Vec<String> = Vec::new();
        for request in requests {
            if !tables.contains(&request.table) {
                tables.push(request.table.clone());
            }
        }
        let pending = self.store.pending_operations(&tables).await?;
        if !pending.is_empty() {
            let mut blocked: Vec<String> = Vec::new();
            for op in pending {
                if !blocked.contains(&op.table) {
                    blocked.push(op.table);
                }
            }
            return Err(OfflineError::OfflinePending(blocked));
        }

        let save_every = self.options.save_after_every_service_request;
        let mut result = PullResult::default();
        let outcomes: Vec<PullResult> = stream::iter(requests.to_vec())
            .map(|request| {
                let store = &self.store;
                let client = &self.client;
                async move { pull_table(store, client, &request, save_every, cancel).await }
            })
            .buffer_unordered(self.options.parallel_operations)
            .try_collect()
            .await?;
        for outcome in outcomes {
            result.merge(outcome);
        }
        tracing::info!(
            additions = result.additions,
            replacements = result.replacements,
            deletions = result.deletions,
            failed = result.failed_requests.len(),
            "pull finished"
        );
        Ok(result)
    }

    fn reject_local_only<'a>(
        &self,
        tables: impl Iterator<Item = &'a String>,
    ) -> Result<(), OfflineError> {
        for table in tables {
            if self.options.local_only.contains(table) {
                return Err(OfflineError::NotSynchronizable(table.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaTokens;
    use crate::operation::OperationState;
    use crate::store::MemoryStore;
    use datasync_mock::expect::{json_response, ExpectedRequest, MockResponse};
    use datasync_mock::MockTransport;
    use datasync_client::{ServiceRequest, ServiceResponse, TransportError};
    use http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;
    use url::Url;

    fn context(transport: MockTransport) -> SyncContext<MemoryStore, MockTransport> {
        let client = DatasyncClient::new(
            Url::parse("http://localhost").unwrap(),
            transport,
        );
        SyncContext::new(MemoryStore::new(), client)
    }

    fn stored(id: &str, title: &str, version: &str, millis: i64) -> Json {
        let updated = datasync_core::EdmDateTimeOffset::from_unix_millis(millis).unwrap();
        json!({
            "id": id,
            "title": title,
            "updatedAt": updated.to_string(),
            "version": version,
            "deleted": false
        })
    }

    #[tokio::test]
    async fn collapsed_queue_produces_no_traffic_on_push() {
        // Add, Replace, Delete of the same entity cancel out entirely
        let ctx = context(MockTransport::new());
        ctx.add_item("movies", json!({"id": "x", "title": "v1"}))
            .await
            .unwrap();
        ctx.replace_item("movies", json!({"id": "x", "title": "Foo"}))
            .await
            .unwrap();
        ctx.remove_item("movies", "x").await.unwrap();

        assert!(ctx.pending_operations(&[]).await.unwrap().is_empty());

        let result = ctx
            .push(&[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_successful());
        assert_eq!(result.completed, 0);
        ctx.client().transport().verify();
    }

    #[tokio::test]
    async fn push_applies_add_and_updates_mirror() {
        let transport = MockTransport::new();
        transport.expect(
            ExpectedRequest::new(Method::POST, "/tables/movies")
                .with_body(json!({"id": "x", "deleted": false, "title": "v1"})),
            MockResponse::Respond(json_response(
                StatusCode::CREATED,
                &stored("x", "v1", "djE=", 1_700_000_000_000),
            )),
        );
        let ctx = context(transport);
        ctx.add_item("movies", json!({"id": "x", "title": "v1"}))
            .await
            .unwrap();

        let result = ctx
            .push(&["movies".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_successful());
        assert_eq!(result.completed, 1);
        assert!(ctx.pending_operations(&[]).await.unwrap().is_empty());

        let mirrored = ctx.store().entity("movies", "x").await.unwrap().unwrap();
        assert_eq!(mirrored["version"], json!("djE="));
        ctx.client().transport().verify();
    }

    #[tokio::test]
    async fn push_conflict_marks_operation_failed_and_reports() {
        let transport = MockTransport::new();
        transport.expect(
            ExpectedRequest::new(Method::PUT, "/tables/movies/x")
                .with_header("if-match", "\"djE=\""),
            MockResponse::Respond(json_response(
                StatusCode::PRECONDITION_FAILED,
                &stored("x", "server wins", "djI=", 1_700_000_000_000),
            )),
        );
        let ctx = context(transport);
        ctx.replace_item(
            "movies",
            json!({"id": "x", "title": "local", "version": "djE="}),
        )
        .await
        .unwrap();

        let result = ctx
            .push(&["movies".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_successful());
        assert_eq!(result.completed, 0);
        let failed = result
            .failed_requests
            .get("http://localhost/tables/movies/x")
            .unwrap();
        assert_eq!(failed.status, Some(StatusCode::PRECONDITION_FAILED));
        assert_eq!(failed.server_entity.as_ref().unwrap()["title"], "server wins");

        let ops = ctx.pending_operations(&[]).await.unwrap();
        assert!(ops.is_empty(), "failed operations are no longer pending");
        let op = ctx
            .store()
            .operation_for_item("movies", "x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.http_status_code, Some(412));
        assert!(op.last_attempt.is_some());
    }

    #[tokio::test]
    async fn transient_failure_keeps_operation_pending_for_resume() {
        let transport = MockTransport::new();
        transport.expect(
            ExpectedRequest::new(Method::POST, "/tables/movies"),
            MockResponse::Fail("connection refused".to_string()),
        );
        let ctx = context(transport);
        ctx.add_item("movies", json!({"id": "a", "title": "1"}))
            .await
            .unwrap();
        ctx.add_item("movies", json!({"id": "b", "title": "2"}))
            .await
            .unwrap();

        let result = ctx
            .push(&["movies".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_successful());
        assert_eq!(result.completed, 0);

        // both operations remain pending, in the original order
        let ops = ctx.pending_operations(&[]).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].item_id, "a");
        assert_eq!(ops[1].item_id, "b");
    }

    #[tokio::test]
    async fn pull_is_blocked_by_pending_operations_without_network() {
        let ctx = context(MockTransport::new());
        ctx.add_item("movies", json!({"id": "x", "title": "v1"}))
            .await
            .unwrap();

        let result = ctx
            .pull(
                &[PullRequest::table("movies")],
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(OfflineError::OfflinePending(tables)) => {
                assert_eq!(tables, vec!["movies".to_string()]);
            }
            other => panic!("expected OfflinePending, got {:?}", other),
        }
        // no request reached the transport
        ctx.client().transport().verify();
    }

    #[tokio::test]
    async fn pull_issues_watermark_query_and_applies_pages() {
        let transport = MockTransport::new();
        transport.expect(
            ExpectedRequest::new(Method::GET, "/tables/movies").with_query(
                "$filter=(updatedAt gt cast(2024-08-23T20:22:54.291Z,Edm.DateTimeOffset))&$orderby=updatedAt&$count=true&__includedeleted=true",
            ),
            MockResponse::Respond(json_response(
                StatusCode::OK,
                &json!({
                    "items": [
                        stored("a", "added", "djE=", 1_724_444_574_300),
                        {
                            "id": "b",
                            "updatedAt": "2024-08-23T20:22:54.400Z",
                            "version": "djI=",
                            "deleted": true
                        }
                    ],
                    "count": 3,
                    "nextLink": "$filter=(updatedAt gt cast(2024-08-23T20:22:54.291Z,Edm.DateTimeOffset))&$orderby=updatedAt&$count=true&__includedeleted=true&$skip=2"
                }),
            )),
        );
        transport.expect(
            ExpectedRequest::new(Method::GET, "/tables/movies").with_query(
                "$filter=(updatedAt gt cast(2024-08-23T20:22:54.291Z,Edm.DateTimeOffset))&$orderby=updatedAt&$count=true&__includedeleted=true&$skip=2",
            ),
            MockResponse::Respond(json_response(
                StatusCode::OK,
                &json!({
                    "items": [stored("c", "replaced", "djM=", 1_724_444_574_500)],
                    "count": 3
                }),
            )),
        );

        let ctx = context(transport);
        // local state: b exists (will be deleted), c exists (will be replaced)
        let mut seed = StoreBatch::new();
        seed.upsert_entity("movies", "b", json!({"id": "b", "title": "old"}));
        seed.upsert_entity("movies", "c", json!({"id": "c", "title": "old"}));
        seed.set_token("movies", 1_724_444_574_291_i64);
        ctx.store().commit(seed).await.unwrap();

        let result = ctx
            .pull(
                &[PullRequest::table("movies")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.is_successful());
        assert_eq!(result.additions, 1);
        assert_eq!(result.deletions, 1);
        assert_eq!(result.replacements, 1);

        assert!(ctx.store().entity("movies", "a").await.unwrap().is_some());
        assert!(ctx.store().entity("movies", "b").await.unwrap().is_none());
        let c = ctx.store().entity("movies", "c").await.unwrap().unwrap();
        assert_eq!(c["title"], "replaced");

        // the token advanced to the maximum applied updatedAt
        let tokens = DeltaTokens::new(ctx.store());
        assert_eq!(tokens.value("movies").await.unwrap(), 1_724_444_574_500);
        ctx.client().transport().verify();
    }

    #[tokio::test]
    async fn pull_twice_with_no_changes_is_idempotent() {
        let transport = MockTransport::new();
        transport.expect(
            ExpectedRequest::new(Method::GET, "/tables/movies").with_query(
                "$orderby=updatedAt&$count=true&__includedeleted=true",
            ),
            MockResponse::Respond(json_response(
                StatusCode::OK,
                &json!({
                    "items": [stored("a", "one", "djE=", 1_724_444_574_300)],
                    "count": 1
                }),
            )),
        );
        transport.expect(
            ExpectedRequest::new(Method::GET, "/tables/movies").with_query(
                "$filter=(updatedAt gt cast(2024-08-23T20:22:54.3Z,Edm.DateTimeOffset))&$orderby=updatedAt&$count=true&__includedeleted=true",
            ),
            MockResponse::Respond(json_response(
                StatusCode::OK,
                &json!({ "items": [], "count": 0 }),
            )),
        );

        let ctx = context(transport);
        let requests = [PullRequest::table("movies")];
        let cancel = CancellationToken::new();

        let first = ctx.pull(&requests, &cancel).await.unwrap();
        assert_eq!(first.additions, 1);

        let second = ctx.pull(&requests, &cancel).await.unwrap();
        assert_eq!(second.additions + second.replacements + second.deletions, 0);

        let tokens = DeltaTokens::new(ctx.store());
        assert_eq!(tokens.value("movies").await.unwrap(), 1_724_444_574_300);
        ctx.client().transport().verify();
    }

    #[tokio::test]
    async fn local_only_tables_skip_queue_and_refuse_sync() {
        let mut options = SyncOptions::default();
        options.local_only.insert("settings".to_string());
        let ctx = context(MockTransport::new()).with_options(options);

        ctx.add_item("settings", json!({"id": "s1", "theme": "dark"}))
            .await
            .unwrap();
        assert!(ctx.pending_operations(&[]).await.unwrap().is_empty());
        assert!(ctx.store().entity("settings", "s1").await.unwrap().is_some());

        assert!(matches!(
            ctx.push(&["settings".to_string()], &CancellationToken::new())
                .await,
            Err(OfflineError::NotSynchronizable(_))
        ));
        assert!(matches!(
            ctx.pull(&[PullRequest::table("settings")], &CancellationToken::new())
                .await,
            Err(OfflineError::NotSynchronizable(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_pull_applies_nothing_and_keeps_token() {
        let ctx = context(MockTransport::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ctx
            .pull(&[PullRequest::table("movies")], &cancel)
            .await
            .unwrap();
        assert_eq!(result.additions, 0);
        let tokens = DeltaTokens::new(ctx.store());
        assert_eq!(tokens.get("movies").await.unwrap(), None);
        ctx.client().transport().verify();
    }

    /// Transport that reports when a request is in flight and holds the
    /// response until the test releases it, so cancellation can be
    /// fired in between.
    struct GatedTransport {
        started: Arc<Notify>,
        release: Arc<Notify>,
        response: Mutex<Option<ServiceResponse>>,
    }

    impl Transport for GatedTransport {
        async fn send(
            &self,
            _request: ServiceRequest,
        ) -> Result<ServiceResponse, TransportError> {
            self.started.notify_one();
            self.release.notified().await;
            let response = self
                .response
                .lock()
                .expect("not poisoned")
                .take()
                .expect("one request expected");
            Ok(response)
        }
    }

    #[tokio::test]
    async fn cancelling_mid_fetch_discards_the_in_flight_page() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let transport = GatedTransport {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
            response: Mutex::new(Some(json_response(
                StatusCode::OK,
                &json!({
                    "items": [stored("a", "in flight", "djE=", 1_724_444_574_300)],
                    "count": 1
                }),
            ))),
        };
        let client = DatasyncClient::new(Url::parse("http://localhost").unwrap(), transport);
        let ctx = Arc::new(SyncContext::new(MemoryStore::new(), client));
        let cancel = CancellationToken::new();

        let pull = {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                ctx.pull(&[PullRequest::table("movies")], &cancel).await
            })
        };

        // wait until the page request is in flight, cancel, then let
        // the response arrive
        started.notified().await;
        cancel.cancel();
        release.notify_one();

        let result = pull.await.expect("pull task completes").unwrap();
        assert_eq!(result.additions + result.replacements + result.deletions, 0);
        assert!(result.is_successful());

        // the fetched page was discarded whole: no rows in the local
        // store and no delta-token advance for the in-flight request
        assert!(ctx.store().entity("movies", "a").await.unwrap().is_none());
        assert_eq!(
            DeltaTokens::new(ctx.store()).get("movies").await.unwrap(),
            None
        );
    }
}
