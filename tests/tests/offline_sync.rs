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

//! Offline engine scenarios against a live in-process service.

use datasync_client::reqwest::Client;
use datasync_client::DatasyncClient;
use datasync_core::query::builder::{field, QueryBuilder};
use datasync_offline::{
    DeltaTokens, LocalStore, MemoryStore, OfflineError, PullRequest, SyncContext,
};
use datasync_tests::{seed_movies, spawn_service, TestService};
use http::StatusCode;
use serde_json::{json, Value as Json};
use tokio_util::sync::CancellationToken;

fn sync_context(service: &TestService) -> SyncContext<MemoryStore, Client> {
    let client = DatasyncClient::new(service.url.clone(), Client::new().unwrap());
    SyncContext::new(MemoryStore::new(), client)
}

fn local_movie(id: &str, title: &str) -> Json {
    json!({ "id": id, "title": title, "year": 2020, "releaseDate": "2020-06-01" })
}

#[tokio::test]
async fn push_then_pull_converges_two_clients() {
    datasync_tests::init_tracing();
    let service = spawn_service(Vec::new()).await;
    let writer = sync_context(&service);
    let reader = sync_context(&service);
    let cancel = CancellationToken::new();

    // writer works offline, then pushes
    writer
        .add_item("movies", local_movie("m-1", "First"))
        .await
        .unwrap();
    writer
        .add_item("movies", local_movie("m-2", "Second"))
        .await
        .unwrap();
    let pushed = writer.push(&[], &cancel).await.unwrap();
    assert!(pushed.is_successful());
    assert_eq!(pushed.completed, 2);

    // the push reconciled server metadata into the writer's mirror
    let mirrored = writer.store().entity("movies", "m-1").await.unwrap().unwrap();
    assert!(mirrored["version"].is_string());
    assert!(mirrored["updatedAt"].is_string());

    // the reader pulls everything
    let pulled = reader
        .pull(&[PullRequest::table("movies")], &cancel)
        .await
        .unwrap();
    assert!(pulled.is_successful());
    assert_eq!(pulled.additions, 2);
    assert_eq!(
        reader.store().entity("movies", "m-2").await.unwrap().unwrap()["title"],
        "Second"
    );

    // writer edits one entity; If-Match uses the mirrored version
    let mut edited = mirrored.clone();
    edited["title"] = json!("First, revised");
    writer.replace_item("movies", edited).await.unwrap();
    let pushed = writer.push(&[], &cancel).await.unwrap();
    assert!(pushed.is_successful());
    assert_eq!(pushed.completed, 1);

    // an incremental pull carries only the revision
    let pulled = reader
        .pull(&[PullRequest::table("movies")], &cancel)
        .await
        .unwrap();
    assert_eq!(pulled.additions, 0);
    assert_eq!(pulled.replacements, 1);
    assert_eq!(pulled.deletions, 0);
    assert_eq!(
        reader.store().entity("movies", "m-1").await.unwrap().unwrap()["title"],
        "First, revised"
    );

    // writer deletes; the reader sees the tombstone and drops the row
    writer.remove_item("movies", "m-2").await.unwrap();
    let pushed = writer.push(&[], &cancel).await.unwrap();
    assert!(pushed.is_successful());

    let pulled = reader
        .pull(&[PullRequest::table("movies")], &cancel)
        .await
        .unwrap();
    assert_eq!(pulled.deletions, 1);
    assert!(reader.store().entity("movies", "m-2").await.unwrap().is_none());
}

#[tokio::test]
async fn pull_converges_to_server_snapshot_and_is_idempotent() {
    let service = spawn_service(seed_movies(120)).await;
    let ctx = sync_context(&service);
    let cancel = CancellationToken::new();
    let requests = [PullRequest::table("movies")];

    let first = ctx.pull(&requests, &cancel).await.unwrap();
    assert!(first.is_successful());
    assert_eq!(first.additions, 120);

    let local = ctx.store().entities("movies").await.unwrap();
    assert_eq!(local.len(), 120);

    let token_after_first = DeltaTokens::new(ctx.store())
        .value("movies")
        .await
        .unwrap();
    assert!(token_after_first > 0);

    // nothing changed server-side: a second pull applies nothing and
    // leaves the watermark in place
    let second = ctx.pull(&requests, &cancel).await.unwrap();
    assert_eq!(second.additions + second.replacements + second.deletions, 0);
    assert_eq!(
        DeltaTokens::new(ctx.store()).value("movies").await.unwrap(),
        token_after_first
    );
}

#[tokio::test]
async fn filtered_pull_keeps_its_own_watermark() {
    let service = spawn_service(seed_movies(60)).await;
    let ctx = sync_context(&service);
    let cancel = CancellationToken::new();

    let recent = PullRequest::table("movies")
        .with_query(QueryBuilder::new().filter(field("year").ge(2010)).build())
        .with_query_id("recent");
    let pulled = ctx.pull(&[recent], &cancel).await.unwrap();
    assert!(pulled.is_successful());
    assert!(pulled.additions > 0);
    assert!(pulled.additions < 60);

    for (_, item) in ctx.store().entities("movies").await.unwrap() {
        assert!(item["year"].as_i64().unwrap() >= 2010);
    }

    let tokens = DeltaTokens::new(ctx.store());
    assert!(tokens.get("q-movies-recent").await.unwrap().is_some());
    assert!(tokens.get("movies").await.unwrap().is_none());
}

#[tokio::test]
async fn pull_refuses_to_run_over_pending_operations() {
    let service = spawn_service(Vec::new()).await;
    let ctx = sync_context(&service);
    let cancel = CancellationToken::new();

    ctx.add_item("movies", local_movie("m-1", "Unpushed"))
        .await
        .unwrap();

    match ctx.pull(&[PullRequest::table("movies")], &cancel).await {
        Err(OfflineError::OfflinePending(tables)) => {
            assert_eq!(tables, vec!["movies".to_string()]);
        }
        other => panic!("expected OfflinePending, got {:?}", other),
    }

    // after a successful push the same pull runs
    ctx.push(&[], &cancel).await.unwrap();
    assert!(ctx
        .pull(&[PullRequest::table("movies")], &cancel)
        .await
        .unwrap()
        .is_successful());
}

#[tokio::test]
async fn concurrent_writer_conflict_surfaces_server_copy() {
    let service = spawn_service(Vec::new()).await;
    let first = sync_context(&service);
    let second = sync_context(&service);
    let cancel = CancellationToken::new();

    first
        .add_item("movies", local_movie("m-1", "Original"))
        .await
        .unwrap();
    first.push(&[], &cancel).await.unwrap();

    second.pull(&[PullRequest::table("movies")], &cancel).await.unwrap();

    // both clients edit the same entity; the second pushes first
    let mut theirs = second.store().entity("movies", "m-1").await.unwrap().unwrap();
    theirs["title"] = json!("Theirs");
    second.replace_item("movies", theirs).await.unwrap();
    second.push(&[], &cancel).await.unwrap();

    let mut ours = first.store().entity("movies", "m-1").await.unwrap().unwrap();
    ours["title"] = json!("Ours");
    first.replace_item("movies", ours).await.unwrap();
    let pushed = first.push(&[], &cancel).await.unwrap();

    assert!(!pushed.is_successful());
    let failed = pushed.failed_requests.values().next().unwrap();
    assert_eq!(failed.status, Some(StatusCode::PRECONDITION_FAILED));
    assert_eq!(
        failed.server_entity.as_ref().unwrap()["title"],
        json!("Theirs")
    );

    // the losing operation is retained for explicit reconciliation
    let op = first
        .store()
        .operation_for_item("movies", "m-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(op.http_status_code, Some(412));
}

#[tokio::test]
async fn second_sync_on_same_store_fails_fast() {
    let service = spawn_service(seed_movies(5)).await;
    let ctx = std::sync::Arc::new(sync_context(&service));
    let cancel = CancellationToken::new();

    // a pull that never finishes holds the engine lock
    let blocker = {
        let ctx = std::sync::Arc::clone(&ctx);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            ctx.pull(&[PullRequest::table("movies")], &cancel).await
        })
    };

    // give the blocker a chance to take the lock, then contend
    let mut contended = false;
    for _ in 0..50 {
        match ctx.push(&[], &CancellationToken::new()).await {
            Err(OfflineError::SyncInProgress) => {
                contended = true;
                break;
            }
            Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(1)).await,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    let _ = blocker.await;
    // the pull is quick; contention is timing-dependent, but the lock
    // must never deadlock and the store must stay consistent
    if contended {
        assert!(ctx.push(&[], &cancel).await.is_ok());
    }
    assert_eq!(ctx.store().entities("movies").await.unwrap().len(), 5);
}
