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

//! Shared fixtures for the end-to-end test suite: a movie entity, a
//! deterministic seed set and an in-process service bound to an
//! ephemeral port.

use datasync_core::{SyncEntity, SystemProperties, TableRow};
use datasync_server::access::AllowAll;
use datasync_server::{DatasyncService, InMemoryRepository, ServiceOptions, TableController};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// The entity every scenario synchronizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(flatten)]
    pub system: SystemProperties,
    pub title: String,
    pub year: i64,
    pub release_date: String,
}

impl SyncEntity for Movie {
    const TABLE: &'static str = "movies";

    fn system(&self) -> &SystemProperties {
        &self.system
    }

    fn system_mut(&mut self) -> &mut SystemProperties {
        &mut self.system
    }
}

impl Movie {
    pub fn new(id: &str, title: &str, year: i64, release_date: &str) -> Self {
        Self {
            system: SystemProperties {
                id: id.to_string(),
                ..SystemProperties::default()
            },
            title: title.to_string(),
            year,
            release_date: release_date.to_string(),
        }
    }
}

/// `count` movies with ids `id-000..`, years cycling 1980..2019 and a
/// June release date in the same year.
pub fn seed_movies(count: usize) -> Vec<TableRow> {
    (0..count)
        .map(|i| {
            let year = 1980 + (i as i64 % 40);
            TableRow::from_json(json!({
                "id": format!("id-{:03}", i),
                "title": format!("Movie {:03}", i),
                "year": year,
                "releaseDate": format!("{:04}-06-{:02}", year, 1 + (i % 28)),
            }))
            .expect("seed rows are valid")
        })
        .collect()
}

/// Route engine logs to the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A running in-process service.
pub struct TestService {
    pub url: Url,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve a `movies` table seeded with `rows` on an ephemeral port.
pub async fn spawn_service(rows: Vec<TableRow>) -> TestService {
    let repository = InMemoryRepository::new();
    repository.seed(rows);
    let service = DatasyncService::new(ServiceOptions::default())
        .register("movies", TableController::new(repository, AllowAll));
    let router = service.into_router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port available");
    let addr = listener.local_addr().expect("listener has an address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server runs");
    });

    TestService {
        url: Url::parse(&format!("http://{}", addr)).expect("valid server url"),
        handle,
    }
}
