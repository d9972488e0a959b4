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

//! Wire-level scenarios against a live in-process service.

use datasync_tests::{seed_movies, spawn_service};
use serde_json::{json, Value as Json};

fn item_url(base: &url::Url, id: &str) -> String {
    format!("{}tables/movies/{}", base, id)
}

fn table_url(base: &url::Url) -> String {
    format!("{}tables/movies", base)
}

async fn fetch_etag(client: &reqwest::Client, url: &str) -> String {
    let response = client.get(url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    response
        .headers()
        .get("etag")
        .expect("entity responses carry an ETag")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn conditional_get_hit_returns_304_with_empty_body() {
    let service = spawn_service(seed_movies(3)).await;
    let client = reqwest::Client::new();
    let url = item_url(&service.url, "id-001");

    let etag = fetch_etag(&client, &url).await;

    let response = client
        .get(&url)
        .header("If-None-Match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 304);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_replace_returns_412_with_current_entity_and_etag() {
    let service = spawn_service(seed_movies(3)).await;
    let client = reqwest::Client::new();
    let url = item_url(&service.url, "id-001");

    let v1 = fetch_etag(&client, &url).await;

    // someone else replaces the row, bumping the version to v2
    let body = json!({"id": "id-001", "title": "Renamed", "year": 2001, "releaseDate": "2001-06-01"});
    let response = client
        .put(&url)
        .header("If-Match", &v1)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let v2 = response.headers().get("etag").unwrap().to_str().unwrap().to_string();
    assert_ne!(v1, v2);

    // the holder of v1 loses with 412, body carries the current row
    let response = client
        .put(&url)
        .header("If-Match", &v1)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 412);
    assert_eq!(
        response.headers().get("etag").unwrap().to_str().unwrap(),
        v2
    );
    let current: Json = response.json().await.unwrap();
    assert_eq!(current["title"], "Renamed");
    assert_eq!(format!("\"{}\"", current["version"].as_str().unwrap()), v2);
}

#[tokio::test]
async fn soft_delete_visibility() {
    let service = spawn_service(seed_movies(3)).await;
    let client = reqwest::Client::new();
    let url = item_url(&service.url, "id-002");

    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 410);

    let response = client
        .get(format!(
            "{}?__includedeleted=true&$filter=id eq 'id-002'",
            table_url(&service.url)
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let page: Json = response.json().await.unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["deleted"], json!(true));

    // deleting again reports the tombstone
    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 410);

    // and replacing it does too
    let response = client
        .put(&url)
        .json(&json!({"id": "id-002", "title": "Back", "year": 2000, "releaseDate": "2000-01-01"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 410);
}

#[tokio::test]
async fn paging_walks_248_rows_in_three_pages() {
    let service = spawn_service(seed_movies(248)).await;
    let client = reqwest::Client::new();

    let response = client.get(table_url(&service.url)).send().await.unwrap();
    let page: Json = response.json().await.unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 100);
    assert_eq!(page["nextLink"], json!("$skip=100"));

    let response = client
        .get(format!("{}?{}", table_url(&service.url), "$skip=100"))
        .send()
        .await
        .unwrap();
    let page: Json = response.json().await.unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 100);
    assert_eq!(page["nextLink"], json!("$skip=200"));

    let response = client
        .get(format!("{}?{}", table_url(&service.url), "$skip=200"))
        .send()
        .await
        .unwrap();
    let page: Json = response.json().await.unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 48);
    assert!(page.get("nextLink").is_none());
}

#[tokio::test]
async fn filter_and_ordering_return_five_sorted_rows() {
    let service = spawn_service(seed_movies(248)).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "{}?$filter=year ge 2000&$orderby=releaseDate asc&$top=5",
            table_url(&service.url)
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let page: Json = response.json().await.unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);

    let mut last = String::new();
    for item in items {
        assert!(item["year"].as_i64().unwrap() >= 2000);
        let date = item["releaseDate"].as_str().unwrap().to_string();
        assert!(date >= last, "releaseDate not ascending");
        last = date;
    }
}

#[tokio::test]
async fn top_zero_and_overcap_boundaries() {
    let service = spawn_service(seed_movies(248)).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}?$top=0&$count=true", table_url(&service.url)))
        .send()
        .await
        .unwrap();
    let page: Json = response.json().await.unwrap();
    assert!(page["items"].as_array().unwrap().is_empty());
    assert_eq!(page["count"], json!(248));

    let response = client
        .get(format!("{}?$skip=500", table_url(&service.url)))
        .send()
        .await
        .unwrap();
    let page: Json = response.json().await.unwrap();
    assert!(page["items"].as_array().unwrap().is_empty());
    assert!(page.get("nextLink").is_none());

    let response = client
        .get(format!("{}?$top=100001", table_url(&service.url)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .get(format!("{}?$top=-1", table_url(&service.url)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn create_returns_location_and_conflicts_on_reuse() {
    let service = spawn_service(seed_movies(1)).await;
    let client = reqwest::Client::new();
    let body = json!({"id": "fresh-1", "title": "New", "year": 2024, "releaseDate": "2024-01-01"});

    let response = client
        .post(table_url(&service.url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    assert!(response.headers().get("etag").is_some());
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        "/tables/movies/fresh-1"
    );
    let created: Json = response.json().await.unwrap();
    assert!(created["updatedAt"].is_string());
    assert!(created["version"].is_string());

    let response = client
        .post(table_url(&service.url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let conflict: Json = response.json().await.unwrap();
    assert_eq!(conflict["id"], json!("fresh-1"));

    // invalid ids are rejected outright
    let response = client
        .post(table_url(&service.url))
        .json(&json!({"id": "bad id!", "title": "x", "year": 1, "releaseDate": "2000-01-01"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn mutations_always_change_version_and_advance_updated_at() {
    let service = spawn_service(seed_movies(1)).await;
    let client = reqwest::Client::new();
    let url = item_url(&service.url, "id-000");

    let first: Json = client.get(&url).send().await.unwrap().json().await.unwrap();
    let body = json!({"id": "id-000", "title": "Edited", "year": 1999, "releaseDate": "1999-01-01"});
    let second: Json = client
        .put(&url)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_ne!(first["version"], second["version"]);
    let parse = |v: &Json| {
        time::OffsetDateTime::parse(
            v.as_str().unwrap(),
            &time::format_description::well_known::Rfc3339,
        )
        .unwrap()
    };
    assert!(parse(&second["updatedAt"]) >= parse(&first["updatedAt"]));
}
