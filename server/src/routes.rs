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

//! HTTP surface
//!
//! [`DatasyncService`] is a registry of named tables; [`DatasyncService::into_router`]
//! produces the axum router serving
//! `/<basePath>/<table>` and `/<basePath>/<table>/<id>` with the
//! documented media type and headers. Controllers are registered behind
//! an object-safe shim so one router serves tables of different
//! repository and access-control types.

use crate::access::AccessControl;
use crate::controller::TableController;
use crate::error::TableError;
use crate::evaluator::PageLimits;
use crate::repository::Repository;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use datasync_core::{Conditional, Page, TableRow};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Service-level configuration.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Leading path segment for every table route.
    pub base_path: String,
    /// Paging defaults applied to each registered controller.
    pub limits: PageLimits,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            base_path: "/tables".to_string(),
            limits: PageLimits::default(),
        }
    }
}

/// Registry of table controllers served under one base path.
pub struct DatasyncService {
    options: ServiceOptions,
    tables: HashMap<String, Box<dyn TableHandler>>,
}

impl DatasyncService {
    #[must_use]
    pub fn new(options: ServiceOptions) -> Self {
        Self {
            options,
            tables: HashMap::new(),
        }
    }

    /// Register a table under `name`; the service paging limits apply.
    #[must_use]
    pub fn register<R: Repository, A: AccessControl>(
        mut self,
        name: impl Into<String>,
        controller: TableController<R, A>,
    ) -> Self {
        let controller = controller.with_limits(self.options.limits);
        self.tables.insert(name.into(), Box::new(controller));
        self
    }

    fn table(&self, name: &str) -> Result<&dyn TableHandler, TableError> {
        self.tables
            .get(name)
            .map(Box::as_ref)
            .ok_or(TableError::NotFound)
    }

    /// Build the axum router for the registered tables.
    #[must_use]
    pub fn into_router(self) -> Router {
        let base = self.options.base_path.clone();
        let service = Arc::new(self);
        let routes = Router::new()
            .route("/{table}", get(query_table).post(create_item))
            .route(
                "/{table}/{id}",
                get(read_item).put(replace_item).delete(delete_item),
            )
            .with_state(service);
        Router::new().nest(&base, routes)
    }
}

/// Object-safe controller shim for the route table.
trait TableHandler: Send + Sync {
    fn handle_query<'a>(
        &'a self,
        query_string: &'a str,
    ) -> BoxFuture<'a, Result<Page<JsonValue>, TableError>>;

    fn handle_read<'a>(
        &'a self,
        id: &'a str,
        conditional: &'a Conditional,
        include_deleted: bool,
    ) -> BoxFuture<'a, Result<TableRow, TableError>>;

    fn handle_create<'a>(
        &'a self,
        body: JsonValue,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<TableRow, TableError>>;

    fn handle_replace<'a>(
        &'a self,
        id: &'a str,
        body: JsonValue,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<TableRow, TableError>>;

    fn handle_delete<'a>(
        &'a self,
        id: &'a str,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<(), TableError>>;
}

impl<R: Repository, A: AccessControl> TableHandler for TableController<R, A> {
    fn handle_query<'a>(
        &'a self,
        query_string: &'a str,
    ) -> BoxFuture<'a, Result<Page<JsonValue>, TableError>> {
        Box::pin(self.query(query_string))
    }

    fn handle_read<'a>(
        &'a self,
        id: &'a str,
        conditional: &'a Conditional,
        include_deleted: bool,
    ) -> BoxFuture<'a, Result<TableRow, TableError>> {
        Box::pin(self.read(id, conditional, include_deleted))
    }

    fn handle_create<'a>(
        &'a self,
        body: JsonValue,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<TableRow, TableError>> {
        Box::pin(self.create(body, conditional))
    }

    fn handle_replace<'a>(
        &'a self,
        id: &'a str,
        body: JsonValue,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<TableRow, TableError>> {
        Box::pin(self.replace(id, body, conditional))
    }

    fn handle_delete<'a>(
        &'a self,
        id: &'a str,
        conditional: &'a Conditional,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        Box::pin(self.delete(id, conditional))
    }
}

async fn query_table(
    State(service): State<Arc<DatasyncService>>,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    tracing::debug!(table = %table, query = ?query, "query request");
    let result = async {
        let handler = service.table(&table)?;
        handler.handle_query(query.as_deref().unwrap_or("")).await
    }
    .await;
    match result {
        Ok(page) => Json(page).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn read_item(
    State(service): State<Arc<DatasyncService>>,
    Path((table, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    tracing::debug!(table = %table, id = %id, "read request");
    let result = async {
        let handler = service.table(&table)?;
        let conditional = parse_conditional(&headers)?;
        let include_deleted = include_deleted(query.as_deref());
        handler.handle_read(&id, &conditional, include_deleted).await
    }
    .await;
    match result {
        Ok(row) => entity_response(StatusCode::OK, &row, None),
        Err(e) => e.into_response(),
    }
}

async fn create_item(
    State(service): State<Arc<DatasyncService>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    tracing::debug!(table = %table, "create request");
    let result = async {
        let handler = service.table(&table)?;
        let conditional = parse_conditional(&headers)?;
        handler.handle_create(body, &conditional).await
    }
    .await;
    match result {
        Ok(row) => {
            let location = format!(
                "{}/{}/{}",
                service.options.base_path, table, row.system.id
            );
            entity_response(StatusCode::CREATED, &row, Some(location))
        }
        Err(e) => e.into_response(),
    }
}

async fn replace_item(
    State(service): State<Arc<DatasyncService>>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    tracing::debug!(table = %table, id = %id, "replace request");
    let result = async {
        let handler = service.table(&table)?;
        let conditional = parse_conditional(&headers)?;
        handler.handle_replace(&id, body, &conditional).await
    }
    .await;
    match result {
        Ok(row) => entity_response(StatusCode::OK, &row, None),
        Err(e) => e.into_response(),
    }
}

async fn delete_item(
    State(service): State<Arc<DatasyncService>>,
    Path((table, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    tracing::debug!(table = %table, id = %id, "delete request");
    let result = async {
        let handler = service.table(&table)?;
        let conditional = parse_conditional(&headers)?;
        handler.handle_delete(&id, &conditional).await
    }
    .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

fn parse_conditional(headers: &HeaderMap) -> Result<Conditional, TableError> {
    Conditional::from_headers(headers).map_err(|e| TableError::BadRequest(e.to_string()))
}

fn include_deleted(query: Option<&str>) -> bool {
    query.map_or(false, |qs| {
        url::form_urlencoded::parse(qs.as_bytes())
            .any(|(key, value)| key == "__includedeleted" && value == "true")
    })
}

fn entity_response(status: StatusCode, row: &TableRow, location: Option<String>) -> Response {
    let mut response = (status, Json(row)).into_response();
    if let Some(version) = &row.system.version {
        if let Ok(value) = HeaderValue::from_str(&version.etag().to_string()) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    if let Some(location) = location {
        if let Ok(value) = HeaderValue::from_str(&location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
    }
    response
}
