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

//! Typed operations over one table endpoint.

use crate::error::{ClientError, Conflict};
use crate::options::ItemOptions;
use crate::transport::{ServiceRequest, ServiceResponse, Transport};
use crate::ServiceEndpoint;
use datasync_core::query::Query;
use datasync_core::{Page, SyncEntity};
use futures_core::Stream;
use futures_util::TryStreamExt;
use http::{Method, StatusCode};
use std::marker::PhantomData;
use std::sync::Arc;
use url::Url;

/// Typed CRUD and query access to one remote table.
///
/// Reads and writes round-trip the four metadata fields; conditional
/// headers come from the per-call [`ItemOptions`]. 409/412 answers are
/// surfaced as typed [`Conflict`]s carrying both copies of the entity.
pub struct RemoteTable<T, C> {
    transport: Arc<C>,
    endpoint: ServiceEndpoint,
    path: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T, C> Clone for RemoteTable<T, C> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            endpoint: self.endpoint.clone(),
            path: self.path.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: SyncEntity, C: Transport> RemoteTable<T, C> {
    pub(crate) fn new(transport: Arc<C>, endpoint: ServiceEndpoint, path: String) -> Self {
        Self {
            transport,
            endpoint,
            path,
            _entity: PhantomData,
        }
    }

    /// The collection URL of this table.
    #[must_use]
    pub fn collection_url(&self) -> Url {
        self.endpoint.with_path(&self.path)
    }

    /// The URL of one row of this table.
    #[must_use]
    pub fn item_url(&self, id: &str) -> Url {
        self.endpoint.with_path(&format!("{}/{}", self.path, id))
    }

    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, ClientError<T>> {
        self.transport.send(request).await.map_err(ClientError::from)
    }

    /// POST the entity. The server assigns `id` when absent and always
    /// assigns `updatedAt`/`version`.
    pub async fn add(&self, entity: &T, options: &ItemOptions) -> Result<T, ClientError<T>> {
        let mut request =
            ServiceRequest::new(Method::POST, self.collection_url()).with_json(entity)?;
        write_conditional(&mut request, options, entity.version())?;
        let response = self.send(request).await?;
        self.entity_outcome(response, Some(entity))
    }

    /// GET one row. With `tolerate_missing`, 404/410 map to `Ok(None)`.
    pub async fn get(&self, id: &str, options: &ItemOptions) -> Result<Option<T>, ClientError<T>> {
        let url = if options.include_deleted {
            self.endpoint.with_path_and_query(
                &format!("{}/{}", self.path, id),
                "__includedeleted=true",
            )
        } else {
            self.item_url(id)
        };
        let mut request = ServiceRequest::new(Method::GET, url);
        write_conditional(&mut request, options, None)?;
        let response = self.send(request).await?;
        match response.status {
            StatusCode::NOT_FOUND if !options.error_if_missing() => Ok(None),
            StatusCode::GONE if !options.error_if_missing() => Ok(None),
            _ => self.entity_outcome(response, None).map(Some),
        }
    }

    /// PUT the entity. With `tolerate_missing`, 404/410 map to
    /// `Ok(None)`.
    pub async fn replace(
        &self,
        entity: &T,
        options: &ItemOptions,
    ) -> Result<Option<T>, ClientError<T>> {
        if entity.id().is_empty() {
            return Err(ClientError::BadRequest(Some(
                "entity must carry an id to be replaced".to_string(),
            )));
        }
        let mut request =
            ServiceRequest::new(Method::PUT, self.item_url(entity.id())).with_json(entity)?;
        write_conditional(&mut request, options, entity.version())?;
        let response = self.send(request).await?;
        match response.status {
            StatusCode::NOT_FOUND if !options.error_if_missing() => Ok(None),
            StatusCode::GONE if !options.error_if_missing() => Ok(None),
            _ => self.entity_outcome(response, Some(entity)).map(Some),
        }
    }

    /// DELETE one row. Returns whether the row was removed; with
    /// `tolerate_missing`, 404/410 map to `Ok(false)`.
    pub async fn remove(&self, id: &str, options: &ItemOptions) -> Result<bool, ClientError<T>> {
        let mut request = ServiceRequest::new(Method::DELETE, self.item_url(id));
        write_conditional(&mut request, options, None)?;
        let response = self.send(request).await?;
        match response.status {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND if !options.error_if_missing() => Ok(false),
            StatusCode::GONE if !options.error_if_missing() => Ok(false),
            _ => Err(self.failure(response, None)),
        }
    }

    /// Total number of rows the filter matches, without transferring
    /// them.
    pub async fn count(&self, query: Query) -> Result<usize, ClientError<T>> {
        Ok(self.long_count(query).await? as usize)
    }

    /// [`RemoteTable::count`] without the narrowing conversion.
    pub async fn long_count(&self, mut query: Query) -> Result<u64, ClientError<T>> {
        query.top = Some(0);
        query.count = true;
        let page = self.get_page(&query.to_encoded_query_string()).await?;
        page.count
            .ok_or(ClientError::Unexpected(StatusCode::OK))
    }

    /// GET one page for a raw query string.
    pub async fn get_page(&self, query_string: &str) -> Result<Page<T>, ClientError<T>> {
        let url = self
            .endpoint
            .with_path_and_query(&self.path, query_string);
        let request = ServiceRequest::new(Method::GET, url);
        let response = self.send(request).await?;
        if response.is_success() {
            response.json().map_err(ClientError::from)
        } else {
            Err(self.failure(response, None))
        }
    }

    /// Lazily enumerate every item the query matches, following
    /// `nextLink` continuations page by page.
    pub fn query(&self, query: Query) -> impl Stream<Item = Result<T, ClientError<T>>> + '_ {
        let first = query.to_encoded_query_string();
        futures_util::stream::try_unfold(Some(first), move |state| async move {
            let query_string = match state {
                Some(query_string) => query_string,
                None => return Ok::<_, ClientError<T>>(None),
            };
            let page = self.get_page(&query_string).await?;
            let items = futures_util::stream::iter(page.items.into_iter().map(Ok));
            Ok(Some((items, page.next_link)))
        })
        .try_flatten()
    }

    fn entity_outcome(
        &self,
        response: ServiceResponse,
        submitted: Option<&T>,
    ) -> Result<T, ClientError<T>> {
        if response.is_success() {
            let mut entity: T = response.json().map_err(ClientError::from)?;
            if entity.version().is_none() {
                if let Some(version) = response.version() {
                    entity.system_mut().version = Some(version);
                }
            }
            return Ok(entity);
        }
        Err(self.failure(response, submitted))
    }

    fn failure(&self, response: ServiceResponse, submitted: Option<&T>) -> ClientError<T> {
        match response.status {
            StatusCode::BAD_REQUEST => {
                let message = serde_json::from_slice::<serde_json::Value>(&response.body)
                    .ok()
                    .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(String::from));
                ClientError::BadRequest(message)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ClientError::Unauthorized(response.status)
            }
            StatusCode::NOT_FOUND => ClientError::NotFound,
            StatusCode::GONE => ClientError::Gone,
            StatusCode::NOT_MODIFIED => ClientError::NotModified,
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                // the body is the server's current copy; never require it
                let server_entity: Option<T> =
                    if response.has_body() { response.json().ok() } else { None };
                let server_version = response.version().or_else(|| {
                    server_entity
                        .as_ref()
                        .and_then(|e| e.version().cloned())
                });
                ClientError::Conflict(Box::new(Conflict {
                    status: response.status,
                    client_entity: submitted.cloned(),
                    server_entity,
                    server_version,
                }))
            }
            other => ClientError::Unexpected(other),
        }
    }
}

fn write_conditional<T>(
    request: &mut ServiceRequest,
    options: &ItemOptions,
    entity_version: Option<&datasync_core::Version>,
) -> Result<(), ClientError<T>> {
    let conditional = options.conditional(entity_version);
    conditional
        .write_headers(&mut request.headers)
        .map_err(|e| ClientError::BadRequest(Some(e.to_string())))
}
