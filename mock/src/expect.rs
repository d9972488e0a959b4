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

//! Request expectations and canned answers.

use datasync_client::{ServiceRequest, ServiceResponse};
use http::{HeaderValue, Method, StatusCode};
use serde_json::Value as Json;

/// What the next request must look like. `query`, `body` and `headers`
/// are only checked when set.
#[derive(Debug, Clone)]
pub struct ExpectedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Json>,
    pub headers: Vec<(String, String)>,
}

impl ExpectedRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Require this exact (decoded) query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Require this exact JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }

    /// Require a header with this exact value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn matches(&self, request: &ServiceRequest) -> bool {
        if request.method != self.method || request.url.path() != self.path {
            return false;
        }
        if let Some(expected) = &self.query {
            let actual = decoded_query(request);
            if actual != *expected {
                return false;
            }
        }
        if let Some(expected) = &self.body {
            let actual: Option<Json> = request
                .body
                .as_deref()
                .and_then(|bytes| serde_json::from_slice(bytes).ok());
            if actual.as_ref() != Some(expected) {
                return false;
            }
        }
        for (name, value) in &self.headers {
            let matched = request
                .headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .map_or(false, |actual| actual == value);
            if !matched {
                return false;
            }
        }
        true
    }
}

/// Percent-decoded query string of a request, pairs re-joined with `&`.
pub(crate) fn decoded_query(request: &ServiceRequest) -> String {
    request
        .url
        .query()
        .map(|qs| {
            url::form_urlencoded::parse(qs.as_bytes())
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        })
        .unwrap_or_default()
}

/// The canned answer for one expected request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Answer with this response.
    Respond(ServiceResponse),
    /// Fail at the transport level (connection refused, timeout, ...).
    Fail(String),
}

/// One expectation: a request matcher and its answer.
#[derive(Debug, Clone)]
pub struct Expect {
    pub request: ExpectedRequest,
    pub response: MockResponse,
}

impl Expect {
    #[must_use]
    pub fn new(request: ExpectedRequest, response: MockResponse) -> Self {
        Self { request, response }
    }
}

/// A JSON response with the given status, plus an `ETag` header when
/// the body carries a version.
#[must_use]
pub fn json_response(status: StatusCode, body: &Json) -> ServiceResponse {
    let mut response = ServiceResponse::new(status);
    response.body = serde_json::to_vec(body).expect("json serializable");
    response.headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(version) = body.get("version").and_then(Json::as_str) {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", version)) {
            response.headers.insert(http::header::ETAG, value);
        }
    }
    response
}

/// An empty response with the given status.
#[must_use]
pub fn empty_response(status: StatusCode) -> ServiceResponse {
    ServiceResponse::new(status)
}
