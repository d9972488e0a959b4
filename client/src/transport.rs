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

//! Transport abstraction
//!
//! A [`Transport`] carries one whole HTTP exchange: the table layer
//! builds a [`ServiceRequest`], the transport returns the raw
//! [`ServiceResponse`] including non-success statuses, and the table
//! layer interprets status, ETag and body. Interceptors and mocks see
//! complete requests because there is a single `send` entry point.

use datasync_core::{ETag, Version};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::Future;
use std::str::FromStr;
use url::Url;

/// One outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ServiceRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach a JSON body and content type.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self, TransportError> {
        let bytes = serde_json::to_vec(body).map_err(TransportError::Serialize)?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        self.body = Some(bytes);
        Ok(self)
    }
}

/// One complete HTTP response, success or not.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// The strong entity tag from the `ETag` header, when present and
    /// well formed.
    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.headers
            .get(http::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .and_then(|text| ETag::from_str(text).ok())
    }

    /// The version carried by the `ETag` header.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        match self.etag() {
            Some(ETag::Tag(b64)) => Version::from_base64(&b64).ok(),
            _ => None,
        }
    }

    /// Deserialize the body, reporting the JSON path on failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        let mut deserializer = serde_json::Deserializer::from_slice(&self.body);
        serde_path_to_error::deserialize(&mut deserializer).map_err(TransportError::Decode)
    }
}

/// Asynchronous HTTP transport.
pub trait Transport: Send + Sync {
    /// Perform one exchange. Non-2xx statuses are returned as
    /// responses; only transport-level failures (connect, timeout,
    /// protocol) are errors.
    fn send(
        &self,
        request: ServiceRequest,
    ) -> impl Future<Output = Result<ServiceResponse, TransportError>> + Send;
}

/// Inspect or amend a request before it is sent. Interceptors run in
/// registration order.
pub trait RequestInterceptor: Send + Sync {
    fn before_send(&self, request: &mut ServiceRequest) -> Result<(), TransportError>;
}

/// Interceptor injecting a static authorization (or any other) header
/// into every request.
pub struct HeaderInjector {
    name: http::header::HeaderName,
    value: http::HeaderValue,
}

impl HeaderInjector {
    #[must_use]
    pub fn new(name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        Self { name, value }
    }

    /// Convenience for `Authorization: Bearer <token>`.
    pub fn bearer(token: &str) -> Result<Self, TransportError> {
        let value = http::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::Interceptor("token is not a valid header value".into()))?;
        Ok(Self::new(http::header::AUTHORIZATION, value))
    }
}

impl RequestInterceptor for HeaderInjector {
    fn before_send(&self, request: &mut ServiceRequest) -> Result<(), TransportError> {
        request.headers.insert(self.name.clone(), self.value.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub enum TransportError {
    #[cfg(feature = "reqwest")]
    Http(reqwest::Error),
    Serialize(serde_json::Error),
    Decode(serde_path_to_error::Error<serde_json::Error>),
    Interceptor(String),
    Other(Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Whether the failure is worth retrying later (network-level).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "reqwest")]
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Other(_) => true,
            _ => false,
        }
    }
}

#[allow(clippy::absolute_paths)]
impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            #[cfg(feature = "reqwest")]
            Self::Http(e) => write!(f, "HTTP transport error: {}", e),
            Self::Serialize(e) => write!(f, "JSON serialization error: {}", e),
            Self::Decode(e) => write!(
                f,
                "JSON deserialization error at path {}: {}",
                e.path(),
                e.inner()
            ),
            Self::Interceptor(msg) => write!(f, "request interceptor error: {}", msg),
            Self::Other(e) => write!(f, "transport error: {}", e),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "reqwest")]
            Self::Http(e) => Some(e),
            Self::Serialize(e) => Some(e),
            Self::Decode(e) => Some(e.inner()),
            Self::Other(e) => Some(e.as_ref()),
            Self::Interceptor(_) => None,
        }
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}
