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

//! Expectation-queue mock transport
//!
//! [`MockTransport`] implements the client [`Transport`] against a
//! queue of expected requests with canned answers: each incoming
//! request must match the front of the queue, mismatches and
//! exhaustion fail loudly. This drives client and offline-engine tests
//! without a socket.
//!
//! ```rust
//! use datasync_mock::{expect::{json_response, ExpectedRequest, MockResponse}, MockTransport};
//! use http::{Method, StatusCode};
//! use serde_json::json;
//!
//! let transport = MockTransport::new();
//! transport.expect(
//!     ExpectedRequest::new(Method::GET, "/tables/movies/id-001"),
//!     MockResponse::Respond(json_response(
//!         StatusCode::OK,
//!         &json!({ "id": "id-001", "version": "djE=", "deleted": false }),
//!     )),
//! );
//! ```

pub mod expect;

#[doc(inline)]
pub use expect::{Expect, ExpectedRequest, MockResponse};

use datasync_client::{ServiceRequest, ServiceResponse, Transport, TransportError};
use expect::decoded_query;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::Mutex;
use std::sync::PoisonError;

#[derive(Debug)]
pub enum Error {
    MutexLock(String),
    NothingIsExpected(String),
    UnexpectedRequest {
        actual: String,
        expected: ExpectedRequest,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MutexLock(err) => write!(f, "lock error: {}", err),
            Self::NothingIsExpected(actual) => {
                write!(f, "nothing is expected but received: {}", actual)
            }
            Self::UnexpectedRequest { actual, expected } => {
                write!(f, "unexpected request: {}; expected: {:?}", actual, expected)
            }
        }
    }
}

impl StdError for Error {}

impl Error {
    pub fn mutex_lock<T>(err: PoisonError<T>) -> Self {
        Self::MutexLock(err.to_string())
    }
}

fn describe(request: &ServiceRequest) -> String {
    let query = decoded_query(request);
    let body = request
        .body
        .as_deref()
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default();
    if query.is_empty() {
        format!("{} {} {}", request.method, request.url.path(), body)
    } else {
        format!(
            "{} {}?{} {}",
            request.method,
            request.url.path(),
            query,
            body
        )
    }
}

/// Transport answering from a queue of expectations.
#[derive(Default)]
pub struct MockTransport {
    expect: Mutex<VecDeque<Expect>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one expectation; requests consume the queue in order.
    pub fn expect(&self, request: ExpectedRequest, response: MockResponse) {
        let expect: &mut VecDeque<Expect> = &mut self.expect.lock().expect("not poisoned");
        expect.push_back(Expect::new(request, response));
    }

    /// Number of queued expectations not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.expect.lock().expect("not poisoned").len()
    }

    /// Panic unless every expectation was consumed.
    pub fn verify(&self) {
        let expect = self.expect.lock().expect("not poisoned");
        if !expect.is_empty() {
            panic!(
                "{} expectation(s) not consumed; next: {:?}",
                expect.len(),
                expect.front().map(|e| &e.request)
            );
        }
    }

    pub fn debug_expect(&self) {
        let expect: &VecDeque<Expect> = &self.expect.lock().expect("not poisoned");
        println!("Expectations (total: {})", expect.len());
        for v in expect {
            println!("{:#?}", v.request);
        }
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        let expect = self
            .expect
            .lock()
            .map_err(Error::mutex_lock)
            .map_err(boxed)?
            .pop_front()
            .ok_or_else(|| boxed(Error::NothingIsExpected(describe(&request))))?;
        if !expect.request.matches(&request) {
            return Err(boxed(Error::UnexpectedRequest {
                actual: describe(&request),
                expected: expect.request,
            }));
        }
        match expect.response {
            MockResponse::Respond(response) => Ok(response),
            MockResponse::Fail(reason) => Err(TransportError::Other(reason.into())),
        }
    }
}

fn boxed(err: Error) -> TransportError {
    TransportError::Other(Box::new(err))
}
