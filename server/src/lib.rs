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

//! Datasync table service
//!
//! Server half of the datasync protocol: a conditional-CRUD table
//! endpoint with soft deletion, OData-subset queries and paging,
//! designed to be pulled incrementally by offline clients.
//!
//! A service is a set of named tables, each backed by a
//! [`Repository`] and guarded by an [`access::AccessControl`] hook:
//!
//! ```rust,no_run
//! use datasync_server::access::AllowAll;
//! use datasync_server::{DatasyncService, InMemoryRepository, ServiceOptions, TableController};
//!
//! let service = DatasyncService::new(ServiceOptions::default())
//!     .register("movies", TableController::new(InMemoryRepository::new(), AllowAll));
//! let router = service.into_router();
//! # let _ = router;
//! ```

pub mod access;
pub mod controller;
pub mod error;
pub mod evaluator;
pub mod repository;
pub mod routes;

#[doc(inline)]
pub use controller::TableController;
#[doc(inline)]
pub use error::TableError;
#[doc(inline)]
pub use evaluator::PageLimits;
#[doc(inline)]
pub use repository::{InMemoryRepository, Repository, RepositoryError};
#[doc(inline)]
pub use routes::{DatasyncService, ServiceOptions};
