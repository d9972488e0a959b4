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

//! Datasync wire protocol core
//!
//! Shared model for the datasync table protocol: the entity metadata
//! fields and their invariants, the opaque concurrency version and its
//! ETag form, the RFC 7232 conditional-request model, the OData query
//! subset (expression tree, parser, fluent builder) and the page shape.
//!
//! The server ([`datasync-server`]) parses queries and evaluates
//! preconditions with these types; the client ([`datasync-client`])
//! builds queries and conditional requests from the same types, which is
//! what keeps the two ends of the wire in agreement.
//!
//! [`datasync-server`]: https://docs.rs/datasync-server
//! [`datasync-client`]: https://docs.rs/datasync-client

pub mod condition;
pub mod edm;
pub mod entity;
pub mod paging;
pub mod query;
pub mod version;

#[doc(inline)]
pub use condition::{Conditional, Disposition};
#[doc(inline)]
pub use edm::{EdmDate, EdmDateTimeOffset, EdmTimeOfDay};
#[doc(inline)]
pub use entity::{validate_id, SyncEntity, SystemProperties, TableRow};
#[doc(inline)]
pub use paging::Page;
#[doc(inline)]
pub use query::{ast, Query};
#[doc(inline)]
pub use version::{ETag, Version};
