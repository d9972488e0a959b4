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

//! Datasync offline engine
//!
//! Client-side synchronization over a [`LocalStore`]: local mutations
//! are captured into a durable operations queue with collapsing, a
//! push driver replays the queue against the server with optimistic
//! concurrency, and a pull driver replicates server changes back using
//! per-query delta-token watermarks.
//!
//! The [`SyncContext`] owns the whole flow:
//!
//! ```rust,no_run
//! use datasync_client::{reqwest::Client, DatasyncClient};
//! use datasync_offline::{MemoryStore, PullRequest, SyncContext};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DatasyncClient::new(
//!     Url::parse("https://sync.example.com")?,
//!     Client::new()?,
//! );
//! let ctx = SyncContext::new(MemoryStore::new(), client);
//!
//! ctx.add_item("movies", json!({ "id": "id-001", "title": "Dune" })).await?;
//!
//! let cancel = CancellationToken::new();
//! let pushed = ctx.push(&[], &cancel).await?;
//! assert!(pushed.is_successful());
//!
//! let pulled = ctx.pull(&[PullRequest::table("movies")], &cancel).await?;
//! # let _ = pulled;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod delta;
pub mod error;
pub mod operation;
pub mod pull;
pub mod push;
pub mod queue;
pub mod store;

#[doc(inline)]
pub use context::{SyncContext, SyncOptions};
#[doc(inline)]
pub use delta::{token_id, DeltaTokens};
#[doc(inline)]
pub use error::OfflineError;
#[doc(inline)]
pub use operation::{Operation, OperationKind, OperationState};
#[doc(inline)]
pub use pull::{PullRequest, PullResult};
#[doc(inline)]
pub use push::{FailedRequest, PushResult};
#[doc(inline)]
pub use queue::OperationsQueue;
#[doc(inline)]
pub use store::{LocalStore, MemoryStore, StoreBatch, StoreError};
