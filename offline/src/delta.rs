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

//! Delta-token watermarks
//!
//! A token records the highest `updatedAt` (ms since epoch) a pull has
//! fully applied, keyed per table and pull filter:
//! - no query id → the table name itself,
//! - empty query id → `q-<table>-<md5 of the query string>`,
//! - explicit query id → `q-<table>-<query id>`.
//!
//! Tokens live in the `datasync_delta_tokens` store table and are never
//! deleted by the engine; [`DeltaTokens::remove`] exists for hosts that
//! reset replication state deliberately.

use crate::store::{LocalStore, StoreBatch, StoreError};
use md5::{Digest, Md5};

/// Compute the token id for a pull request.
#[must_use]
pub fn token_id(table: &str, query_id: Option<&str>, query_string: &str) -> String {
    match query_id {
        None => table.to_string(),
        Some("") => {
            let mut hasher = Md5::new();
            hasher.update(query_string.as_bytes());
            let digest = hasher.finalize();
            let mut hex = String::with_capacity(digest.len() * 2);
            for byte in digest {
                hex.push_str(&format!("{:02x}", byte));
            }
            format!("q-{}-{}", table, hex)
        }
        Some(query_id) => format!("q-{}-{}", table, query_id),
    }
}

/// Store-backed access to delta tokens.
pub struct DeltaTokens<'a, S> {
    store: &'a S,
}

impl<'a, S: LocalStore> DeltaTokens<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The stored watermark, 0 when the query never completed a pull.
    pub async fn value(&self, id: &str) -> Result<i64, StoreError> {
        Ok(self.store.delta_token(id).await?.unwrap_or(0))
    }

    pub async fn get(&self, id: &str) -> Result<Option<i64>, StoreError> {
        self.store.delta_token(id).await
    }

    pub async fn set(&self, id: &str, value: i64) -> Result<(), StoreError> {
        let mut batch = StoreBatch::new();
        batch.set_token(id, value);
        self.store.commit(batch).await
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut batch = StoreBatch::new();
        batch.remove_token(id);
        self.store.commit(batch).await
    }
}
