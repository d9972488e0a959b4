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

//! Datasync HTTP client
//!
//! Typed access to datasync table endpoints: conditional CRUD, counted
//! queries and lazy page enumeration, over a pluggable [`Transport`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use datasync_client::reqwest::Client;
//! use datasync_client::{DatasyncClient, ItemOptions};
//! use datasync_core::{SyncEntity, SystemProperties};
//! use serde::{Deserialize, Serialize};
//! use url::Url;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Movie {
//!     #[serde(flatten)]
//!     system: SystemProperties,
//!     title: String,
//! }
//!
//! impl SyncEntity for Movie {
//!     const TABLE: &'static str = "movies";
//!     fn system(&self) -> &SystemProperties { &self.system }
//!     fn system_mut(&mut self) -> &mut SystemProperties { &mut self.system }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Url::parse("https://sync.example.com")?;
//! let client = DatasyncClient::new(endpoint, Client::new()?);
//! let movies = client.table::<Movie>();
//! let stored = movies
//!     .add(
//!         &Movie { system: SystemProperties::default(), title: "Dune".into() },
//!         &ItemOptions::default(),
//!     )
//!     .await?;
//! # let _ = stored;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod options;
pub mod table;
pub mod transport;

#[cfg(feature = "reqwest")]
pub mod reqwest;

#[doc(inline)]
pub use error::{ClientError, Conflict};
#[doc(inline)]
pub use options::ItemOptions;
#[doc(inline)]
pub use table::RemoteTable;
#[doc(inline)]
pub use transport::{
    HeaderInjector, RequestInterceptor, ServiceRequest, ServiceResponse, Transport, TransportError,
};

use datasync_core::SyncEntity;
use std::sync::Arc;
use url::Url;

/// A tagged type representing a datasync service endpoint URL.
///
/// Provides convenient conversion methods to build request URLs from
/// table paths.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    base_url: Url,
}

impl ServiceEndpoint {
    /// Create a new `ServiceEndpoint` from a base URL
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Convert a path to a full endpoint URL
    #[must_use]
    pub fn with_path(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    /// Convert a path to a full endpoint URL with query parameters
    #[must_use]
    pub fn with_path_and_query(&self, path: &str, query: &str) -> Url {
        let mut url = self.with_path(path);
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(query));
        }
        url
    }
}

impl From<Url> for ServiceEndpoint {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

impl From<&ServiceEndpoint> for Url {
    fn from(endpoint: &ServiceEndpoint) -> Self {
        endpoint.base_url.clone()
    }
}

/// Entry point pairing a transport with a service endpoint.
pub struct DatasyncClient<C> {
    transport: Arc<C>,
    endpoint: ServiceEndpoint,
}

impl<C: Transport> DatasyncClient<C> {
    pub fn new(endpoint: Url, transport: C) -> Self {
        Self {
            transport: Arc::new(transport),
            endpoint: ServiceEndpoint::from(endpoint),
        }
    }

    /// The table for an entity type, served at `/tables/<T::TABLE>`.
    #[must_use]
    pub fn table<T: SyncEntity>(&self) -> RemoteTable<T, C> {
        self.table_named(T::TABLE)
    }

    /// A table under a caller-chosen name.
    #[must_use]
    pub fn table_named<T: SyncEntity>(&self, name: &str) -> RemoteTable<T, C> {
        RemoteTable::new(
            Arc::clone(&self.transport),
            self.endpoint.clone(),
            format!("/tables/{}", name),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn transport(&self) -> Arc<C> {
        Arc::clone(&self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builds_table_urls() {
        let endpoint = ServiceEndpoint::new(Url::parse("https://sync.example.com").unwrap());
        assert_eq!(
            endpoint.with_path("/tables/movies").as_str(),
            "https://sync.example.com/tables/movies"
        );
        assert_eq!(
            endpoint
                .with_path_and_query("/tables/movies", "$top=5")
                .as_str(),
            "https://sync.example.com/tables/movies?$top=5"
        );
    }
}
