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

//! Per-call options bag for table operations.

use datasync_core::{Conditional, ETag, Version};

/// Options recognized by every [`crate::table::RemoteTable`] call.
///
/// `version` together with `if_match`/`if_none_match` selects the
/// conditional header to attach. `error_if_missing` (default true)
/// controls whether a 404/410 surfaces as an error or as an absent
/// result.
#[derive(Debug, Clone, Default)]
pub struct ItemOptions {
    pub version: Option<Version>,
    pub if_match: bool,
    pub if_none_match: bool,
    pub include_deleted: bool,
    if_none_match_any: bool,
    tolerate_missing: bool,
}

impl ItemOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this version for conditional headers instead of the
    /// entity's own.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Send `If-Match` with the known version.
    #[must_use]
    pub const fn if_match(mut self) -> Self {
        self.if_match = true;
        self
    }

    /// Send `If-None-Match` with the known version (conditional GET).
    #[must_use]
    pub const fn if_none_match(mut self) -> Self {
        self.if_none_match = true;
        self
    }

    /// Send `If-None-Match: *` (create only when the id is free).
    #[must_use]
    pub const fn if_none_match_any(mut self) -> Self {
        self.if_none_match_any = true;
        self
    }

    /// Ask the server for the row even when soft-deleted.
    #[must_use]
    pub const fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// Report 404/410 as an absent result instead of an error.
    #[must_use]
    pub const fn tolerate_missing(mut self) -> Self {
        self.tolerate_missing = true;
        self
    }

    #[must_use]
    pub const fn error_if_missing(&self) -> bool {
        !self.tolerate_missing
    }

    /// The conditional headers these options ask for, given the
    /// entity's own version as a fallback.
    #[must_use]
    pub fn conditional(&self, entity_version: Option<&Version>) -> Conditional {
        let version = self.version.as_ref().or(entity_version);
        let mut conditional = Conditional::default();
        if let Some(version) = version {
            if self.if_match {
                conditional.if_match.push(version.etag());
            }
            if self.if_none_match {
                conditional.if_none_match.push(version.etag());
            }
        }
        if self.if_none_match_any {
            conditional.if_none_match.push(ETag::Any);
        }
        conditional
    }
}
