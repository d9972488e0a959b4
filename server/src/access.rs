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

//! Access-control hook
//!
//! The controller consults an [`AccessControl`] before every operation,
//! appends its data view to every query, and fires the commit hooks
//! around mutations. The default implementation permits everything and
//! imposes no view.

use datasync_core::ast::Expr;
use datasync_core::TableRow;
use std::future::Future;

/// The table operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Read,
    Create,
    Replace,
    Delete,
}

/// Authorization outcome; the split selects the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    /// The caller could not be identified. 401.
    Unauthenticated,
    /// The caller is known but not permitted. 403.
    Forbidden,
}

/// Per-table authorization, data scoping and commit hooks.
pub trait AccessControl: Send + Sync + 'static {
    /// Authorize one operation; `entity` is the target row where one
    /// exists (reads and mutations of a specific row).
    fn authorize(
        &self,
        op: Operation,
        entity: Option<&TableRow>,
    ) -> impl Future<Output = AuthDecision> + Send {
        let _ = (op, entity);
        async { AuthDecision::Allow }
    }

    /// Predicate appended with `and` to every query's filter.
    fn data_view(&self) -> Option<Expr> {
        None
    }

    /// Called with the mutable row right before it is persisted.
    fn pre_commit(
        &self,
        op: Operation,
        entity: &mut TableRow,
    ) -> impl Future<Output = ()> + Send {
        let _ = (op, entity);
        async {}
    }

    /// Called with the stored row after a successful mutation.
    fn post_commit(&self, op: Operation, entity: &TableRow) -> impl Future<Output = ()> + Send {
        let _ = (op, entity);
        async {}
    }
}

/// Permit-everything access control.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {}
