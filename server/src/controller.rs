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

//! Table controller
//!
//! Protocol logic of one table endpoint, independent of the HTTP
//! framework: authorization, precondition evaluation (RFC 7232 order),
//! soft deletion, conflict bodies and paging. The axum layer in
//! [`crate::routes`] maps the outcomes onto status codes and headers.
//!
//! Every delete is a soft delete: the row stays in the repository with
//! `deleted=true` and fresh metadata so incremental pulls can replicate
//! the removal.

use crate::access::{AccessControl, AuthDecision, Operation};
use crate::error::TableError;
use crate::evaluator::{execute, EvalError, PageLimits};
use crate::repository::{Repository, RepositoryError};
use datasync_core::query::{ParseError, Query};
use datasync_core::{validate_id, Conditional, Disposition, Page, TableRow};
use serde_json::Value as Json;
use uuid::Uuid;

/// Protocol engine for one table.
pub struct TableController<R, A> {
    repository: R,
    access: A,
    limits: PageLimits,
}

impl<R: Repository, A: AccessControl> TableController<R, A> {
    pub fn new(repository: R, access: A) -> Self {
        Self {
            repository,
            access,
            limits: PageLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    async fn authorize(
        &self,
        op: Operation,
        entity: Option<&TableRow>,
    ) -> Result<(), TableError> {
        match self.access.authorize(op, entity).await {
            AuthDecision::Allow => Ok(()),
            AuthDecision::Unauthenticated => Err(TableError::Unauthenticated),
            AuthDecision::Forbidden => Err(TableError::Forbidden),
        }
    }

    /// GET on the collection.
    pub async fn query(&self, query_string: &str) -> Result<Page<Json>, TableError> {
        self.authorize(Operation::Query, None).await?;
        let query = Query::parse(query_string).map_err(bad_query)?;
        let rows = self.repository.queryable().await.map_err(store_error)?;
        let view = self.access.data_view();
        let page = execute(&query, &rows, view.as_ref(), &self.limits).map_err(bad_eval)?;
        tracing::debug!(
            matched = page.items.len(),
            count = ?page.count,
            "query evaluated"
        );
        Ok(page)
    }

    /// GET on a single row.
    pub async fn read(
        &self,
        id: &str,
        conditional: &Conditional,
        include_deleted: bool,
    ) -> Result<TableRow, TableError> {
        let row = self.fetch(id).await?;
        self.authorize(Operation::Read, Some(&row)).await?;
        if row.system.deleted && !include_deleted {
            return Err(TableError::Gone);
        }
        match conditional.evaluate(row.system.version.as_ref(), row.system.updated_at, true) {
            Disposition::Proceed => Ok(row),
            Disposition::NotModified => Err(TableError::NotModified),
            Disposition::Failed => Err(TableError::PreconditionFailed(Some(Box::new(row)))),
        }
    }

    /// POST on the collection.
    pub async fn create(
        &self,
        body: Json,
        conditional: &Conditional,
    ) -> Result<TableRow, TableError> {
        let mut row = TableRow::from_json(body).map_err(bad_body)?;
        if row.system.id.is_empty() {
            row.system.id = Uuid::new_v4().to_string();
        } else {
            validate_id(&row.system.id).map_err(bad_body)?;
        }
        self.authorize(Operation::Create, Some(&row)).await?;

        if let Some(current) = self.repository.read(&row.system.id).await.map_err(store_error)? {
            // an existing id conflicts even when the row is soft-deleted
            return Err(TableError::Conflict(Box::new(current)));
        }
        match conditional.evaluate(None, None, false) {
            Disposition::Proceed => {}
            // If-Match against a row that does not exist
            Disposition::NotModified | Disposition::Failed => {
                return Err(TableError::PreconditionFailed(None));
            }
        }

        self.access.pre_commit(Operation::Create, &mut row).await;
        let stored = match self.repository.create(row).await {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict(current)) => {
                return Err(TableError::Conflict(current))
            }
            Err(e) => return Err(store_error(e)),
        };
        self.access.post_commit(Operation::Create, &stored).await;
        tracing::info!(id = %stored.system.id, "entity created");
        Ok(stored)
    }

    /// PUT on a single row.
    pub async fn replace(
        &self,
        id: &str,
        body: Json,
        conditional: &Conditional,
    ) -> Result<TableRow, TableError> {
        let mut row = TableRow::from_json(body).map_err(bad_body)?;
        if row.system.id != id {
            return Err(TableError::BadRequest(
                "entity id must match the request path".to_string(),
            ));
        }
        let current = self.fetch(id).await?;
        self.authorize(Operation::Replace, Some(&current)).await?;
        if current.system.deleted {
            return Err(TableError::Gone);
        }
        self.check_write_preconditions(conditional, &current)?;

        row.system.deleted = false;
        self.access.pre_commit(Operation::Replace, &mut row).await;
        let expected = current.system.version.clone();
        let stored = match self.repository.replace(row, expected.as_ref()).await {
            Ok(stored) => stored,
            Err(RepositoryError::PreconditionFailed(current)) => {
                return Err(TableError::PreconditionFailed(Some(current)))
            }
            Err(RepositoryError::NotFound) => return Err(TableError::NotFound),
            Err(e) => return Err(store_error(e)),
        };
        self.access.post_commit(Operation::Replace, &stored).await;
        tracing::info!(id = %stored.system.id, "entity replaced");
        Ok(stored)
    }

    /// DELETE on a single row: marks it deleted and restamps metadata.
    pub async fn delete(&self, id: &str, conditional: &Conditional) -> Result<(), TableError> {
        let current = self.fetch(id).await?;
        self.authorize(Operation::Delete, Some(&current)).await?;
        if current.system.deleted {
            return Err(TableError::Gone);
        }
        self.check_write_preconditions(conditional, &current)?;

        let mut tombstone = current.clone();
        tombstone.system.deleted = true;
        self.access
            .pre_commit(Operation::Delete, &mut tombstone)
            .await;
        let expected = current.system.version.clone();
        let stored = match self.repository.replace(tombstone, expected.as_ref()).await {
            Ok(stored) => stored,
            Err(RepositoryError::PreconditionFailed(current)) => {
                return Err(TableError::PreconditionFailed(Some(current)))
            }
            Err(RepositoryError::NotFound) => return Err(TableError::NotFound),
            Err(e) => return Err(store_error(e)),
        };
        self.access.post_commit(Operation::Delete, &stored).await;
        tracing::info!(id = %stored.system.id, "entity soft-deleted");
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<TableRow, TableError> {
        validate_id(id).map_err(bad_body)?;
        self.repository
            .read(id)
            .await
            .map_err(store_error)?
            .ok_or(TableError::NotFound)
    }

    fn check_write_preconditions(
        &self,
        conditional: &Conditional,
        current: &TableRow,
    ) -> Result<(), TableError> {
        match conditional.evaluate(
            current.system.version.as_ref(),
            current.system.updated_at,
            false,
        ) {
            Disposition::Proceed => Ok(()),
            Disposition::NotModified | Disposition::Failed => {
                Err(TableError::PreconditionFailed(Some(Box::new(current.clone()))))
            }
        }
    }
}

fn bad_query(e: ParseError) -> TableError {
    TableError::BadRequest(e.to_string())
}

fn bad_body(e: impl std::fmt::Display) -> TableError {
    TableError::BadRequest(e.to_string())
}

fn bad_eval(e: EvalError) -> TableError {
    match e {
        EvalError::Internal(msg) => TableError::Repository(msg),
        other => TableError::BadRequest(other.to_string()),
    }
}

fn store_error(e: RepositoryError) -> TableError {
    TableError::Repository(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AllowAll;
    use crate::repository::InMemoryRepository;
    use datasync_core::ETag;
    use serde_json::json;

    fn controller() -> TableController<InMemoryRepository, AllowAll> {
        TableController::new(InMemoryRepository::new(), AllowAll)
    }

    fn movie(id: &str) -> Json {
        json!({ "id": id, "title": "Movie", "year": 2005 })
    }

    #[tokio::test]
    async fn create_then_read_round_trip() {
        let controller = controller();
        let created = controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();
        assert!(created.system.version.is_some());

        let read = controller
            .read("id-001", &Conditional::default(), false)
            .await
            .unwrap();
        assert_eq!(read.system.version, created.system.version);
    }

    #[tokio::test]
    async fn create_assigns_id_when_absent() {
        let controller = controller();
        let created = controller
            .create(json!({"title": "anonymous"}), &Conditional::default())
            .await
            .unwrap();
        assert!(datasync_core::validate_id(&created.system.id).is_ok());
    }

    #[tokio::test]
    async fn create_rejects_invalid_id() {
        let controller = controller();
        let result = controller
            .create(json!({"id": " bad id "}), &Conditional::default())
            .await;
        assert!(matches!(result, Err(TableError::BadRequest(_))));
    }

    #[tokio::test]
    async fn create_conflicts_with_409_and_current_body() {
        let controller = controller();
        controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();
        match controller.create(movie("id-001"), &Conditional::default()).await {
            Err(TableError::Conflict(current)) => assert_eq!(current.system.id, "id-001"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn conditional_get_returns_not_modified() {
        let controller = controller();
        let created = controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();

        let cond = Conditional {
            if_none_match: vec![created.system.version.as_ref().unwrap().etag()],
            ..Conditional::default()
        };
        assert!(matches!(
            controller.read("id-001", &cond, false).await,
            Err(TableError::NotModified)
        ));
    }

    #[tokio::test]
    async fn stale_if_match_replace_fails_with_current_entity() {
        let controller = controller();
        let v1 = controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();
        let v2 = controller
            .replace("id-001", movie("id-001"), &Conditional::default())
            .await
            .unwrap();

        let cond = Conditional {
            if_match: vec![v1.system.version.as_ref().unwrap().etag()],
            ..Conditional::default()
        };
        match controller.replace("id-001", movie("id-001"), &cond).await {
            Err(TableError::PreconditionFailed(Some(current))) => {
                assert_eq!(current.system.version, v2.system.version);
            }
            other => panic!("expected 412, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn if_match_star_succeeds_on_existing_row() {
        let controller = controller();
        controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();
        let cond = Conditional {
            if_match: vec![ETag::Any],
            ..Conditional::default()
        };
        assert!(controller.replace("id-001", movie("id-001"), &cond).await.is_ok());
    }

    #[tokio::test]
    async fn delete_is_soft_and_read_returns_gone() {
        let controller = controller();
        let created = controller
            .create(movie("id-002"), &Conditional::default())
            .await
            .unwrap();
        controller
            .delete("id-002", &Conditional::default())
            .await
            .unwrap();

        assert!(matches!(
            controller.read("id-002", &Conditional::default(), false).await,
            Err(TableError::Gone)
        ));

        // visible again with __includedeleted, with bumped metadata
        let row = controller
            .read("id-002", &Conditional::default(), true)
            .await
            .unwrap();
        assert!(row.system.deleted);
        assert_ne!(row.system.version, created.system.version);
        assert!(row.system.updated_at >= created.system.updated_at);
    }

    #[tokio::test]
    async fn replace_and_delete_of_deleted_row_return_gone() {
        let controller = controller();
        controller
            .create(movie("id-002"), &Conditional::default())
            .await
            .unwrap();
        controller
            .delete("id-002", &Conditional::default())
            .await
            .unwrap();

        assert!(matches!(
            controller
                .replace("id-002", movie("id-002"), &Conditional::default())
                .await,
            Err(TableError::Gone)
        ));
        assert!(matches!(
            controller.delete("id-002", &Conditional::default()).await,
            Err(TableError::Gone)
        ));
    }

    #[tokio::test]
    async fn add_conflicts_even_when_row_is_soft_deleted() {
        let controller = controller();
        controller
            .create(movie("id-002"), &Conditional::default())
            .await
            .unwrap();
        controller
            .delete("id-002", &Conditional::default())
            .await
            .unwrap();

        match controller.create(movie("id-002"), &Conditional::default()).await {
            Err(TableError::Conflict(current)) => assert!(current.system.deleted),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn replace_requires_matching_path_id() {
        let controller = controller();
        controller
            .create(movie("id-001"), &Conditional::default())
            .await
            .unwrap();
        assert!(matches!(
            controller
                .replace("id-001", movie("id-xxx"), &Conditional::default())
                .await,
            Err(TableError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn soft_deleted_rows_visible_to_includedeleted_query() {
        let controller = controller();
        controller
            .create(movie("id-002"), &Conditional::default())
            .await
            .unwrap();
        controller
            .delete("id-002", &Conditional::default())
            .await
            .unwrap();

        let page = controller.query("$filter=id eq 'id-002'").await.unwrap();
        assert!(page.items.is_empty());

        let page = controller
            .query("__includedeleted=true&$filter=id eq 'id-002'")
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0]["deleted"], json!(true));
    }

    #[tokio::test]
    async fn query_rejects_malformed_odata() {
        let controller = controller();
        assert!(matches!(
            controller.query("$filter=year ge").await,
            Err(TableError::BadRequest(_))
        ));
        assert!(matches!(
            controller.query("$top=-5").await,
            Err(TableError::BadRequest(_))
        ));
    }
}
