//! Resource Handler Factory
//!
//! Generic CRUD operation templates over any [`Repository`]. Route handlers
//! extract the path, payload and identity, then delegate here:
//!
//! ```rust,ignore
//! async fn get_tour(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
//!     state.factory::<Tour>().get_one(&id, &[TOUR_REVIEWS]).await
//! }
//! ```

use axum::http::StatusCode;

use super::query::{compose, QuerySpec};
use super::response::{ItemResponse, ListResponse, NoContent};
use crate::error::{Error, Result};
use crate::repository::{Relation, Repository};
use crate::store::{Document, Filter};

/// CRUD operations for one resource
#[derive(Debug, Clone)]
pub struct HandlerFactory<R> {
    repository: R,
}

impl<R: Repository> HandlerFactory<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    fn not_found(&self, id: &str) -> Error {
        Error::NotFound(format!(
            "Can not find a {} with ID: {id}",
            self.repository.entity().to_lowercase()
        ))
    }

    /// Validate and persist a new record, answering `201 Created`
    pub async fn create_one(&self, payload: Document) -> Result<ItemResponse<Document>> {
        let created = self.repository.create(payload).await?;
        Ok(ItemResponse::new(created).with_status(StatusCode::CREATED))
    }

    /// Fetch one record, eager-loading `populate`
    pub async fn get_one(&self, id: &str, populate: &[Relation]) -> Result<ItemResponse<Document>> {
        let doc = self
            .repository
            .find_by_id(id, populate)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        Ok(ItemResponse::new(doc))
    }

    /// Apply a partial update, keeping only `allowed` fields when given
    pub async fn update_one(
        &self,
        id: &str,
        payload: Document,
        allowed: Option<&[&str]>,
    ) -> Result<ItemResponse<Document>> {
        let payload = match allowed {
            Some(fields) => filter_body(payload, fields),
            None => payload,
        };
        let updated = self
            .repository
            .update(id, payload)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        Ok(ItemResponse::new(updated))
    }

    pub async fn delete_one(&self, id: &str) -> Result<NoContent> {
        if self.repository.delete(id).await? {
            Ok(NoContent)
        } else {
            Err(self.not_found(id))
        }
    }

    /// List records matching `scope` and the client's query string
    pub async fn get_all(&self, scope: Filter, spec: &QuerySpec) -> Result<ListResponse<Document>> {
        let query = compose(scope, spec);
        let docs = self.repository.find_all(query).await?;
        tracing::debug!(
            entity = self.repository.entity(),
            results = docs.len(),
            "list query served"
        );
        Ok(ListResponse::new(docs))
    }
}

/// Keep only the `allowed` keys of a request body
pub fn filter_body(payload: Document, allowed: &[&str]) -> Document {
    payload
        .into_iter()
        .filter(|(key, _)| allowed.contains(&key.as_str()))
        .collect()
}
