//! Repository capability interface
//!
//! The handler factory is generic over this trait, so any resource
//! collection (or a test double) can be plugged into the CRUD templates.
//! Methods use RPITIT rather than `async_trait` because the factory is
//! monomorphised per resource and never needs a trait object.

use std::future::Future;

use super::Relation;
use crate::error::Result;
use crate::store::{Document, ReadQuery};

/// CRUD operations over one resource collection
///
/// Every method applies the resource's default scope, so records hidden by
/// the scope behave as if they do not exist.
pub trait Repository: Send + Sync {
    /// Entity name used in log fields
    fn entity(&self) -> &'static str;

    /// Fetch one document, loading `populate` relations onto it
    fn find_by_id(
        &self,
        id: &str,
        populate: &[Relation],
    ) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Run a composed read query
    fn find_all(&self, query: ReadQuery) -> impl Future<Output = Result<Vec<Document>>> + Send;

    /// Validate and insert a new document, returning it as stored
    fn create(&self, data: Document) -> impl Future<Output = Result<Document>> + Send;

    /// Validate and apply a partial update, returning the full updated document
    ///
    /// Returns `Ok(None)` when no document with `id` is visible.
    fn update(
        &self,
        id: &str,
        patch: Document,
    ) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Remove a document; `Ok(false)` when nothing matched
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
}
