//! Resource collections on top of the document store
//!
//! A [`Resource`] describes one persisted record type: its schema, unique
//! indexes, default read scope, relations and lifecycle steps. A
//! [`Collection`] runs those steps explicitly around every store call and
//! implements the [`Repository`] capability interface consumed by the
//! handler factory.

pub mod collection;
pub mod schema;
pub mod traits;

use serde_json::Value;
use std::future::Future;

use crate::auth::password::PasswordHasher;
use crate::error::Result;
use crate::store::{Document, DocumentStore, FieldError, Filter};

pub use collection::{populate, Collection};
pub use schema::{FieldKind, FieldSpec, Schema, ValidationScope};
pub use traits::Repository;

/// How a relation finds its related documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// The local field holds one id or a list of ids
    Reference { local: &'static str },
    /// Related documents hold this document's id in `foreign`
    Virtual { foreign: &'static str },
}

/// A named relation to another collection, loaded on demand
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Field the related data is written to
    pub path: &'static str,
    /// Collection holding the related documents
    pub target: &'static str,
    pub link: Link,
    /// Fields of the related documents to keep
    pub select: &'static [&'static str],
    /// Reference relations loaded on each related document
    pub nested: &'static [Relation],
}

/// What a lifecycle step knows about the write in progress
#[derive(Debug)]
pub struct SaveContext<'a> {
    pub is_new: bool,
    /// Fields written by this operation
    pub modified: &'a [String],
    pub hasher: &'a PasswordHasher,
}

impl SaveContext<'_> {
    pub fn is_modified(&self, field: &str) -> bool {
        self.modified.iter().any(|m| m == field)
    }
}

/// A persisted record type
pub trait Resource: Send + Sync + 'static {
    /// Store collection name, also used in URLs
    const COLLECTION: &'static str;
    /// Human readable entity name for logs
    const ENTITY: &'static str;
    const FIELDS: &'static [FieldSpec];
    /// Unique indexes, each over one or more fields
    const UNIQUE: &'static [&'static [&'static str]] = &[];
    /// Relations loaded on every read
    const RELATIONS: &'static [Relation] = &[];

    fn schema() -> Schema {
        Schema::new(Self::FIELDS)
    }

    /// Rules spanning several fields, run after the per-field rules
    fn validate(_doc: &Document, _ctx: &SaveContext<'_>) -> Vec<FieldError> {
        Vec::new()
    }

    /// Runs on every validated write just before it reaches the store
    fn before_save(_doc: &mut Document, _ctx: &SaveContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Predicate applied to every read, update and delete
    fn default_scope() -> Filter {
        Filter::new()
    }

    /// Runs after a document was written or removed
    fn after_write(
        _store: &dyn DocumentStore,
        _doc: &Document,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Add derived fields to an outgoing document
    fn decorate(_doc: &mut Document) {}
}

/// Convenience accessor for string fields
pub fn str_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}
