//! Typed collection running the resource pipeline around the store
//!
//! Writes go through: sanitize, defaults, normalize, validate, resource
//! rules, `before_save`, store, `after_write`. Reads merge the default scope
//! into the query, load relations and strip hidden fields.

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::schema::ValidationScope;
use super::{Link, Relation, Repository, Resource, SaveContext};
use crate::auth::password::PasswordHasher;
use crate::error::Result;
use crate::store::{
    document_id, parse_id, Document, DocumentStore, FieldError, Filter, FilterCondition,
    Projection, ReadQuery, StoreError, StoreOperation, ID_FIELD,
};

/// All documents of one resource type
pub struct Collection<R> {
    store: Arc<dyn DocumentStore>,
    hasher: PasswordHasher,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hasher: self.hasher.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> Collection<R> {
    pub fn new(store: Arc<dyn DocumentStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            _resource: PhantomData,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Register the resource's unique indexes with the store
    pub async fn ensure_indexes(&self) -> Result<()> {
        for fields in R::UNIQUE {
            self.store.ensure_unique(R::COLLECTION, fields).await?;
        }
        Ok(())
    }

    fn scoped(filter: Filter) -> Filter {
        R::default_scope().merge(filter)
    }

    fn validation_error(operation: StoreOperation, errors: Vec<FieldError>) -> StoreError {
        StoreError::validation(operation, errors).with_collection(R::COLLECTION)
    }

    /// Strip hidden fields and add derived ones
    fn present(doc: Document) -> Document {
        let mut doc = R::schema().hide(doc);
        R::decorate(&mut doc);
        doc
    }

    /// Stored document by id, ignoring hidden-field stripping
    async fn find_raw(&self, id: &str) -> Result<Option<Document>> {
        let doc = self
            .store
            .find_by_id(R::COLLECTION, id)
            .await
            .map_err(|e| e.with_collection(R::COLLECTION))?;
        Ok(doc.filter(|d| R::default_scope().matches(d)))
    }

    /// First visible document matching `filter`, hidden fields included
    ///
    /// Only for internal use such as credential checks; never return the
    /// result to a client without passing it through [`Collection::present_one`].
    pub async fn find_one_with_secrets(&self, filter: Filter) -> Result<Option<Document>> {
        let query = ReadQuery {
            filter: Self::scoped(filter),
            limit: Some(1),
            ..ReadQuery::default()
        };
        Ok(self.store.find(R::COLLECTION, &query).await?.into_iter().next())
    }

    /// Visible document by id with hidden fields included
    pub async fn find_by_id_with_secrets(&self, id: &str) -> Result<Option<Document>> {
        self.find_raw(id).await
    }

    /// Prepare an internal document for a client
    pub fn present_one(&self, doc: Document) -> Document {
        Self::present(doc)
    }

    pub async fn find_one(&self, filter: Filter) -> Result<Option<Document>> {
        let Some(mut doc) = self.find_one_with_secrets(filter).await? else {
            return Ok(None);
        };
        populate(self.store(), &mut doc, R::RELATIONS).await?;
        Ok(Some(Self::present(doc)))
    }

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        Ok(self.store.count(R::COLLECTION, &Self::scoped(filter)).await?)
    }

    /// Persist a full document previously loaded from this collection
    ///
    /// Every field is validated, and fields that differ from the stored
    /// version count as modified for the lifecycle steps.
    pub async fn save(&self, doc: Document) -> Result<Document> {
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::invalid_id(StoreOperation::Replace, ID_FIELD, ""))?
            .to_string();
        let stored = self.find_raw(&id).await?.unwrap_or_default();

        let schema = R::schema();
        let mut doc = doc;
        let mut errors = schema.normalize(&mut doc);
        let modified: Vec<String> = doc
            .iter()
            .filter(|(key, value)| stored.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();

        let ctx = SaveContext {
            is_new: false,
            modified: &modified,
            hasher: &self.hasher,
        };
        errors.extend(schema.validate(&doc, ValidationScope::Full));
        errors.extend(R::validate(&doc, &ctx));
        if !errors.is_empty() {
            return Err(Self::validation_error(StoreOperation::Replace, errors).into());
        }

        R::before_save(&mut doc, &ctx)?;
        let saved = self
            .store
            .replace(R::COLLECTION, &id, doc)
            .await?
            .ok_or_else(|| StoreError::invalid_id(StoreOperation::Replace, ID_FIELD, &id))?;
        R::after_write(self.store(), &saved).await?;
        Ok(Self::present(saved))
    }

    /// Write fields without validation or lifecycle steps
    pub async fn patch_unchecked(&self, id: &str, patch: Document) -> Result<Option<Document>> {
        let Some(mut doc) = self.find_raw(id).await? else {
            return Ok(None);
        };
        doc.extend(patch);
        Ok(self.store.replace(R::COLLECTION, id, doc).await?)
    }

    /// Remove fields without validation or lifecycle steps
    pub async fn unset_unchecked(&self, id: &str, fields: &[&str]) -> Result<Option<Document>> {
        let Some(mut doc) = self.find_raw(id).await? else {
            return Ok(None);
        };
        for field in fields {
            doc.remove(*field);
        }
        Ok(self.store.replace(R::COLLECTION, id, doc).await?)
    }

    /// Insert development data: defaults and `before_save` run, validation does not
    pub async fn import(&self, mut doc: Document) -> Result<Document> {
        let schema = R::schema();
        schema.apply_defaults(&mut doc);
        let errors = schema.normalize(&mut doc);
        if !errors.is_empty() {
            return Err(Self::validation_error(StoreOperation::Insert, errors).into());
        }

        let modified: Vec<String> = doc.keys().cloned().collect();
        let ctx = SaveContext {
            is_new: true,
            modified: &modified,
            hasher: &self.hasher,
        };
        R::before_save(&mut doc, &ctx)?;
        let saved = self.store.insert(R::COLLECTION, doc).await?;
        R::after_write(self.store(), &saved).await?;
        Ok(saved)
    }

    /// Remove every document of this resource
    pub async fn clear(&self) -> Result<u64> {
        Ok(self.store.clear(R::COLLECTION).await?)
    }
}

impl<R: Resource> Repository for Collection<R> {
    fn entity(&self) -> &'static str {
        R::ENTITY
    }

    async fn find_by_id(&self, id: &str, populate_with: &[Relation]) -> Result<Option<Document>> {
        let Some(mut doc) = self.find_raw(id).await? else {
            return Ok(None);
        };
        populate(self.store(), &mut doc, R::RELATIONS).await?;
        populate(self.store(), &mut doc, populate_with).await?;
        Ok(Some(Self::present(doc)))
    }

    async fn find_all(&self, mut query: ReadQuery) -> Result<Vec<Document>> {
        query.filter = Self::scoped(std::mem::take(&mut query.filter));
        let docs = self.store.find(R::COLLECTION, &query).await?;

        let mut presented = Vec::with_capacity(docs.len());
        for mut doc in docs {
            populate(self.store(), &mut doc, R::RELATIONS).await?;
            presented.push(Self::present(doc));
        }
        Ok(presented)
    }

    async fn create(&self, data: Document) -> Result<Document> {
        let schema = R::schema();
        let mut doc = schema.sanitize(data);
        schema.apply_defaults(&mut doc);

        let mut errors = schema.normalize(&mut doc);
        let modified: Vec<String> = doc.keys().cloned().collect();
        let ctx = SaveContext {
            is_new: true,
            modified: &modified,
            hasher: &self.hasher,
        };
        errors.extend(schema.validate(&doc, ValidationScope::Full));
        errors.extend(R::validate(&doc, &ctx));
        if !errors.is_empty() {
            return Err(Self::validation_error(StoreOperation::Insert, errors).into());
        }

        R::before_save(&mut doc, &ctx)?;
        let saved = self.store.insert(R::COLLECTION, doc).await?;
        R::after_write(self.store(), &saved).await?;

        tracing::debug!(entity = R::ENTITY, id = ?document_id(&saved), "document created");
        Ok(Self::present(saved))
    }

    async fn update(&self, id: &str, patch: Document) -> Result<Option<Document>> {
        let Some(existing) = self.find_raw(id).await? else {
            return Ok(None);
        };

        let schema = R::schema();
        let mut patch = schema.sanitize(patch);
        let mut errors = schema.normalize(&mut patch);
        let modified: Vec<String> = patch.keys().cloned().collect();
        errors.extend(schema.validate(&patch, ValidationScope::Fields(&modified)));

        let mut doc = existing;
        doc.extend(patch);
        let ctx = SaveContext {
            is_new: false,
            modified: &modified,
            hasher: &self.hasher,
        };
        errors.extend(R::validate(&doc, &ctx));
        if !errors.is_empty() {
            return Err(Self::validation_error(StoreOperation::Replace, errors).into());
        }

        R::before_save(&mut doc, &ctx)?;
        let Some(saved) = self.store.replace(R::COLLECTION, id, doc).await? else {
            return Ok(None);
        };
        R::after_write(self.store(), &saved).await?;

        let mut saved = saved;
        populate(self.store(), &mut saved, R::RELATIONS).await?;
        Ok(Some(Self::present(saved)))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        if self.find_raw(id).await?.is_none() {
            return Ok(false);
        }
        match self.store.delete(R::COLLECTION, id).await? {
            Some(removed) => {
                R::after_write(self.store(), &removed).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Load relations onto `doc`, including one level of nested references
pub async fn populate(
    store: &dyn DocumentStore,
    doc: &mut Document,
    relations: &[Relation],
) -> Result<()> {
    for relation in relations {
        match relation.link {
            Link::Reference { .. } => populate_reference(store, doc, relation).await?,
            Link::Virtual { foreign } => {
                let Some(id) = document_id(doc).map(str::to_string) else {
                    continue;
                };
                let query = ReadQuery {
                    filter: Filter::new().and(FilterCondition::eq(foreign, id)),
                    projection: selection(relation),
                    ..ReadQuery::default()
                };
                let mut related = store.find(relation.target, &query).await?;
                for item in &mut related {
                    for nested in relation.nested {
                        populate_reference(store, item, nested).await?;
                    }
                }
                let related = related.into_iter().map(Value::Object).collect();
                doc.insert(relation.path.to_string(), Value::Array(related));
            }
        }
    }
    Ok(())
}

async fn populate_reference(
    store: &dyn DocumentStore,
    doc: &mut Document,
    relation: &Relation,
) -> Result<()> {
    let Link::Reference { local } = relation.link else {
        return Ok(());
    };
    let populated = match doc.get(local) {
        Some(Value::String(id)) => fetch_selected(store, relation, id)
            .await?
            .map_or(Value::Null, Value::Object),
        Some(Value::Array(ids)) => {
            let mut found = Vec::with_capacity(ids.len());
            for id in ids.iter().filter_map(Value::as_str) {
                if let Some(related) = fetch_selected(store, relation, id).await? {
                    found.push(Value::Object(related));
                }
            }
            Value::Array(found)
        }
        _ => return Ok(()),
    };
    doc.insert(relation.path.to_string(), populated);
    Ok(())
}

async fn fetch_selected(
    store: &dyn DocumentStore,
    relation: &Relation,
    id: &str,
) -> Result<Option<Document>> {
    if parse_id(StoreOperation::FindById, id).is_err() {
        return Ok(None);
    }
    let doc = store.find_by_id(relation.target, id).await?;
    Ok(doc.map(|d| selection(relation).apply(d)))
}

fn selection(relation: &Relation) -> Projection {
    Projection::Include(relation.select.iter().map(ToString::to_string).collect())
}
