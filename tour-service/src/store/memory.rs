//! In-process document store
//!
//! Collections are insertion-ordered vectors behind a [`DashMap`], so sorts
//! are stable and equal keys keep the order documents were written in.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::query::compare_documents;
use super::{
    document_id, new_id, now_timestamp, parse_id, Document, DocumentStore, Filter, ReadQuery,
    StoreError, StoreOperation, StoreResult, CREATED_AT_FIELD, ID_FIELD, VERSION_FIELD,
};

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
    unique_indexes: DashMap<String, Vec<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `doc` when it collides with another document on a unique index
    fn check_unique(
        &self,
        operation: StoreOperation,
        collection: &str,
        existing: &[Document],
        doc: &Document,
    ) -> StoreResult<()> {
        let Some(indexes) = self.unique_indexes.get(collection) else {
            return Ok(());
        };
        let own_id = document_id(doc);

        for fields in indexes.iter() {
            let key: Option<Vec<&Value>> = fields
                .iter()
                .map(|f| doc.get(f).filter(|v| !v.is_null()))
                .collect();
            let Some(key) = key else {
                continue;
            };

            let collides = existing.iter().any(|other| {
                document_id(other) != own_id
                    && fields
                        .iter()
                        .zip(&key)
                        .all(|(field, value)| other.get(field) == Some(*value))
            });

            if collides {
                let value = match key[0] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(StoreError::duplicate_key(operation, &fields[0], value)
                    .with_collection(collection));
            }
        }
        Ok(())
    }
}

fn next_version(doc: &Document) -> i64 {
    doc.get(VERSION_FIELD).and_then(Value::as_i64).map_or(0, |v| v + 1)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_unique(&self, collection: &str, fields: &[&str]) -> StoreResult<()> {
        let index: Vec<String> = fields.iter().map(ToString::to_string).collect();
        let mut indexes = self.unique_indexes.entry(collection.to_string()).or_default();
        if !indexes.contains(&index) {
            indexes.push(index);
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        match document_id(&doc) {
            Some(id) => {
                parse_id(StoreOperation::Insert, id).map_err(|e| e.with_collection(collection))?;
            }
            None => {
                doc.insert(ID_FIELD.to_string(), Value::String(new_id()));
            }
        }
        doc.insert(VERSION_FIELD.to_string(), Value::from(0));
        doc.entry(CREATED_AT_FIELD.to_string())
            .or_insert_with(|| Value::String(now_timestamp()));

        let mut docs = self.collections.entry(collection.to_string()).or_default();
        self.check_unique(StoreOperation::Insert, collection, &docs, &doc)?;
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        parse_id(StoreOperation::FindById, id).map_err(|e| e.with_collection(collection))?;
        Ok(self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| document_id(doc) == Some(id))
                .cloned()
        }))
    }

    async fn find(&self, collection: &str, query: &ReadQuery) -> StoreResult<Vec<Document>> {
        let mut matched: Vec<Document> = match self.collections.get(collection) {
            Some(docs) => docs
                .iter()
                .filter(|doc| query.filter.matches(doc))
                .cloned()
                .collect(),
            None => return Ok(Vec::new()),
        };

        if !query.sort.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| query.projection.apply(doc))
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        Ok(self.collections.get(collection).map_or(0, |docs| {
            docs.iter().filter(|doc| filter.matches(doc)).count() as u64
        }))
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        mut doc: Document,
    ) -> StoreResult<Option<Document>> {
        parse_id(StoreOperation::Replace, id).map_err(|e| e.with_collection(collection))?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(position) = docs.iter().position(|d| document_id(d) == Some(id)) else {
            return Ok(None);
        };

        let current = &docs[position];
        doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        doc.insert(VERSION_FIELD.to_string(), Value::from(next_version(current)));
        if let Some(created) = current.get(CREATED_AT_FIELD) {
            doc.entry(CREATED_AT_FIELD.to_string())
                .or_insert_with(|| created.clone());
        }

        self.check_unique(StoreOperation::Replace, collection, &docs, &doc)?;
        docs[position] = doc.clone();
        Ok(Some(doc))
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        parse_id(StoreOperation::Delete, id).map_err(|e| e.with_collection(collection))?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|d| document_id(d) == Some(id))
            .map(|position| docs.remove(position)))
    }

    async fn clear(&self, collection: &str) -> StoreResult<u64> {
        Ok(self
            .collections
            .remove(collection)
            .map_or(0, |(_, docs)| docs.len() as u64))
    }
}
