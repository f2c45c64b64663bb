//! Query Feature Builder
//!
//! Turns the raw query string of a list request into a [`ReadQuery`]:
//!
//! ```text
//! ?difficulty=easy&price[lt]=1500&sort=price,-ratingsAverage&fields=name,price&page=2&limit=10
//! ```
//!
//! - plain keys become equality conditions, `field[gt|gte|lt|lte]` become
//!   range conditions
//! - `sort` is a comma separated key list, `-` prefix for descending
//! - `fields` projects the result, `-` prefix excludes a field
//! - `page` and `limit` paginate
//!
//! Field names are not checked against the resource schema; unknown fields
//! simply match nothing.

use axum::extract::{FromRequestParts, Query};
use axum::http::{request::Parts, Uri};

use crate::error::{Error, Result};
use crate::store::{
    Filter, FilterCondition, FilterOperator, FilterValue, Projection, ReadQuery, SortKey,
    CREATED_AT_FIELD, VERSION_FIELD,
};

/// Keys that steer the query instead of filtering it
pub const CONTROL_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

/// The parsed query string of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    pairs: Vec<(String, String)>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string such as `price[gte]=500&sort=price`
    pub fn parse(query: &str) -> Result<Self> {
        let uri: Uri = format!("/?{query}")
            .parse()
            .map_err(|_| Error::BadRequest(format!("Invalid query string: {query}")))?;
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&uri)
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        Ok(Self { pairs })
    }

    /// Set `key`, replacing any value the client sent
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.into()));
        self
    }

    /// Last value sent for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl<S: Send + Sync> FromRequestParts<S> for QuerySpec {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        Ok(Self { pairs })
    }
}

/// Chainable builder over one [`ReadQuery`]
#[derive(Debug)]
pub struct ApiFeatures<'a> {
    spec: &'a QuerySpec,
    query: ReadQuery,
}

impl<'a> ApiFeatures<'a> {
    /// Start from a scoping filter, e.g. "reviews of tour X"
    pub fn new(base: Filter, spec: &'a QuerySpec) -> Self {
        Self {
            spec,
            query: ReadQuery::new(base),
        }
    }

    /// Every non-control key becomes a condition
    #[must_use]
    pub fn filter(mut self) -> Self {
        for (key, raw) in self.spec.pairs() {
            if CONTROL_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.query.filter.push(condition(key, raw));
        }
        self
    }

    #[must_use]
    pub fn sort(mut self) -> Self {
        let keys: Vec<SortKey> = self
            .spec
            .get("sort")
            .map(|sort| sort.split(',').filter_map(SortKey::parse).collect())
            .unwrap_or_default();
        self.query.sort = if keys.is_empty() {
            vec![SortKey::desc(CREATED_AT_FIELD)]
        } else {
            keys
        };
        self
    }

    /// Field projection from `fields`
    #[must_use]
    pub fn limit_fields(mut self) -> Self {
        self.query.projection = match self.spec.get("fields") {
            Some(fields) => projection(fields),
            None => Projection::Exclude(vec![VERSION_FIELD.to_string()]),
        };
        self
    }

    #[must_use]
    pub fn paginate(mut self) -> Self {
        let page = positive(self.spec.get("page")).unwrap_or(DEFAULT_PAGE);
        let limit = positive(self.spec.get("limit")).unwrap_or(DEFAULT_LIMIT);
        self.query.skip = (page - 1).saturating_mul(limit);
        self.query.limit = Some(limit);
        self
    }

    pub fn into_query(self) -> ReadQuery {
        self.query
    }
}

/// Apply all four features in their usual order
pub fn compose(base: Filter, spec: &QuerySpec) -> ReadQuery {
    ApiFeatures::new(base, spec)
        .filter()
        .limit_fields()
        .sort()
        .paginate()
        .into_query()
}

fn condition(key: &str, raw: &str) -> FilterCondition {
    let value = FilterValue::parse(raw);
    let ranged = key
        .strip_suffix(']')
        .and_then(|k| k.split_once('['))
        .and_then(|(field, token)| Some((field, FilterOperator::from_token(token)?)));
    match ranged {
        Some((field, operator)) if !field.is_empty() => {
            FilterCondition::new(field, operator, value)
        }
        _ => FilterCondition::eq(key, value),
    }
}

fn projection(fields: &str) -> Projection {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for token in fields.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.strip_prefix('-') {
            Some(field) if !field.is_empty() => exclude.push(field.to_string()),
            Some(_) => {}
            None => include.push(token.to_string()),
        }
    }

    if include.is_empty() {
        if !exclude.iter().any(|f| f == VERSION_FIELD) {
            exclude.push(VERSION_FIELD.to_string());
        }
        return Projection::Exclude(exclude);
    }
    include.retain(|f| !exclude.contains(f));
    Projection::Include(include)
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OrderDirection;

    fn spec(query: &str) -> QuerySpec {
        QuerySpec::parse(query).unwrap()
    }

    #[test]
    fn test_control_keys_never_become_conditions() {
        let query = compose(
            Filter::new(),
            &spec("page=2&sort=price&limit=10&fields=name&difficulty=easy"),
        );
        let fields: Vec<&str> = query.filter.fields().collect();
        assert_eq!(fields, vec!["difficulty"]);
    }

    #[test]
    fn test_operator_tokens_are_rewritten() {
        let query = compose(Filter::new(), &spec("duration[gte]=5&price[lt]=1500"));
        assert_eq!(
            query.filter.to_document(),
            serde_json::json!({
                "duration": { "$gte": 5 },
                "price": { "$lt": 1500 }
            })
        );
    }

    #[test]
    fn test_unknown_operator_is_literal_equality() {
        let query = compose(Filter::new(), &spec("price[regex]=abc"));
        let condition = &query.filter.conditions()[0];
        assert_eq!(condition.field, "price[regex]");
        assert_eq!(condition.operator, FilterOperator::Equal);
    }

    #[test]
    fn test_base_filter_is_kept() {
        let base = Filter::new().and(FilterCondition::eq("tour", "abc"));
        let query = compose(base, &spec("rating=5"));
        let fields: Vec<&str> = query.filter.fields().collect();
        assert_eq!(fields, vec!["tour", "rating"]);
    }

    #[test]
    fn test_sort_keys_in_order() {
        let query = compose(Filter::new(), &spec("sort=price,-ratingsAverage"));
        assert_eq!(
            query.sort,
            vec![SortKey::asc("price"), SortKey::desc("ratingsAverage")]
        );
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let query = compose(Filter::new(), &QuerySpec::new());
        assert_eq!(query.sort.len(), 1);
        assert_eq!(query.sort[0].field, "createdAt");
        assert_eq!(query.sort[0].direction, OrderDirection::Descending);
    }

    #[test]
    fn test_pagination() {
        let query = compose(Filter::new(), &spec("page=2&limit=10"));
        assert_eq!(query.skip, 10);
        assert_eq!(query.limit, Some(10));

        let query = compose(Filter::new(), &QuerySpec::new());
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn test_invalid_pagination_falls_back_to_defaults() {
        for raw in ["page=0&limit=-5", "page=abc&limit=", "page=-1&limit=0", "page=1.5&limit=2.5"] {
            let query = compose(Filter::new(), &spec(raw));
            assert_eq!(query.skip, 0, "{raw}");
            assert_eq!(query.limit, Some(DEFAULT_LIMIT), "{raw}");
        }
    }

    #[test]
    fn test_projection_grammar() {
        let query = compose(Filter::new(), &QuerySpec::new());
        assert_eq!(query.projection, Projection::Exclude(vec!["__v".into()]));

        let query = compose(Filter::new(), &spec("fields=name,price,-price"));
        assert_eq!(query.projection, Projection::Include(vec!["name".into()]));

        let query = compose(Filter::new(), &spec("fields=-summary"));
        assert_eq!(
            query.projection,
            Projection::Exclude(vec!["summary".into(), "__v".into()])
        );
    }

    #[test]
    fn test_with_overrides_client_values() {
        let spec = spec("limit=50&sort=name").with("limit", "5");
        assert_eq!(spec.get("limit"), Some("5"));
        assert_eq!(spec.get("sort"), Some("name"));
    }
}
