//! Read query types shared by every store backend
//!
//! Conditions are typed values; [`Filter::to_document`] renders them into the
//! Mongo-style operator dialect (`$gte`, `$ne`, ...) and [`Filter::matches`]
//! evaluates them against a document with the same semantics.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;

use super::Document;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Comparison operators understood by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    In,
}

impl FilterOperator {
    /// Parse a bare query-string token (`gte`, `lt`, ...)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Self::GreaterThan),
            "gte" => Some(Self::GreaterThanOrEqual),
            "lt" => Some(Self::LessThan),
            "lte" => Some(Self::LessThanOrEqual),
            _ => None,
        }
    }

    /// Operator name in the store's query dialect
    pub const fn dialect(self) -> &'static str {
        match self {
            Self::Equal => "$eq",
            Self::NotEqual => "$ne",
            Self::GreaterThan => "$gt",
            Self::GreaterThanOrEqual => "$gte",
            Self::LessThan => "$lt",
            Self::LessThanOrEqual => "$lte",
            Self::In => "$in",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dialect())
    }
}

/// Comparison value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<FilterValue>),
    Null,
}

impl FilterValue {
    /// Coerce a raw query-string value into the most specific scalar
    ///
    /// Numbers are only recognised in their canonical spelling, so `007` or
    /// `1e3` stay strings and still match string fields literally. Number
    /// fields parse string targets, so `price=0397` finds a price of 397.
    pub fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            if n.to_string() == raw {
                return Self::Integer(n);
            }
        }
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() && n.to_string() == raw {
                return Self::Float(n);
            }
        }
        match raw {
            "true" => Self::Boolean(true),
            "false" => Self::Boolean(false),
            _ => Self::String(raw.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::Number((*n).into()),
            Self::Float(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Boolean(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Null => Value::Null,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(list: Vec<String>) -> Self {
        Self::List(list.into_iter().map(Self::String).collect())
    }
}

/// A single predicate on one (possibly dotted) field path
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    pub fn in_strings(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(field, FilterOperator::In, values.into())
    }

    /// Evaluate against a document; array fields match when any element does
    pub fn matches(&self, doc: &Document) -> bool {
        let value = lookup(doc, &self.field);
        match self.operator {
            FilterOperator::Equal => value.is_some_and(|v| any_element(v, |e| equals(e, &self.value)))
                || (value.is_none() && self.value == FilterValue::Null),
            FilterOperator::NotEqual => !Self::eq(self.field.clone(), self.value.clone()).matches(doc),
            FilterOperator::In => match &self.value {
                FilterValue::List(candidates) => value.is_some_and(|v| {
                    any_element(v, |e| candidates.iter().any(|c| equals(e, c)))
                }),
                _ => false,
            },
            op => value.is_some_and(|v| {
                any_element(v, |e| {
                    compare(e, &self.value).is_some_and(|ordering| match op {
                        FilterOperator::GreaterThan => ordering == Ordering::Greater,
                        FilterOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                        FilterOperator::LessThan => ordering == Ordering::Less,
                        FilterOperator::LessThanOrEqual => ordering != Ordering::Greater,
                        _ => false,
                    })
                })
            }),
        }
    }
}

/// Conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<FilterCondition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn merge(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn push(&mut self, condition: FilterCondition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Field paths referenced by the predicate
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.field.as_str())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }

    /// Render the predicate in the Mongo-style operator dialect
    pub fn to_document(&self) -> Value {
        let mut rendered = Map::new();
        for condition in &self.conditions {
            let entry = rendered
                .entry(condition.field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(
                    condition.operator.dialect().to_string(),
                    condition.value.to_json(),
                );
            }
        }
        // Plain equality renders as the bare value
        for value in rendered.values_mut() {
            if let Value::Object(ops) = value {
                if ops.len() == 1 {
                    if let Some(bare) = ops.remove(FilterOperator::Equal.dialect()) {
                        *value = bare;
                    }
                }
            }
        }
        Value::Object(rendered)
    }
}

/// One key of a multi-key sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: OrderDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Descending,
        }
    }

    /// Parse `price` or `-price`
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some("") => None,
            Some(field) => Some(Self::desc(field)),
            None if token.is_empty() => None,
            None => Some(Self::asc(token)),
        }
    }
}

/// Compare two documents by a sequence of keys; equal keys keep store order
pub fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ordering = compare_for_sort(lookup(a, &key.field), lookup(b, &key.field));
        let ordering = match key.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Field projection applied to every returned document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    /// Keep only these top-level fields (plus the identifier)
    Include(Vec<String>),
    /// Drop these top-level fields
    Exclude(Vec<String>),
}

impl Projection {
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Self::All => doc,
            Self::Include(fields) => doc
                .into_iter()
                .filter(|(key, _)| key == super::ID_FIELD || fields.iter().any(|f| top_level(f) == key))
                .collect(),
            Self::Exclude(fields) => doc
                .into_iter()
                .filter(|(key, _)| !fields.iter().any(|f| top_level(f) == key))
                .collect(),
        }
    }
}

/// A fully composed read operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl ReadQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

fn top_level(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn any_element(value: &Value, predicate: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Array(items) => items.iter().any(&predicate) || predicate(value),
        other => predicate(other),
    }
}

fn equals(value: &Value, target: &FilterValue) -> bool {
    compare(value, target) == Some(Ordering::Equal)
}

fn compare(value: &Value, target: &FilterValue) -> Option<Ordering> {
    match (value, target) {
        (Value::Null, FilterValue::Null) => Some(Ordering::Equal),
        (Value::Number(n), t) => n.as_f64()?.partial_cmp(&t.as_f64().or_else(|| match t {
            FilterValue::String(s) => s.parse::<f64>().ok(),
            _ => None,
        })?),
        (Value::String(s), FilterValue::String(t)) => Some(s.as_str().cmp(t.as_str())),
        (Value::String(s), FilterValue::Integer(n)) => Some(s.as_str().cmp(n.to_string().as_str())),
        (Value::String(s), FilterValue::Float(n)) => Some(s.as_str().cmp(n.to_string().as_str())),
        (Value::String(s), FilterValue::Boolean(b)) => (s == &b.to_string()).then_some(Ordering::Equal),
        (Value::Bool(b), FilterValue::Boolean(t)) => Some(b.cmp(t)),
        (Value::Bool(b), FilterValue::String(t)) => (&b.to_string() == t).then_some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
