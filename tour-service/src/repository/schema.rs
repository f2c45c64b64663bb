//! Declarative field rules for resource documents
//!
//! Each resource lists its fields as a `&'static [FieldSpec]`. The rules run
//! in three explicit steps before a write reaches the store:
//!
//! 1. [`Schema::sanitize`] drops unknown and store-owned fields
//! 2. [`Schema::normalize`] casts raw JSON into the declared kind, trims,
//!    lowercases and applies setters
//! 3. [`Schema::validate`] checks required, length, range, enum and email rules

use regex::Regex;
use serde_json::{Number, Value};
use std::sync::LazyLock;

use crate::store::{
    parse_timestamp, timestamp, Document, FieldError, ID_FIELD, VERSION_FIELD,
};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

/// Declared JSON shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp or `YYYY-MM-DD`, stored as a timestamp string
    Date,
    /// Reference to another document
    Id,
    IdList,
    StringList,
    DateList,
    /// Free-form nested object (e.g. a GeoJSON point)
    Object,
    ObjectList,
}

/// Rules for a single field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: Option<&'static str>,
    pub trim: bool,
    pub lowercase: bool,
    pub min_length: Option<(usize, &'static str)>,
    pub max_length: Option<(usize, &'static str)>,
    pub min: Option<(f64, &'static str)>,
    pub max: Option<(f64, &'static str)>,
    pub one_of: Option<(&'static [&'static str], &'static str)>,
    pub email: Option<&'static str>,
    pub default: Option<fn() -> Value>,
    pub setter: Option<fn(Value) -> Value>,
    /// Never returned to clients
    pub hidden: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: None,
            trim: false,
            lowercase: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            one_of: None,
            email: None,
            default: None,
            setter: None,
            hidden: false,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub const fn number(name: &'static str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub const fn id(name: &'static str) -> Self {
        Self::new(name, FieldKind::Id)
    }

    pub const fn required(mut self, message: &'static str) -> Self {
        self.required = Some(message);
        self
    }

    pub const fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub const fn min_length(mut self, len: usize, message: &'static str) -> Self {
        self.min_length = Some((len, message));
        self
    }

    pub const fn max_length(mut self, len: usize, message: &'static str) -> Self {
        self.max_length = Some((len, message));
        self
    }

    pub const fn min(mut self, min: f64, message: &'static str) -> Self {
        self.min = Some((min, message));
        self
    }

    pub const fn max(mut self, max: f64, message: &'static str) -> Self {
        self.max = Some((max, message));
        self
    }

    pub const fn one_of(mut self, values: &'static [&'static str], message: &'static str) -> Self {
        self.one_of = Some((values, message));
        self
    }

    pub const fn email(mut self, message: &'static str) -> Self {
        self.email = Some(message);
        self
    }

    pub const fn default(mut self, default: fn() -> Value) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn setter(mut self, setter: fn(Value) -> Value) -> Self {
        self.setter = Some(setter);
        self
    }

    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn cast_error(&self, value: &Value) -> FieldError {
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        FieldError::new(self.name, format!("Invalid {}: {}", self.name, shown))
    }

    /// Cast a raw value into the declared kind
    fn cast(&self, value: Value) -> Result<Value, FieldError> {
        if value.is_null() {
            return Ok(value);
        }
        let cast = match self.kind {
            FieldKind::String => match value {
                Value::String(s) => {
                    let s = if self.trim { s.trim().to_string() } else { s };
                    let s = if self.lowercase { s.to_lowercase() } else { s };
                    Ok(Value::String(s))
                }
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(self.cast_error(&other)),
            },
            FieldKind::Number => match value {
                Value::Number(_) => Ok(value),
                Value::String(ref s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(number_value)
                    .ok_or_else(|| self.cast_error(&value)),
                other => Err(self.cast_error(&other)),
            },
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::String(ref s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(ref s) if s == "false" => Ok(Value::Bool(false)),
                other => Err(self.cast_error(&other)),
            },
            FieldKind::Date => cast_date(&value).ok_or_else(|| self.cast_error(&value)),
            FieldKind::Id => cast_id(&value).ok_or_else(|| self.cast_error(&value)),
            FieldKind::IdList => cast_list(value, cast_id).map_err(|v| self.cast_error(&v)),
            FieldKind::DateList => cast_list(value, cast_date).map_err(|v| self.cast_error(&v)),
            FieldKind::StringList => cast_list(value, |v| match v {
                Value::String(s) => Some(Value::String(s.trim().to_string())),
                _ => None,
            })
            .map_err(|v| self.cast_error(&v)),
            FieldKind::Object => match value {
                Value::Object(_) => Ok(value),
                other => Err(self.cast_error(&other)),
            },
            FieldKind::ObjectList => {
                cast_list(value, |v| v.is_object().then(|| v.clone())).map_err(|v| self.cast_error(&v))
            }
        }?;
        Ok(match self.setter {
            Some(setter) => setter(cast),
            None => cast,
        })
    }

    fn check(&self, value: Option<&Value>, errors: &mut Vec<FieldError>) {
        let value = value.filter(|v| !is_blank(v));
        let Some(value) = value else {
            if let Some(message) = self.required {
                errors.push(FieldError::new(self.name, message));
            }
            return;
        };

        if let Value::String(s) = value {
            let len = s.chars().count();
            if let Some((min, message)) = self.min_length {
                if len < min {
                    errors.push(FieldError::new(self.name, message));
                }
            }
            if let Some((max, message)) = self.max_length {
                if len > max {
                    errors.push(FieldError::new(self.name, message));
                }
            }
            if let Some((allowed, message)) = self.one_of {
                if !allowed.contains(&s.as_str()) {
                    errors.push(FieldError::new(self.name, message));
                }
            }
            if let Some(message) = self.email {
                if !EMAIL_PATTERN.is_match(s) {
                    errors.push(FieldError::new(self.name, message));
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some((min, message)) = self.min {
                if n < min {
                    errors.push(FieldError::new(self.name, message));
                }
            }
            if let Some((max, message)) = self.max {
                if n > max {
                    errors.push(FieldError::new(self.name, message));
                }
            }
        }
    }
}

/// Which fields [`Schema::validate`] looks at
#[derive(Debug, Clone, Copy)]
pub enum ValidationScope<'a> {
    /// Every declared field, as on insert
    Full,
    /// Only the fields being written, as on a partial update
    Fields(&'a [String]),
}

/// The declared fields of one resource
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [FieldSpec],
}

impl Schema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn hidden_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|f| f.hidden).map(|f| f.name)
    }

    /// Keep only declared fields; clients never write store-owned fields
    pub fn sanitize(&self, doc: Document) -> Document {
        doc.into_iter()
            .filter(|(key, _)| {
                key != ID_FIELD && key != VERSION_FIELD && self.field(key).is_some()
            })
            .collect()
    }

    pub fn apply_defaults(&self, doc: &mut Document) {
        for field in self.fields {
            if let Some(default) = field.default {
                if doc.get(field.name).is_none_or(Value::is_null) {
                    doc.insert(field.name.to_string(), default());
                }
            }
        }
    }

    /// Cast every declared field present in `doc`, collecting cast failures
    pub fn normalize(&self, doc: &mut Document) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for field in self.fields {
            if let Some(value) = doc.remove(field.name) {
                match field.cast(value) {
                    Ok(cast) => {
                        doc.insert(field.name.to_string(), cast);
                    }
                    Err(error) => errors.push(error),
                }
            }
        }
        errors
    }

    pub fn validate(&self, doc: &Document, scope: ValidationScope<'_>) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for field in self.fields {
            let in_scope = match scope {
                ValidationScope::Full => true,
                ValidationScope::Fields(names) => names.iter().any(|n| n == field.name),
            };
            if in_scope {
                field.check(doc.get(field.name), &mut errors);
            }
        }
        errors
    }

    /// Remove hidden fields before a document leaves the service
    pub fn hide(&self, mut doc: Document) -> Document {
        for name in self.hidden_fields() {
            doc.remove(name);
        }
        doc
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Some(Value::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

fn cast_id(value: &Value) -> Option<Value> {
    let s = value.as_str()?;
    uuid::Uuid::parse_str(s).ok()?;
    Some(Value::String(s.to_string()))
}

fn cast_date(value: &Value) -> Option<Value> {
    if let Some(parsed) = parse_timestamp(value) {
        return Some(Value::String(timestamp(parsed)));
    }
    let day = chrono::NaiveDate::parse_from_str(value.as_str()?, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?.and_utc();
    Some(Value::String(timestamp(midnight)))
}

fn cast_list(value: Value, item: impl Fn(&Value) -> Option<Value>) -> Result<Value, Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| item(v).ok_or_else(|| v.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => item(&other).map(|v| Value::Array(vec![v])).ok_or(other),
    }
}

/// Setter rounding a rating to one decimal place
pub fn round_to_tenth(value: Value) -> Value {
    value
        .as_f64()
        .and_then(|n| Number::from_f64((n * 10.0).round() / 10.0))
        .map_or(value, Value::Number)
}
