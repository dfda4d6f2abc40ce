// Entity <-> map conversion driven by field descriptors

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Storage type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    DateTime,
    /// Arbitrary JSON (arrays, objects).
    Json,
    /// Single related entity, by entity name.
    One(&'static str),
    /// Related collection. Only the owning side accepts input.
    Many { entity: &'static str, owning: bool },
}

/// A field value read from an entity.
pub enum FieldValue<'a> {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Json(Value),
    One(Option<&'a dyn Normalize>),
    Many(Vec<&'a dyn Normalize>),
}

/// A coerced value handed to a field setter.
pub enum FieldInput {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Json(Value),
    One(Option<Box<dyn Any + Send>>),
    Many(Vec<Box<dyn Any + Send>>),
}

impl FieldInput {
    pub fn into_string(self) -> Option<String> {
        match self {
            FieldInput::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_i64(self) -> Option<i64> {
        match self {
            FieldInput::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn into_f64(self) -> Option<f64> {
        match self {
            FieldInput::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            FieldInput::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            FieldInput::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            FieldInput::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Related entity; `Some(None)` clears the relation.
    pub fn into_one<T: 'static>(self) -> Option<Option<T>> {
        match self {
            FieldInput::One(Some(item)) => item.downcast::<T>().ok().map(|b| Some(*b)),
            FieldInput::One(None) => Some(None),
            _ => None,
        }
    }

    pub fn into_many<T: 'static>(self) -> Vec<T> {
        match self {
            FieldInput::Many(items) => items
                .into_iter()
                .filter_map(|item| item.downcast::<T>().ok().map(|b| *b))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldInput::Null)
    }
}

type Getter<E> = for<'a> fn(&'a E) -> FieldValue<'a>;
type Setter<E> = fn(&mut E, FieldInput);

/// Describes one field: its name, kind, and how to read and write it.
pub struct Field<E> {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    get: Option<Getter<E>>,
    set: Option<Setter<E>>,
}

impl<E> Field<E> {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            get: None,
            set: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn getter(mut self, get: Getter<E>) -> Self {
        self.get = Some(get);
        self
    }

    pub fn setter(mut self, set: Setter<E>) -> Self {
        self.set = Some(set);
        self
    }
}

/// An entity the normalizer can read and populate.
pub trait Entity: Send + Sync + 'static {
    const NAME: &'static str;

    fn fields() -> Vec<Field<Self>>
    where
        Self: Sized;

    /// Primary key as JSON.
    fn identifier(&self) -> Value;
}

/// Object-safe view of an [`Entity`] used for relations.
pub trait Normalize {
    fn entity_name(&self) -> &'static str;

    fn entity_identifier(&self) -> Value;

    fn normalize_into(&self, options: NormalizeOptions, visiting: &mut Vec<(&'static str, Value)>) -> Value;
}

impl<E: Entity> Normalize for E {
    fn entity_name(&self) -> &'static str {
        E::NAME
    }

    fn entity_identifier(&self) -> Value {
        self.identifier()
    }

    fn normalize_into(&self, options: NormalizeOptions, visiting: &mut Vec<(&'static str, Value)>) -> Value {
        let key = (E::NAME, self.identifier());
        if visiting.contains(&key) {
            return key.1;
        }

        visiting.push(key);
        let map = normalize_fields(self, options, visiting);
        visiting.pop();
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Follow relations.
    pub deep: bool,
    /// Render related entities as their identifiers (for form defaults).
    pub identifiers: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            deep: true,
            identifiers: false,
        }
    }
}

/// Finds entities by name and identifier.
pub trait EntityLookup: Send + Sync {
    fn find(&self, entity: &str, id: &Value) -> Option<Box<dyn Any + Send>>;
}

/// Entity as a map; null fields are left out and dates become timestamps.
pub fn to_map<E: Entity>(entity: &E, options: NormalizeOptions) -> Map<String, Value> {
    let mut visiting = vec![(E::NAME, entity.identifier())];
    normalize_fields(entity, options, &mut visiting)
}

fn normalize_fields<E: Entity>(
    entity: &E,
    options: NormalizeOptions,
    visiting: &mut Vec<(&'static str, Value)>,
) -> Map<String, Value> {
    let mut out = Map::new();

    for field in E::fields() {
        let Some(get) = field.get else {
            continue;
        };

        let value = match get(entity) {
            FieldValue::Null => None,
            FieldValue::String(s) => Some(Value::String(s)),
            FieldValue::Int(i) => Some(Value::from(i)),
            FieldValue::Float(f) => Number::from_f64(f).map(Value::Number),
            FieldValue::Bool(b) => Some(Value::Bool(b)),
            FieldValue::DateTime(dt) => Some(Value::from(dt.timestamp())),
            FieldValue::Json(Value::Null) => None,
            FieldValue::Json(v) => Some(v),
            FieldValue::One(_) | FieldValue::Many(_) if !options.deep => None,
            FieldValue::One(None) => None,
            FieldValue::One(Some(related)) => Some(relation(related, options, visiting)),
            FieldValue::Many(items) => Some(Value::Array(
                items
                    .into_iter()
                    .map(|related| relation(related, options, visiting))
                    .collect(),
            )),
        };

        if let Some(value) = value {
            out.insert(field.name.to_string(), value);
        }
    }
    out
}

fn relation(related: &dyn Normalize, options: NormalizeOptions, visiting: &mut Vec<(&'static str, Value)>) -> Value {
    if options.identifiers {
        related.entity_identifier()
    } else {
        related.normalize_into(options, visiting)
    }
}

/// Populate `entity` from a map, coercing each value to its field's kind.
///
/// Keys without a matching writable field are ignored. Related entities are
/// fetched through `lookup`; identifiers it cannot resolve are skipped.
pub fn from_map<E: Entity>(entity: &mut E, data: &Map<String, Value>, lookup: &dyn EntityLookup) -> Result<()> {
    let fields = E::fields();

    for (key, value) in data {
        let Some(field) = fields.iter().find(|f| f.name == key) else {
            continue;
        };
        let Some(set) = field.set else {
            continue;
        };

        let input = match field.kind {
            FieldKind::String => match value {
                Value::Null if field.nullable => FieldInput::Null,
                other => FieldInput::String(coerce_string(other)),
            },
            FieldKind::Int => match value {
                Value::Null if field.nullable => FieldInput::Null,
                other => FieldInput::Int(coerce_i64(other)),
            },
            FieldKind::Float => match value {
                Value::Null if field.nullable => FieldInput::Null,
                other => FieldInput::Float(coerce_f64(other)),
            },
            FieldKind::Bool => match value {
                Value::Null if field.nullable => FieldInput::Null,
                other => FieldInput::Bool(truthy(other)),
            },
            FieldKind::DateTime => match value {
                Value::Null => FieldInput::Null,
                other => FieldInput::DateTime(coerce_datetime(other)?),
            },
            FieldKind::Json => match value {
                Value::Null => FieldInput::Null,
                other => FieldInput::Json(other.clone()),
            },
            FieldKind::One(target) => {
                if !truthy(value) {
                    FieldInput::One(None)
                } else {
                    match lookup.find(target, value) {
                        Some(found) => FieldInput::One(Some(found)),
                        None => continue,
                    }
                }
            }
            FieldKind::Many { entity: target, owning } => {
                if !owning {
                    continue;
                }
                let ids = match value {
                    Value::Array(ids) => ids.clone(),
                    Value::Null => Vec::new(),
                    other if !truthy(other) => Vec::new(),
                    other => vec![other.clone()],
                };
                FieldInput::Many(ids.iter().filter_map(|id| lookup.find(target, id)).collect())
            }
        };

        set(entity, input);
    }
    Ok(())
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

/// Exact for whole numbers in the `i64` range; only fractional input goes
/// through `f64`.
fn coerce_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| coerce_f64(value) as i64),
        Value::String(s) => s.trim().parse().unwrap_or_else(|_| coerce_f64(value) as i64),
        other => coerce_f64(other) as i64,
    }
}

fn coerce_f64(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        Value::Array(a) => f64::from(u8::from(!a.is_empty())),
        Value::Object(o) => f64::from(u8::from(!o.is_empty())),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

/// Timestamps (numeric or numeric strings) or UTC date strings.
fn coerce_datetime(value: &Value) -> Result<DateTime<Utc>> {
    let invalid = || Error::Serialization(format!("Invalid date value: {}", value));

    let timestamp = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if let Some(ts) = timestamp {
        return Utc.timestamp_opt(ts, 0).single().ok_or_else(invalid);
    }

    let text = value.as_str().map(str::trim).ok_or_else(invalid)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).ok_or_else(invalid);
    }
    Err(invalid())
}

/// Array helpers for one entity type.
pub struct Repository<E> {
    lookup: Arc<dyn EntityLookup>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(lookup: Arc<dyn EntityLookup>) -> Self {
        Self {
            lookup,
            _entity: PhantomData,
        }
    }

    pub fn find(&self, id: &Value) -> Option<E> {
        self.lookup
            .find(E::NAME, id)
            .and_then(|found| found.downcast::<E>().ok())
            .map(|boxed| *boxed)
    }

    pub fn to_array(&self, entity: &E, deep: bool, identifiers: bool) -> Map<String, Value> {
        to_map(entity, NormalizeOptions { deep, identifiers })
    }

    pub fn from_array(&self, entity: &mut E, source: &Map<String, Value>) -> Result<()> {
        from_map(entity, source, self.lookup.as_ref())
    }

    pub fn find_as_array(&self, id: &Value, deep: bool, identifiers: bool) -> Option<Map<String, Value>> {
        self.find(id).map(|entity| self.to_array(&entity, deep, identifiers))
    }
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            _entity: PhantomData,
        }
    }
}
