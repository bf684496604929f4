//! The typed predicate tree.
//!
//! Rust has no lambda-AST reflection facility, so (per `spec.md` §9
//! design notes) predicates are built with an explicit constructor DSL
//! instead of being captured from a closure body. Field names are plain
//! strings validated against a [`crate::entity::TableSchema`] at compile
//! time of the expression (see [`super::compiler::compile`]), which is
//! the closest Rust equivalent to "the compiler only understands
//! expressions that reduce to field accesses of the subject record".

use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;
use serde_json::Value as Json;

/// A node in a compiled predicate tree.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `field = value`
    Eq(String, AttributeValue),
    /// `field <> value`
    Ne(String, AttributeValue),
    /// `field < value`
    Lt(String, AttributeValue),
    /// `field <= value`
    Le(String, AttributeValue),
    /// `field > value`
    Gt(String, AttributeValue),
    /// `field >= value`
    Ge(String, AttributeValue),
    /// `begins_with(field, value)`
    BeginsWith(String, AttributeValue),
    /// `contains(field, value)`
    Contains(String, AttributeValue),
    /// `field BETWEEN low AND high`
    Between(String, AttributeValue, AttributeValue),
    /// `field IN (values...)`
    In(String, Vec<AttributeValue>),
    /// `attribute_exists(field)`
    AttributeExists(String),
    /// `attribute_not_exists(field)`
    AttributeNotExists(String),
    /// `left AND right`
    And(Box<Predicate>, Box<Predicate>),
    /// `left OR right`
    Or(Box<Predicate>, Box<Predicate>),
    /// `NOT inner`
    Not(Box<Predicate>),
}

/// Converts an application value into the attribute it would be captured
/// as inside a predicate. Scalars map directly; anything else takes the
/// same JSON-superset text path the codec uses for unrecognized field
/// types, so that a captured outer value and a stored field value compare
/// equal when they represent the same logical value.
pub fn capture<V: Serialize>(value: &V) -> AttributeValue {
    json_to_attribute(serde_json::to_value(value).unwrap_or(Json::Null))
}

fn json_to_attribute(json: Json) -> AttributeValue {
    match json {
        Json::Null => AttributeValue::Null(true),
        Json::Bool(b) => AttributeValue::Bool(b),
        Json::Number(n) => AttributeValue::N(n.to_string()),
        Json::String(s) => AttributeValue::S(s),
        Json::Array(items) => AttributeValue::L(items.into_iter().map(json_to_attribute).collect()),
        Json::Object(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, json_to_attribute(v)))
                .collect(),
        ),
    }
}

impl Predicate {
    /// `field = value`
    pub fn eq<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Eq(field.into(), capture(&value))
    }

    /// `field <> value`
    pub fn ne<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Ne(field.into(), capture(&value))
    }

    /// `field < value`
    pub fn lt<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Lt(field.into(), capture(&value))
    }

    /// `field <= value`
    pub fn le<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Le(field.into(), capture(&value))
    }

    /// `field > value`
    pub fn gt<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Gt(field.into(), capture(&value))
    }

    /// `field >= value`
    pub fn ge<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Ge(field.into(), capture(&value))
    }

    /// `begins_with(field, value)`
    pub fn begins_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::BeginsWith(field.into(), AttributeValue::S(value.into()))
    }

    /// `contains(field, value)`
    pub fn contains<V: Serialize>(field: impl Into<String>, value: V) -> Self {
        Predicate::Contains(field.into(), capture(&value))
    }

    /// `field BETWEEN low AND high`
    pub fn between<V: Serialize>(field: impl Into<String>, low: V, high: V) -> Self {
        Predicate::Between(field.into(), capture(&low), capture(&high))
    }

    /// `field IN (values...)`
    pub fn is_in<V: Serialize>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field.into(), values.iter_capture())
    }

    /// `attribute_exists(field)`
    pub fn attribute_exists(field: impl Into<String>) -> Self {
        Predicate::AttributeExists(field.into())
    }

    /// `attribute_not_exists(field)`
    pub fn attribute_not_exists(field: impl Into<String>) -> Self {
        Predicate::AttributeNotExists(field.into())
    }

    /// Combines `self` and `other` with `AND`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Combines `self` and `other` with `OR`.
    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Negates `self`.
    #[must_use]
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

trait IterCapture<V> {
    fn iter_capture(self) -> Vec<AttributeValue>;
}

impl<V: Serialize, I: IntoIterator<Item = V>> IterCapture<V> for I {
    fn iter_capture(self) -> Vec<AttributeValue> {
        self.into_iter().map(|v| capture(&v)).collect()
    }
}
