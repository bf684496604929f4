//! Walks a [`Predicate`] tree and emits the store's wire expression
//! syntax: expression text plus name/value placeholder maps.

use super::predicate::Predicate;
use crate::entity::TableSchema;
use crate::error::{ErrorKind, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

/// The output of compiling a [`Predicate`]: ready to drop into
/// `KeyConditionExpression`, `FilterExpression`, or `ConditionExpression`.
#[derive(Debug, Clone, Default)]
pub struct CompiledExpression {
    /// The expression text, with `#<prefix>nN`/`:<prefix>N`-style placeholders.
    pub expression: String,
    /// Value placeholder -> captured value.
    pub params: HashMap<String, AttributeValue>,
    /// Name placeholder -> original attribute name.
    pub aliases: HashMap<String, String>,
    /// Every field referenced by the predicate, in first-reference order,
    /// deduplicated.
    pub referenced_fields: Vec<String>,
}

impl CompiledExpression {
    /// Merges `self` and `other` with `AND`, keeping both sides'
    /// placeholders (which must already be disjoint — callers compiling
    /// multiple predicates against the same prefix should instead combine
    /// the `Predicate`s before compiling once).
    pub fn merge_and(mut self, other: CompiledExpression) -> Self {
        if self.expression.is_empty() {
            return other;
        }
        if other.expression.is_empty() {
            return self;
        }
        self.expression = format!("({}) AND ({})", self.expression, other.expression);
        self.params.extend(other.params);
        self.aliases.extend(other.aliases);
        for field in other.referenced_fields {
            if !self.referenced_fields.contains(&field) {
                self.referenced_fields.push(field);
            }
        }
        self
    }
}

/// Compiles a [`Predicate`] against `schema`, using `placeholder_prefix`
/// to disambiguate both the value placeholders (`:p0, :p1, …`) and the
/// name placeholders (`#pn0, #pn1, …`) of this expression from those of
/// another expression compiled against the same request — e.g. a
/// key-condition expression compiled with prefix `"k"` and a filter
/// expression compiled with prefix `"f"` must not collide when their
/// alias maps are merged (`spec.md` §4.3).
pub fn compile(
    predicate: &Predicate,
    schema: &TableSchema,
    placeholder_prefix: &str,
) -> Result<CompiledExpression> {
    let mut ctx = Context {
        schema,
        prefix: placeholder_prefix,
        next_value: 0,
        names: HashMap::new(),
        aliases: HashMap::new(),
        params: HashMap::new(),
        referenced_fields: Vec::new(),
    };
    let expression = ctx.emit(predicate)?;
    if ctx.params.is_empty() && ctx.aliases.is_empty() {
        return Err(ErrorKind::Expression.with_message(
            "predicate compiled to zero placeholders; expected at least one captured value or field reference",
        ));
    }
    Ok(CompiledExpression {
        expression,
        params: ctx.params,
        aliases: ctx.aliases,
        referenced_fields: ctx.referenced_fields,
    })
}

struct Context<'s> {
    schema: &'s TableSchema,
    prefix: &'s str,
    next_value: u32,
    names: HashMap<String, String>,
    aliases: HashMap<String, String>,
    params: HashMap<String, AttributeValue>,
    referenced_fields: Vec<String>,
}

impl<'s> Context<'s> {
    fn name_placeholder(&mut self, field: &str) -> Result<String> {
        if self.schema.field(field).is_none() {
            return Err(ErrorKind::Expression.with_context(format_args!(
                "predicate references field {field:?}, which is not part of table {:?}",
                self.schema.name
            )));
        }
        if !self.referenced_fields.iter().any(|f| f == field) {
            self.referenced_fields.push(field.to_string());
        }
        if let Some(existing) = self.names.get(field) {
            return Ok(existing.clone());
        }
        let placeholder = format!("#{}n{}", self.prefix, self.names.len());
        self.names.insert(field.to_string(), placeholder.clone());
        self.aliases.insert(placeholder.clone(), field.to_string());
        Ok(placeholder)
    }

    fn value_placeholder(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":{}{}", self.prefix, self.next_value);
        self.next_value += 1;
        self.params.insert(placeholder.clone(), value);
        placeholder
    }

    fn emit(&mut self, predicate: &Predicate) -> Result<String> {
        match predicate {
            Predicate::Eq(field, value) => self.binary(field, "=", value.clone()),
            Predicate::Ne(field, value) => self.binary(field, "<>", value.clone()),
            Predicate::Lt(field, value) => self.binary(field, "<", value.clone()),
            Predicate::Le(field, value) => self.binary(field, "<=", value.clone()),
            Predicate::Gt(field, value) => self.binary(field, ">", value.clone()),
            Predicate::Ge(field, value) => self.binary(field, ">=", value.clone()),
            Predicate::BeginsWith(field, value) => {
                let name = self.name_placeholder(field)?;
                let val = self.value_placeholder(value.clone());
                Ok(format!("begins_with({name}, {val})"))
            }
            Predicate::Contains(field, value) => {
                let name = self.name_placeholder(field)?;
                let val = self.value_placeholder(value.clone());
                Ok(format!("contains({name}, {val})"))
            }
            Predicate::Between(field, low, high) => {
                let name = self.name_placeholder(field)?;
                let low = self.value_placeholder(low.clone());
                let high = self.value_placeholder(high.clone());
                Ok(format!("{name} BETWEEN {low} AND {high}"))
            }
            Predicate::In(field, values) => {
                let name = self.name_placeholder(field)?;
                let placeholders = values
                    .iter()
                    .map(|v| self.value_placeholder(v.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!("{name} IN ({placeholders})"))
            }
            Predicate::AttributeExists(field) => {
                let name = self.name_placeholder(field)?;
                Ok(format!("attribute_exists({name})"))
            }
            Predicate::AttributeNotExists(field) => {
                let name = self.name_placeholder(field)?;
                Ok(format!("attribute_not_exists({name})"))
            }
            Predicate::And(left, right) => {
                let left = self.emit(left)?;
                let right = self.emit(right)?;
                Ok(format!("({left}) AND ({right})"))
            }
            Predicate::Or(left, right) => {
                let left = self.emit(left)?;
                let right = self.emit(right)?;
                Ok(format!("({left}) OR ({right})"))
            }
            Predicate::Not(inner) => {
                let inner = self.emit(inner)?;
                Ok(format!("NOT ({inner})"))
            }
        }
    }

    fn binary(&mut self, field: &str, op: &str, value: AttributeValue) -> Result<String> {
        let name = self.name_placeholder(field)?;
        let val = self.value_placeholder(value);
        Ok(format!("{name} {op} {val}"))
    }
}
