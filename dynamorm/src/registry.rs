//! Process-wide map from record type to [`TableSchema`].
//!
//! Descriptors are built eagerly on first registration and are immutable
//! thereafter; the registry itself lives for the process. Registration is
//! idempotent and is expected to happen during application startup,
//! mirroring the source's singleton converter/registry.

use crate::entity::{Entity, TableSchema};
use crate::error::{ErrorKind, Result};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static REGISTRY: Lazy<RwLock<HashMap<TypeId, Arc<TableSchema>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `T`, validating and caching its [`TableSchema`].
///
/// On duplicate registration the existing descriptor is returned
/// unchanged without re-validating — registration is idempotent.
pub fn register<T: Entity>() -> Result<Arc<TableSchema>> {
    let type_id = TypeId::of::<T>();

    if let Some(existing) = REGISTRY.read().expect("registry lock poisoned").get(&type_id) {
        return Ok(Arc::clone(existing));
    }

    let schema = T::table_schema();
    validate(&schema)?;
    let schema = Arc::new(schema);

    let mut guard = REGISTRY.write().expect("registry lock poisoned");
    let schema = Arc::clone(guard.entry(type_id).or_insert(schema));
    Ok(schema)
}

/// Returns `T`'s schema if it has already been registered, without
/// registering it.
pub fn lookup<T: Entity>() -> Option<Arc<TableSchema>> {
    REGISTRY
        .read()
        .expect("registry lock poisoned")
        .get(&TypeId::of::<T>())
        .cloned()
}

/// Returns every schema registered so far. Used by `init_schema` to
/// discover which tables to create.
pub fn all() -> Vec<Arc<TableSchema>> {
    REGISTRY
        .read()
        .expect("registry lock poisoned")
        .values()
        .cloned()
        .collect()
}

fn validate(schema: &TableSchema) -> Result<()> {
    if schema.fields.is_empty() {
        return Err(ErrorKind::Schema.with_context(format_args!(
            "table {:?} has zero serializable fields",
            schema.name
        )));
    }

    let hash_keys = schema.fields.iter().filter(|f| f.is_hash_key).count();
    if hash_keys != 1 {
        return Err(ErrorKind::Schema.with_context(format_args!(
            "table {:?} must have exactly one hash key, found {hash_keys}",
            schema.name
        )));
    }

    let range_keys = schema.fields.iter().filter(|f| f.is_range_key).count();
    if range_keys > 1 {
        return Err(ErrorKind::Schema.with_context(format_args!(
            "table {:?} must have at most one range key, found {range_keys}",
            schema.name
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name) {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "table {:?} has duplicate field name {:?}",
                schema.name, field.name
            )));
        }
    }

    for index in schema.local_indexes.iter().chain(schema.global_indexes.iter()) {
        if schema.field(index.hash_key).is_none() {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "index {:?} hash key {:?} is not a field of table {:?}",
                index.name, index.hash_key, schema.name
            )));
        }
        if let Some(range_key) = index.range_key {
            if schema.field(range_key).is_none() {
                return Err(ErrorKind::Schema.with_context(format_args!(
                    "index {:?} range key {:?} is not a field of table {:?}",
                    index.name, range_key, schema.name
                )));
            }
        }
    }

    Ok(())
}
