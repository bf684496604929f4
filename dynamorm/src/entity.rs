//! Static schema description for record types, and the traits the
//! `#[derive(Entity)]` / `#[derive(IndexOf)]` macros implement.
//!
//! In the source CLR implementation this layer walks a type's reflected
//! shape at runtime. Rust has no equivalent reflection facility, so the
//! same descriptor is instead produced once per type by the derive macro
//! in `dynamorm-derive`, and cached the first time [`crate::registry::register`]
//! sees the type.

use aws_sdk_dynamodb::types::AttributeValue;
use std::fmt;

/// The wire-level type a field is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    /// UTF-8 string attribute.
    String,
    /// Stringified decimal number attribute.
    Number,
    /// Boolean attribute.
    Bool,
    /// Raw byte sequence attribute.
    Binary,
    /// Ordered list attribute; elements are encoded recursively.
    List,
    /// Key/value map attribute; values are encoded recursively.
    Map,
    /// Set of strings.
    StringSet,
    /// Set of stringified numbers.
    NumberSet,
    /// Set of byte sequences.
    BinarySet,
}

/// Describes one serialized attribute of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// The attribute's name on the wire.
    pub name: &'static str,
    /// The attribute's wire-level type.
    pub db_type: DbType,
    /// Whether this field is the table's hash key.
    pub is_hash_key: bool,
    /// Whether this field is the table's range key.
    pub is_range_key: bool,
}

/// What a secondary index projects from the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only the table and index keys.
    KeysOnly,
    /// The table and index keys plus the named fields.
    Include(Vec<&'static str>),
    /// Every field.
    All,
}

/// Describes a local or global secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// The index's name.
    pub name: &'static str,
    /// The index's hash key attribute name.
    pub hash_key: &'static str,
    /// The index's range key attribute name, if any.
    pub range_key: Option<&'static str>,
    /// What the index projects.
    pub projection: Projection,
    /// Whether this is a global secondary index (own throughput,
    /// independent hash/range) as opposed to a local one (shares the
    /// table's hash key).
    pub global: bool,
    /// Provisioned read capacity, global indexes only.
    pub read_capacity: Option<i64>,
    /// Provisioned write capacity, global indexes only.
    pub write_capacity: Option<i64>,
}

/// The process-wide, immutable description of a table, derived once from
/// a record type's [`Entity`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// The table's name.
    pub name: &'static str,
    /// Every serialized field, hash and range key included.
    pub fields: Vec<FieldSchema>,
    /// Local secondary indexes (share the table's hash key).
    pub local_indexes: Vec<IndexSchema>,
    /// Global secondary indexes (independent hash/range).
    pub global_indexes: Vec<IndexSchema>,
    /// Provisioned read capacity override, if any.
    pub read_capacity: Option<i64>,
    /// Provisioned write capacity override, if any.
    pub write_capacity: Option<i64>,
}

impl TableSchema {
    /// The hash key field. Every well-formed schema has exactly one.
    pub fn hash_key(&self) -> &FieldSchema {
        self.fields
            .iter()
            .find(|f| f.is_hash_key)
            .expect("Entity::table_schema invariant: exactly one hash key")
    }

    /// The range key field, if the table has one.
    pub fn range_key(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_range_key)
    }

    /// Finds a field by its wire name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a secondary index (local or global) by name.
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.local_indexes
            .iter()
            .chain(self.global_indexes.iter())
            .find(|i| i.name == name)
    }
}

/// Per-field read/write access generated by `#[derive(Entity)]`.
///
/// This is the Rust substitute for the source's reflected
/// `getValue(instance)` / `setValue(instance, value)` accessors: a plain
/// function pointer captured once, rather than a reflection call on every
/// access.
pub struct FieldAccessor<T> {
    /// The attribute's name on the wire.
    pub name: &'static str,
    /// The attribute's wire-level type.
    pub db_type: DbType,
    /// Whether this field is the table's hash key.
    pub is_hash_key: bool,
    /// Whether this field is the table's range key.
    pub is_range_key: bool,
    /// Reads the field off an instance and encodes it.
    pub get: fn(&T) -> crate::error::Result<AttributeValue>,
    /// Decodes an attribute value and writes it into an instance. Errors
    /// are reported with this field's name attached by the caller.
    pub set: fn(&mut T, &AttributeValue) -> crate::error::Result<()>,
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("is_hash_key", &self.is_hash_key)
            .field("is_range_key", &self.is_range_key)
            .finish()
    }
}

/// A record type that can be stored as a table.
///
/// Implemented by hand or, almost always, via `#[derive(Entity)]`.
pub trait Entity: Default + Send + Sync + 'static {
    /// The table's name. Must be unique process-wide.
    const TABLE_NAME: &'static str;

    /// This type's local secondary indexes, if any.
    const LOCAL_INDEXES: &'static [fn() -> IndexSchema] = &[];

    /// This type's global secondary indexes, if any.
    const GLOBAL_INDEXES: &'static [fn() -> IndexSchema] = &[];

    /// Provisioned read capacity override.
    const READ_CAPACITY: Option<i64> = None;

    /// Provisioned write capacity override.
    const WRITE_CAPACITY: Option<i64> = None;

    /// Returns this type's field accessors, in declaration order. Called
    /// once by [`crate::registry::register`] and then cached.
    fn fields() -> &'static [FieldAccessor<Self>];

    /// Builds the immutable table schema for this type.
    fn table_schema() -> TableSchema {
        TableSchema {
            name: Self::TABLE_NAME,
            fields: Self::fields()
                .iter()
                .map(|f| FieldSchema {
                    name: f.name,
                    db_type: f.db_type,
                    is_hash_key: f.is_hash_key,
                    is_range_key: f.is_range_key,
                })
                .collect(),
            local_indexes: Self::LOCAL_INDEXES.iter().map(|f| f()).collect(),
            global_indexes: Self::GLOBAL_INDEXES.iter().map(|f| f()).collect(),
            read_capacity: Self::READ_CAPACITY,
            write_capacity: Self::WRITE_CAPACITY,
        }
    }
}

/// A companion type describing one secondary index of `Self::Base`,
/// produced via `#[derive(IndexOf)]`. Used by the query/scan builder's
/// `from_query_index`/`from_scan_index` to route a typed query through
/// the right index without the caller having to spell out its name.
pub trait IndexOf: Send + Sync + 'static {
    /// The base record type this is an index of.
    type Base: Entity;

    /// The index's name, as registered on the base table.
    const INDEX_NAME: &'static str;

    /// Whether this is a global secondary index.
    const IS_GLOBAL: bool;
}
