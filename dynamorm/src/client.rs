//! The request engine (`spec.md` §4): the single entry point an
//! application holds onto, wrapping a [`Backend`] with schema-aware
//! get/put/delete/batch/increment operations and conditional variants.

use crate::backend::{
    Backend, BatchGetRequest, BatchWrite, BatchWriteRequest, CreateTableRequest, DeleteItemRequest,
    GetItemRequest, KeyAttribute, PutItemRequest, TableStatus, UpdateItemRequest,
};
use crate::codec::Encodable;
use crate::config::{ClientConfig, ConsistentRead, BATCH_GET_LIMIT, BATCH_WRITE_LIMIT};
use crate::entity::{DbType, Entity, TableSchema};
use crate::error::{Error, ErrorKind, Result};
use crate::expr::{compile, Predicate};
use crate::registry;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A primary key: the hash key value, plus a range key value if the
/// table has one.
#[derive(Debug, Clone)]
pub struct Key {
    hash: AttributeValue,
    range: Option<AttributeValue>,
}

impl Key {
    /// Builds a key for a hash-only table.
    pub fn hash(value: impl Encodable) -> Result<Self> {
        Ok(Self {
            hash: value.encode()?,
            range: None,
        })
    }

    /// Adds a range key value to a hash key built with [`Key::hash`].
    pub fn and_range(mut self, value: impl Encodable) -> Result<Self> {
        self.range = Some(value.encode()?);
        Ok(self)
    }

    /// Builds a key directly from hash and range values.
    pub fn new(hash: impl Encodable, range: impl Encodable) -> Result<Self> {
        Ok(Self {
            hash: hash.encode()?,
            range: Some(range.encode()?),
        })
    }

    fn into_item(self, schema: &TableSchema) -> Result<HashMap<String, AttributeValue>> {
        let mut item = HashMap::new();
        item.insert(schema.hash_key().name.to_string(), self.hash);
        match (schema.range_key(), self.range) {
            (Some(range_key), Some(range_value)) => {
                item.insert(range_key.name.to_string(), range_value);
            }
            (None, None) => {}
            (Some(range_key), None) => {
                return Err(ErrorKind::Schema.with_context(format_args!(
                    "table {:?} has range key {:?} but no range value was supplied",
                    schema.name, range_key.name
                )));
            }
            (None, Some(_)) => {
                return Err(ErrorKind::Schema.with_context(format_args!(
                    "table {:?} has no range key but a range value was supplied",
                    schema.name
                )));
            }
        }
        Ok(item)
    }
}

pub(crate) fn decode_item<T: Entity>(item: HashMap<String, AttributeValue>) -> Result<T> {
    let mut value = T::default();
    for accessor in T::fields() {
        // Iterate table fields, not the incoming map: unknown wire
        // attributes are implicitly ignored by never being looked up, and
        // an attribute absent from `item` (e.g. a projection that didn't
        // select it) leaves `T::default()`'s value for that field in
        // place rather than forcing a NULL through the field's decoder.
        if let Some(attr) = item.get(accessor.name) {
            (accessor.set)(&mut value, attr).map_err(|e| {
                ErrorKind::Encoding.with_context(format_args!(
                    "field {:?}: {e}",
                    accessor.name
                ))
            })?;
        }
    }
    Ok(value)
}

fn encode_item<T: Entity>(value: &T) -> Result<HashMap<String, AttributeValue>> {
    let mut item = HashMap::new();
    for accessor in T::fields() {
        let attr = (accessor.get)(value).map_err(|e| {
            ErrorKind::Encoding.with_context(format_args!("field {:?}: {e}", accessor.name))
        })?;
        item.insert(accessor.name.to_string(), attr);
    }
    Ok(item)
}

fn scalar_letter(db_type: DbType) -> Result<&'static str> {
    match db_type {
        DbType::String => Ok("S"),
        DbType::Number => Ok("N"),
        DbType::Binary => Ok("B"),
        other => Err(ErrorKind::Schema.with_context(format_args!(
            "key fields must be String, Number, or Binary, found {other:?}"
        ))),
    }
}

fn is_condition_failure(err: &Error) -> bool {
    err.kind() == ErrorKind::PermanentStore
        && err.message().contains("ConditionalCheckFailedException")
}

/// The request engine: typed get/put/delete/batch/query/scan operations
/// backed by a store connection.
///
/// Cheap to clone (the backend and config are reference-counted
/// internally), so a single instance can be shared across tasks, the way
/// the teacher's `Surreal<C>` client is.
#[derive(Clone)]
pub struct DynamoMapper<B: Backend = aws_sdk_dynamodb::Client> {
    backend: Arc<B>,
    config: ClientConfig,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl DynamoMapper<aws_sdk_dynamodb::Client> {
    /// Builds a mapper from default AWS configuration (environment
    /// variables, shared config/credentials files, IMDS), using
    /// [`ClientConfig::default`].
    pub async fn connect() -> Self {
        Self::connect_with_config(ClientConfig::default()).await
    }

    /// Builds a mapper from default AWS configuration with an explicit
    /// [`ClientConfig`].
    pub async fn connect_with_config(config: ClientConfig) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_dynamodb::Client::new(&aws_config);
        Self::with_backend(client, config)
    }
}

impl<B: Backend> DynamoMapper<B> {
    /// Wraps an already-constructed backend (the real store client, or a
    /// test double) with the given configuration.
    pub fn with_backend(backend: B, config: ClientConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// The configuration this mapper was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns an independent mapper configured with `config`, sharing
    /// this one's backend connection and the process-wide metadata
    /// registry (`spec.md` §4.4 `clientWith`).
    #[must_use]
    pub fn client_with(&self, config: ClientConfig) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config,
            closed: Arc::clone(&self.closed),
        }
    }

    /// Disposes the underlying backend handle. Idempotent: calling it
    /// again is a no-op (`spec.md` §4.4 `close`).
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn consistent_read(&self, override_: Option<ConsistentRead>) -> bool {
        override_.unwrap_or(self.config.consistent_read) == ConsistentRead::Strong
    }

    /// Registers `T`'s schema. Idempotent; safe to call for every entity
    /// type at application startup before [`DynamoMapper::create_missing`].
    pub fn init_schema<T: Entity>(&self) -> Result<Arc<TableSchema>> {
        registry::register::<T>()
    }

    /// Creates every registered table that does not already exist in the
    /// store, then waits for each to become `Active`.
    pub async fn create_missing(&self) -> Result<()> {
        let existing = self.list_tables().await?;
        for schema in registry::all() {
            if existing.contains(&schema.name.to_string()) {
                continue;
            }
            tracing::info!(table = schema.name, "creating missing table");
            self.create_table(&schema).await?;
            self.wait_for_status(schema.name, TableStatus::Active).await?;
        }
        Ok(())
    }

    /// Deletes every registered table that exists in the store, then
    /// waits for each to disappear. Intended for test teardown.
    pub async fn delete_missing(&self) -> Result<()> {
        let existing = self.list_tables().await?;
        for schema in registry::all() {
            if !existing.contains(&schema.name.to_string()) {
                continue;
            }
            let timeout = self.config.max_retry_on_exception_timeout;
            crate::retry::exec(timeout, &[], || self.backend.delete_table(schema.name)).await?;
            self.wait_for_status(schema.name, TableStatus::NotFound).await?;
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let timeout = self.config.max_retry_on_exception_timeout;
        crate::retry::exec(timeout, &[], || self.backend.list_tables()).await
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let hash_key = schema.hash_key();
        let request = CreateTableRequest {
            table: schema.name.to_string(),
            hash_key: KeyAttribute {
                name: hash_key.name.to_string(),
                scalar_type: scalar_letter(hash_key.db_type)?,
            },
            range_key: schema
                .range_key()
                .map(|f| {
                    Ok::<_, Error>(KeyAttribute {
                        name: f.name.to_string(),
                        scalar_type: scalar_letter(f.db_type)?,
                    })
                })
                .transpose()?,
            local_indexes: schema.local_indexes.clone(),
            global_indexes: schema.global_indexes.clone(),
            read_capacity: schema.read_capacity.unwrap_or(self.config.read_capacity),
            write_capacity: schema.write_capacity.unwrap_or(self.config.write_capacity),
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        crate::retry::exec(timeout, &[], || self.backend.create_table(request.clone())).await
    }

    async fn wait_for_status(&self, table: &str, target: TableStatus) -> Result<()> {
        let deadline = Instant::now() + self.config.max_retry_on_exception_timeout;
        loop {
            let timeout = self.config.max_retry_on_exception_timeout;
            let status = crate::retry::exec(timeout, &[], || self.backend.describe_table_status(table)).await?;
            if status == target {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ErrorKind::Timeout.with_context(format_args!(
                    "table {table:?} did not reach {target:?} within max_retry_on_exception_timeout"
                )));
            }
            tokio::time::sleep(self.config.poll_table_status).await;
        }
    }

    /// Fetches a single item by key.
    pub async fn get_item<T: Entity>(&self, key: Key) -> Result<Option<T>> {
        let schema = self.init_schema::<T>()?;
        let request = GetItemRequest {
            table: schema.name.to_string(),
            key: key.into_item(&schema)?,
            consistent_read: self.consistent_read(None),
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        match crate::retry::exec(timeout, &[], || self.backend.get_item(request.clone())).await? {
            Some(item) => Ok(Some(decode_item(item)?)),
            None => Ok(None),
        }
    }

    /// Fetches many items by key, batching into groups of at most
    /// [`crate::config::BATCH_GET_LIMIT`] and resubmitting any keys the
    /// store reports as unprocessed until all are satisfied or
    /// `max_retry_on_exception_timeout` elapses.
    pub async fn get_items<T: Entity>(&self, keys: Vec<Key>) -> Result<Vec<T>> {
        let schema = self.init_schema::<T>()?;
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.into_iter().collect::<Vec<_>>().chunks(BATCH_GET_LIMIT) {
            let mut pending = chunk
                .iter()
                .cloned()
                .map(|k| k.into_item(&schema))
                .collect::<Result<Vec<_>>>()?;
            let deadline = Instant::now() + self.config.max_retry_on_exception_timeout;
            let mut attempt = 0u32;
            while !pending.is_empty() {
                let request = BatchGetRequest {
                    table: schema.name.to_string(),
                    keys: pending.clone(),
                    consistent_read: self.consistent_read(None),
                };
                let response = crate::retry::exec(self.config.max_retry_on_exception_timeout, &[], || {
                    self.backend.batch_get_item(request.clone())
                })
                .await?;
                for item in response.items {
                    out.push(decode_item(item)?);
                }
                pending = response.unprocessed_keys;
                if pending.is_empty() {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(ErrorKind::Timeout.with_context(
                        "max_retry_on_exception_timeout exceeded resubmitting unprocessed keys",
                    ));
                }
                tracing::debug!(table = schema.name, remaining = pending.len(), attempt, "resubmitting unprocessed batch-get keys");
                tokio::time::sleep(crate::retry::backoff(attempt)).await;
                attempt += 1;
            }
        }
        Ok(out)
    }

    /// Writes a single item, overwriting any existing item with the same
    /// key.
    pub async fn put_item<T: Entity>(&self, value: &T) -> Result<()> {
        let schema = self.init_schema::<T>()?;
        let request = PutItemRequest {
            table: schema.name.to_string(),
            item: encode_item(value)?,
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        crate::retry::exec(timeout, &[], || self.backend.put_item(request.clone())).await
    }

    /// Writes a single item only if `condition` holds against the
    /// existing item (or the item does not yet exist, when `condition`
    /// says so via [`Predicate::attribute_not_exists`]).
    ///
    /// Returns `Ok(false)` rather than an error when the condition fails,
    /// so callers can branch on it without matching on [`ErrorKind`].
    pub async fn put_item_if<T: Entity>(&self, value: &T, condition: &Predicate) -> Result<bool> {
        let schema = self.init_schema::<T>()?;
        let compiled = compile(condition, &schema, "c")?;
        let request = PutItemRequest {
            table: schema.name.to_string(),
            item: encode_item(value)?,
            condition_expression: Some(compiled.expression),
            expression_attribute_names: compiled.aliases,
            expression_attribute_values: compiled.params,
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        match crate::retry::exec(timeout, &[], || self.backend.put_item(request.clone())).await {
            Ok(()) => Ok(true),
            Err(e) if is_condition_failure(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes many items, batching into groups of at most
    /// [`crate::config::BATCH_WRITE_LIMIT`] and resubmitting unprocessed
    /// writes the same way [`DynamoMapper::get_items`] resubmits keys.
    pub async fn put_items<T: Entity>(&self, values: &[T]) -> Result<()> {
        let schema = self.init_schema::<T>()?;
        let writes = values
            .iter()
            .map(|v| Ok(BatchWrite::Put(encode_item(v)?)))
            .collect::<Result<Vec<_>>>()?;
        self.batch_write(&schema, writes).await
    }

    /// Deletes a single item by key, returning the deleted item's
    /// previous value if it existed.
    pub async fn delete_item<T: Entity>(&self, key: Key) -> Result<Option<T>> {
        let schema = self.init_schema::<T>()?;
        let request = DeleteItemRequest {
            table: schema.name.to_string(),
            key: key.into_item(&schema)?,
            condition_expression: None,
            expression_attribute_names: HashMap::new(),
            expression_attribute_values: HashMap::new(),
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        match crate::retry::exec(timeout, &[], || self.backend.delete_item(request.clone())).await? {
            Some(item) => Ok(Some(decode_item(item)?)),
            None => Ok(None),
        }
    }

    /// Deletes a single item only if `condition` holds. Returns
    /// `Ok(false)`, not an error, when the condition fails.
    pub async fn delete_item_if<T: Entity>(&self, key: Key, condition: &Predicate) -> Result<bool> {
        let schema = self.init_schema::<T>()?;
        let compiled = compile(condition, &schema, "c")?;
        let request = DeleteItemRequest {
            table: schema.name.to_string(),
            key: key.into_item(&schema)?,
            condition_expression: Some(compiled.expression),
            expression_attribute_names: compiled.aliases,
            expression_attribute_values: compiled.params,
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        match crate::retry::exec(timeout, &[], || self.backend.delete_item(request.clone())).await {
            Ok(_) => Ok(true),
            Err(e) if is_condition_failure(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes many items by key, batching and resubmitting the same way
    /// [`DynamoMapper::put_items`] does.
    pub async fn delete_items<T: Entity>(&self, keys: Vec<Key>) -> Result<()> {
        let schema = self.init_schema::<T>()?;
        let writes = keys
            .into_iter()
            .map(|k| Ok(BatchWrite::Delete(k.into_item(&schema)?)))
            .collect::<Result<Vec<_>>>()?;
        self.batch_write(&schema, writes).await
    }

    async fn batch_write(&self, schema: &TableSchema, writes: Vec<BatchWrite>) -> Result<()> {
        for chunk in writes.chunks(BATCH_WRITE_LIMIT) {
            let mut pending = chunk.to_vec();
            let deadline = Instant::now() + self.config.max_retry_on_exception_timeout;
            let mut attempt = 0u32;
            while !pending.is_empty() {
                let request = BatchWriteRequest {
                    table: schema.name.to_string(),
                    writes: pending,
                };
                let response = crate::retry::exec(self.config.max_retry_on_exception_timeout, &[], || {
                    self.backend.batch_write_item(request.clone())
                })
                .await?;
                pending = response.unprocessed;
                if pending.is_empty() {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(ErrorKind::Timeout.with_context(
                        "max_retry_on_exception_timeout exceeded resubmitting unprocessed writes",
                    ));
                }
                tracing::debug!(table = schema.name, remaining = pending.len(), attempt, "resubmitting unprocessed batch-write items");
                tokio::time::sleep(crate::retry::backoff(attempt)).await;
                attempt += 1;
            }
        }
        Ok(())
    }

    /// Atomically adds `delta` to a numeric field and returns its value
    /// after the update, via an `UpdateItem` `ADD` expression.
    pub async fn increment<T: Entity>(&self, key: Key, field: &str, delta: i64) -> Result<i64> {
        let schema = self.init_schema::<T>()?;
        if schema.field(field).is_none() {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "table {:?} has no field {field:?} to increment",
                schema.name
            )));
        }
        let mut names = HashMap::new();
        names.insert("#n0".to_string(), field.to_string());
        let mut values = HashMap::new();
        values.insert(":p0".to_string(), AttributeValue::N(delta.to_string()));
        let request = UpdateItemRequest {
            table: schema.name.to_string(),
            key: key.into_item(&schema)?,
            update_expression: "ADD #n0 :p0".to_string(),
            expression_attribute_names: names,
            expression_attribute_values: values,
        };
        let timeout = self.config.max_retry_on_exception_timeout;
        let item = crate::retry::exec(timeout, &[], || self.backend.update_item(request.clone())).await?;
        match item.get(field) {
            Some(value) => i64::decode(value),
            None => Err(ErrorKind::Encoding.with_context(format_args!(
                "ADD on field {field:?} returned no value"
            ))),
        }
    }

    /// Starts a fluent query against `T`'s base table.
    pub fn from_query<T: Entity>(&self) -> Result<crate::builder::QueryBuilder<T, B>> {
        let schema = self.init_schema::<T>()?;
        Ok(crate::builder::QueryBuilder::new(self.clone(), schema, None))
    }

    /// Starts a fluent query against a secondary index of `T`'s table.
    pub fn from_query_index<I>(&self) -> Result<crate::builder::QueryBuilder<I::Base, B>>
    where
        I: crate::entity::IndexOf,
    {
        let schema = self.init_schema::<I::Base>()?;
        if schema.index(I::INDEX_NAME).is_none() {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "table {:?} has no index {:?}",
                schema.name,
                I::INDEX_NAME
            )));
        }
        Ok(crate::builder::QueryBuilder::new(
            self.clone(),
            schema,
            Some(I::INDEX_NAME),
        ))
    }

    /// Starts a fluent scan of `T`'s base table.
    pub fn from_scan<T: Entity>(&self) -> Result<crate::builder::ScanBuilder<T, B>> {
        let schema = self.init_schema::<T>()?;
        Ok(crate::builder::ScanBuilder::new(self.clone(), schema, None))
    }

    /// Starts a fluent scan of a secondary index of `T`'s table.
    pub fn from_scan_index<I>(&self) -> Result<crate::builder::ScanBuilder<I::Base, B>>
    where
        I: crate::entity::IndexOf,
    {
        let schema = self.init_schema::<I::Base>()?;
        if schema.index(I::INDEX_NAME).is_none() {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "table {:?} has no index {:?}",
                schema.name,
                I::INDEX_NAME
            )));
        }
        Ok(crate::builder::ScanBuilder::new(
            self.clone(),
            schema,
            Some(I::INDEX_NAME),
        ))
    }

    /// Stamps each of `items`' hash-key field with `parent_hash` and
    /// batch-puts them (`spec.md` §4.4 `putRelated`). `T`'s table must
    /// have a range key, since a hash-only table could hold only one
    /// child per parent.
    pub async fn put_related<T: Entity>(&self, parent_hash: impl Encodable, mut items: Vec<T>) -> Result<()> {
        let schema = self.init_schema::<T>()?;
        if schema.range_key().is_none() {
            return Err(ErrorKind::Schema.with_context(format_args!(
                "table {:?} has no range key; put_related requires one to distinguish children of the same parent",
                schema.name
            )));
        }
        let hash_value = parent_hash.encode()?;
        let hash_field = schema.hash_key().name;
        let accessor = T::fields()
            .iter()
            .find(|f| f.name == hash_field)
            .expect("Entity::table_schema invariant: hash key is always present in fields()");
        for item in &mut items {
            (accessor.set)(item, &hash_value)
                .map_err(|e| ErrorKind::Encoding.with_context(format_args!("field {:?}: {e}", accessor.name)))?;
        }
        self.put_items(&items).await
    }

    /// Starts a query over every child of `parent_hash` (`spec.md` §4.4
    /// `getRelated`): a lazy sequence against `T`'s base table with the
    /// key condition fixed to `hash_key = parent_hash`.
    pub fn get_related<T: Entity>(&self, parent_hash: impl Encodable) -> Result<crate::builder::QueryBuilder<T, B>> {
        let schema = self.init_schema::<T>()?;
        let hash_field = schema.hash_key().name.to_string();
        let condition = Predicate::Eq(hash_field, parent_hash.encode()?);
        Ok(crate::builder::QueryBuilder::new(self.clone(), schema, None).key_condition(condition))
    }
}

/// Placeholder for a future pagination helper; kept separate so
/// `client.rs` does not need to know the iterator's internal state
/// machine (see [`crate::iter`]).
#[allow(dead_code)]
fn _assert_send_sync<B: Backend>()
where
    DynamoMapper<B>: Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;
    use crate::entity::{DbType, FieldAccessor};

    #[derive(Default, Debug, PartialEq, Eq)]
    struct Widget {
        id: i64,
        name: String,
    }

    impl Entity for Widget {
        const TABLE_NAME: &'static str = "client_tests_widget";

        fn fields() -> &'static [FieldAccessor<Self>] {
            static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<Widget>>> =
                once_cell::sync::Lazy::new(|| {
                    vec![
                        FieldAccessor {
                            name: "Id",
                            db_type: DbType::Number,
                            is_hash_key: true,
                            is_range_key: false,
                            get: |v| crate::codec::Encodable::encode(&v.id),
                            set: |v, a| {
                                v.id = crate::codec::Encodable::decode(a)?;
                                Ok(())
                            },
                        },
                        FieldAccessor {
                            name: "Name",
                            db_type: DbType::String,
                            is_hash_key: false,
                            is_range_key: false,
                            get: |v| crate::codec::Encodable::encode(&v.name),
                            set: |v, a| {
                                v.name = crate::codec::Encodable::decode(a)?;
                                Ok(())
                            },
                        },
                    ]
                });
            &FIELDS
        }
    }

    fn mapper() -> DynamoMapper<FakeBackend> {
        DynamoMapper::with_backend(FakeBackend::new(), ClientConfig::default())
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let mapper = mapper();
        let widget = Widget {
            id: 1,
            name: "bolt".to_string(),
        };
        mapper.put_item(&widget).await.unwrap();
        let fetched: Option<Widget> = mapper.get_item(Key::hash(1i64).unwrap()).await.unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn get_missing_item_returns_none() {
        let mapper = mapper();
        let fetched: Option<Widget> = mapper.get_item(Key::hash(99i64).unwrap()).await.unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn put_item_if_fails_closed_on_condition_mismatch() {
        let mapper = mapper();
        let widget = Widget {
            id: 2,
            name: "nut".to_string(),
        };
        mapper.put_item(&widget).await.unwrap();
        let ok = mapper
            .put_item_if(&widget, &Predicate::attribute_not_exists("Id"))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn increment_adds_delta_and_returns_new_value() {
        let mapper = mapper();
        mapper
            .put_item(&Widget {
                id: 3,
                name: "washer".to_string(),
            })
            .await
            .unwrap();
        let value = mapper
            .increment::<Widget>(Key::hash(3i64).unwrap(), "Id", 10)
            .await
            .unwrap();
        assert_eq!(value, 13);
    }

    #[tokio::test]
    async fn batch_put_and_get_round_trips() {
        let mapper = mapper();
        let widgets: Vec<Widget> = (0..5)
            .map(|i| Widget {
                id: i,
                name: format!("w{i}"),
            })
            .collect();
        mapper.put_items(&widgets).await.unwrap();
        let keys = (0..5).map(|i| Key::hash(i).unwrap()).collect();
        let mut fetched: Vec<Widget> = mapper.get_items(keys).await.unwrap();
        fetched.sort_by_key(|w| w.id);
        assert_eq!(fetched, widgets);
    }

    #[derive(Default, Debug, Clone, PartialEq, Eq)]
    struct Part {
        widget_id: i64,
        part_id: i64,
        label: String,
    }

    impl Entity for Part {
        const TABLE_NAME: &'static str = "client_tests_part";

        fn fields() -> &'static [FieldAccessor<Self>] {
            static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<Part>>> = once_cell::sync::Lazy::new(|| {
                vec![
                    FieldAccessor {
                        name: "WidgetId",
                        db_type: DbType::Number,
                        is_hash_key: true,
                        is_range_key: false,
                        get: |v| crate::codec::Encodable::encode(&v.widget_id),
                        set: |v, a| {
                            v.widget_id = crate::codec::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "PartId",
                        db_type: DbType::Number,
                        is_hash_key: false,
                        is_range_key: true,
                        get: |v| crate::codec::Encodable::encode(&v.part_id),
                        set: |v, a| {
                            v.part_id = crate::codec::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "Label",
                        db_type: DbType::String,
                        is_hash_key: false,
                        is_range_key: false,
                        get: |v| crate::codec::Encodable::encode(&v.label),
                        set: |v, a| {
                            v.label = crate::codec::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                ]
            });
            &FIELDS
        }
    }

    #[tokio::test]
    async fn put_related_stamps_parent_hash_and_get_related_returns_children() {
        let mapper = mapper();
        let parts = vec![
            Part {
                widget_id: 0,
                part_id: 1,
                label: "bolt".to_string(),
            },
            Part {
                widget_id: 0,
                part_id: 2,
                label: "nut".to_string(),
            },
        ];
        mapper.put_related(7i64, parts).await.unwrap();

        let mut children: Vec<Part> = mapper.get_related::<Part>(7i64).unwrap().exec().await.unwrap();
        children.sort_by_key(|p| p.part_id);
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|p| p.widget_id == 7));
        assert_eq!(children[0].label, "bolt");
        assert_eq!(children[1].label, "nut");
    }

    #[tokio::test]
    async fn put_related_rejects_table_without_range_key() {
        let mapper = mapper();
        let err = mapper
            .put_related::<Widget>(1i64, vec![Widget::default()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[tokio::test]
    async fn client_with_overrides_config_but_shares_backend() {
        let mapper = mapper();
        mapper
            .put_item(&Widget {
                id: 4,
                name: "rivet".to_string(),
            })
            .await
            .unwrap();

        let eventual = mapper.client_with(ClientConfig::default().with_consistent_read(ConsistentRead::Eventual));
        assert_eq!(eventual.config().consistent_read, ConsistentRead::Eventual);

        let fetched: Option<Widget> = eventual.get_item(Key::hash(4i64).unwrap()).await.unwrap();
        assert_eq!(fetched.unwrap().name, "rivet");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mapper = mapper();
        mapper.close();
        mapper.close();
    }
}
