//! The store SDK contract (`spec.md` §6), abstracted behind a trait so
//! the request engine can run against the real store or, in tests, an
//! in-memory double — the same role the teacher's `Connection` trait
//! plays for its wire protocols.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

/// An item's attribute map.
pub type Item = HashMap<String, AttributeValue>;

/// `DescribeTable`'s status, per `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// The table does not exist.
    NotFound,
    /// The table is being created.
    Creating,
    /// The table is being updated (e.g. index creation).
    Updating,
    /// The table is ready to serve requests.
    Active,
    /// The table is being deleted.
    Deleting,
}

/// A key schema attribute: name plus scalar wire type (`S`, `N`, or `B`).
#[derive(Debug, Clone)]
pub struct KeyAttribute {
    /// The attribute's name.
    pub name: String,
    /// The attribute's scalar wire type letter (`"S"`, `"N"`, or `"B"`).
    pub scalar_type: &'static str,
}

/// A `CreateTable` request.
#[derive(Debug, Clone)]
pub struct CreateTableRequest {
    /// The table's name.
    pub table: String,
    /// The table's hash key.
    pub hash_key: KeyAttribute,
    /// The table's range key, if any.
    pub range_key: Option<KeyAttribute>,
    /// Local secondary indexes to create alongside the table.
    pub local_indexes: Vec<crate::entity::IndexSchema>,
    /// Global secondary indexes to create alongside the table.
    pub global_indexes: Vec<crate::entity::IndexSchema>,
    /// Provisioned read capacity.
    pub read_capacity: i64,
    /// Provisioned write capacity.
    pub write_capacity: i64,
}

/// A `GetItem` request.
#[derive(Debug, Clone, Default)]
pub struct GetItemRequest {
    /// The table to read from.
    pub table: String,
    /// The item's primary key.
    pub key: Item,
    /// Whether to request a strongly consistent read.
    pub consistent_read: bool,
}

/// A `PutItem` request.
#[derive(Debug, Clone, Default)]
pub struct PutItemRequest {
    /// The table to write to.
    pub table: String,
    /// The full item to write.
    pub item: Item,
    /// An optional `ConditionExpression`.
    pub condition_expression: Option<String>,
    /// Names referenced by `condition_expression`.
    pub expression_attribute_names: HashMap<String, String>,
    /// Values referenced by `condition_expression`.
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// A `DeleteItem` request.
#[derive(Debug, Clone, Default)]
pub struct DeleteItemRequest {
    /// The table to delete from.
    pub table: String,
    /// The item's primary key.
    pub key: Item,
    /// An optional `ConditionExpression`.
    pub condition_expression: Option<String>,
    /// Names referenced by `condition_expression`.
    pub expression_attribute_names: HashMap<String, String>,
    /// Values referenced by `condition_expression`.
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// An `UpdateItem` request.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemRequest {
    /// The table to update.
    pub table: String,
    /// The item's primary key.
    pub key: Item,
    /// The `UpdateExpression`.
    pub update_expression: String,
    /// Names referenced by the update or condition expression.
    pub expression_attribute_names: HashMap<String, String>,
    /// Values referenced by the update or condition expression.
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// A `BatchGetItem` request, scoped to a single table (the engine never
/// mixes tables in one logical call).
#[derive(Debug, Clone, Default)]
pub struct BatchGetRequest {
    /// The table to read from.
    pub table: String,
    /// The keys to fetch, at most [`crate::config::BATCH_GET_LIMIT`].
    pub keys: Vec<Item>,
    /// Whether to request strongly consistent reads.
    pub consistent_read: bool,
}

/// A `BatchGetItem` response.
#[derive(Debug, Clone, Default)]
pub struct BatchGetResponse {
    /// Items returned this round.
    pub items: Vec<Item>,
    /// Keys the store did not process and that must be resubmitted.
    pub unprocessed_keys: Vec<Item>,
}

/// One write in a `BatchWriteItem` request.
#[derive(Debug, Clone)]
pub enum BatchWrite {
    /// A `PutRequest`.
    Put(Item),
    /// A `DeleteRequest`.
    Delete(Item),
}

/// A `BatchWriteItem` request, scoped to a single table.
#[derive(Debug, Clone, Default)]
pub struct BatchWriteRequest {
    /// The table to write to.
    pub table: String,
    /// The writes to perform, at most [`crate::config::BATCH_WRITE_LIMIT`].
    pub writes: Vec<BatchWrite>,
}

/// A `BatchWriteItem` response.
#[derive(Debug, Clone, Default)]
pub struct BatchWriteResponse {
    /// Writes the store did not process and that must be resubmitted.
    pub unprocessed: Vec<BatchWrite>,
}

/// A `Query` or `Scan` request. `key_condition_expression` is `None` for
/// a scan.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// The table to read from.
    pub table: String,
    /// The secondary index to read from, if any.
    pub index_name: Option<String>,
    /// `KeyConditionExpression`; present only for queries.
    pub key_condition_expression: Option<String>,
    /// `FilterExpression`, if any.
    pub filter_expression: Option<String>,
    /// `ProjectionExpression`, if any.
    pub projection_expression: Option<String>,
    /// Names referenced by the above expressions.
    pub expression_attribute_names: HashMap<String, String>,
    /// Values referenced by the above expressions.
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    /// Whether to request a strongly consistent read.
    pub consistent_read: bool,
    /// Ascending (`true`) or descending (`false`) order by range key.
    /// Meaningful for queries only; the store does not support ordering
    /// a scan.
    pub scan_index_forward: bool,
    /// Page size (`Limit`).
    pub limit: Option<i32>,
    /// Cursor from a previous page's `LastEvaluatedKey`.
    pub exclusive_start_key: Option<Item>,
}

/// A `Query` or `Scan` response.
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    /// Items returned this page.
    pub items: Vec<Item>,
    /// Opaque cursor for the next page; `None` when paging is complete.
    pub last_evaluated_key: Option<Item>,
}

/// The store SDK contract this engine depends on.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// `ListTables`.
    async fn list_tables(&self) -> Result<Vec<String>>;
    /// `CreateTable`.
    async fn create_table(&self, request: CreateTableRequest) -> Result<()>;
    /// `DeleteTable`.
    async fn delete_table(&self, table: &str) -> Result<()>;
    /// `DescribeTable`, reduced to the status the engine polls on.
    async fn describe_table_status(&self, table: &str) -> Result<TableStatus>;
    /// `GetItem`.
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>>;
    /// `PutItem`.
    async fn put_item(&self, request: PutItemRequest) -> Result<()>;
    /// `DeleteItem`, returning the deleted item's attributes if it
    /// existed.
    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>>;
    /// `UpdateItem`, returning the item's attributes after the update.
    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item>;
    /// `BatchGetItem`.
    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetResponse>;
    /// `BatchWriteItem`.
    async fn batch_write_item(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse>;
    /// `Query`.
    async fn query(&self, request: PageRequest) -> Result<PageResponse>;
    /// `Scan`.
    async fn scan(&self, request: PageRequest) -> Result<PageResponse>;
}

fn names_or_none(names: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    if names.is_empty() {
        None
    } else {
        Some(names.clone())
    }
}

fn values_or_none(
    values: &HashMap<String, AttributeValue>,
) -> Option<HashMap<String, AttributeValue>> {
    if values.is_empty() {
        None
    } else {
        Some(values.clone())
    }
}

#[async_trait]
impl Backend for aws_sdk_dynamodb::Client {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut stream = self.list_tables().into_paginator().items().send();
        use futures::stream::StreamExt;
        while let Some(name) = stream.next().await {
            names.push(name?);
        }
        Ok(names)
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<()> {
        use aws_sdk_dynamodb::types::{
            AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType,
            LocalSecondaryIndex, Projection as AwsProjection, ProjectionType,
            ProvisionedThroughput, ScalarAttributeType,
        };

        fn scalar_type(letter: &str) -> ScalarAttributeType {
            match letter {
                "N" => ScalarAttributeType::N,
                "B" => ScalarAttributeType::B,
                _ => ScalarAttributeType::S,
            }
        }

        fn projection(p: &crate::entity::Projection) -> AwsProjection {
            match p {
                crate::entity::Projection::KeysOnly => AwsProjection::builder()
                    .projection_type(ProjectionType::KeysOnly)
                    .build(),
                crate::entity::Projection::All => {
                    AwsProjection::builder().projection_type(ProjectionType::All).build()
                }
                crate::entity::Projection::Include(fields) => AwsProjection::builder()
                    .projection_type(ProjectionType::Include)
                    .set_non_key_attributes(Some(
                        fields.iter().map(|f| f.to_string()).collect(),
                    ))
                    .build(),
            }
        }

        let mut attribute_definitions = vec![AttributeDefinition::builder()
            .attribute_name(&request.hash_key.name)
            .attribute_type(scalar_type(request.hash_key.scalar_type))
            .build()
            .map_err(|e| ErrorKind::Schema.with_context(e))?];

        let mut key_schema = vec![KeySchemaElement::builder()
            .attribute_name(&request.hash_key.name)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| ErrorKind::Schema.with_context(e))?];

        if let Some(range_key) = &request.range_key {
            attribute_definitions.push(
                AttributeDefinition::builder()
                    .attribute_name(&range_key.name)
                    .attribute_type(scalar_type(range_key.scalar_type))
                    .build()
                    .map_err(|e| ErrorKind::Schema.with_context(e))?,
            );
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(&range_key.name)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(|e| ErrorKind::Schema.with_context(e))?,
            );
        }

        let mut builder = self
            .create_table()
            .table_name(&request.table)
            .set_attribute_definitions(Some(attribute_definitions))
            .set_key_schema(Some(key_schema))
            .provisioned_throughput(
                ProvisionedThroughput::builder()
                    .read_capacity_units(request.read_capacity)
                    .write_capacity_units(request.write_capacity)
                    .build()
                    .map_err(|e| ErrorKind::Schema.with_context(e))?,
            );

        if !request.local_indexes.is_empty() {
            let indexes = request
                .local_indexes
                .iter()
                .map(|idx| {
                    let mut schema = vec![KeySchemaElement::builder()
                        .attribute_name(idx.hash_key)
                        .key_type(KeyType::Hash)
                        .build()
                        .expect("valid key schema")];
                    if let Some(range_key) = idx.range_key {
                        schema.push(
                            KeySchemaElement::builder()
                                .attribute_name(range_key)
                                .key_type(KeyType::Range)
                                .build()
                                .expect("valid key schema"),
                        );
                    }
                    LocalSecondaryIndex::builder()
                        .index_name(idx.name)
                        .set_key_schema(Some(schema))
                        .projection(projection(&idx.projection))
                        .build()
                        .expect("valid local secondary index")
                })
                .collect();
            builder = builder.set_local_secondary_indexes(Some(indexes));
        }

        if !request.global_indexes.is_empty() {
            let indexes = request
                .global_indexes
                .iter()
                .map(|idx| {
                    let mut schema = vec![KeySchemaElement::builder()
                        .attribute_name(idx.hash_key)
                        .key_type(KeyType::Hash)
                        .build()
                        .expect("valid key schema")];
                    if let Some(range_key) = idx.range_key {
                        schema.push(
                            KeySchemaElement::builder()
                                .attribute_name(range_key)
                                .key_type(KeyType::Range)
                                .build()
                                .expect("valid key schema"),
                        );
                    }
                    GlobalSecondaryIndex::builder()
                        .index_name(idx.name)
                        .set_key_schema(Some(schema))
                        .projection(projection(&idx.projection))
                        .provisioned_throughput(
                            ProvisionedThroughput::builder()
                                .read_capacity_units(idx.read_capacity.unwrap_or(request.read_capacity))
                                .write_capacity_units(idx.write_capacity.unwrap_or(request.write_capacity))
                                .build()
                                .expect("valid throughput"),
                        )
                        .build()
                        .expect("valid global secondary index")
                })
                .collect();
            builder = builder.set_global_secondary_indexes(Some(indexes));
        }

        builder.send().await?;
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<()> {
        self.delete_table().table_name(table).send().await?;
        Ok(())
    }

    async fn describe_table_status(&self, table: &str) -> Result<TableStatus> {
        use aws_sdk_dynamodb::types::TableStatus as AwsStatus;
        match self.describe_table().table_name(table).send().await {
            Ok(output) => {
                let status = output
                    .table
                    .and_then(|t| t.table_status)
                    .unwrap_or(AwsStatus::Active);
                Ok(match status {
                    AwsStatus::Creating => TableStatus::Creating,
                    AwsStatus::Updating => TableStatus::Updating,
                    AwsStatus::Deleting => TableStatus::Deleting,
                    _ => TableStatus::Active,
                })
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false)
                {
                    Ok(TableStatus::NotFound)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        let output = self
            .get_item()
            .table_name(request.table)
            .set_key(Some(request.key))
            .consistent_read(request.consistent_read)
            .send()
            .await?;
        Ok(output.item)
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        self.put_item()
            .table_name(request.table)
            .set_item(Some(request.item))
            .set_condition_expression(request.condition_expression)
            .set_expression_attribute_names(names_or_none(&request.expression_attribute_names))
            .set_expression_attribute_values(values_or_none(&request.expression_attribute_values))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        use aws_sdk_dynamodb::types::ReturnValue;
        let output = self
            .delete_item()
            .table_name(request.table)
            .set_key(Some(request.key))
            .set_condition_expression(request.condition_expression)
            .set_expression_attribute_names(names_or_none(&request.expression_attribute_names))
            .set_expression_attribute_values(values_or_none(&request.expression_attribute_values))
            .return_values(ReturnValue::AllOld)
            .send()
            .await?;
        Ok(output.attributes)
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        use aws_sdk_dynamodb::types::ReturnValue;
        let output = self
            .update_item()
            .table_name(request.table)
            .set_key(Some(request.key))
            .update_expression(request.update_expression)
            .set_expression_attribute_names(names_or_none(&request.expression_attribute_names))
            .set_expression_attribute_values(values_or_none(&request.expression_attribute_values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await?;
        Ok(output.attributes.unwrap_or_default())
    }

    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetResponse> {
        use aws_sdk_dynamodb::types::KeysAndAttributes;

        let keys_and_attrs = KeysAndAttributes::builder()
            .set_keys(Some(request.keys))
            .consistent_read(request.consistent_read)
            .build()
            .map_err(|e| ErrorKind::PermanentStore.with_context(e))?;

        let mut request_items = HashMap::new();
        request_items.insert(request.table.clone(), keys_and_attrs);

        let output = self
            .batch_get_item()
            .set_request_items(Some(request_items))
            .send()
            .await?;

        let items = output
            .responses
            .and_then(|mut r| r.remove(&request.table))
            .unwrap_or_default();

        let unprocessed_keys = output
            .unprocessed_keys
            .and_then(|mut u| u.remove(&request.table))
            .and_then(|k| k.keys)
            .unwrap_or_default();

        Ok(BatchGetResponse {
            items,
            unprocessed_keys,
        })
    }

    async fn batch_write_item(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse> {
        use aws_sdk_dynamodb::types::{DeleteRequest, PutRequest, WriteRequest};

        let writes = request
            .writes
            .iter()
            .map(|w| match w {
                BatchWrite::Put(item) => WriteRequest::builder()
                    .put_request(
                        PutRequest::builder()
                            .set_item(Some(item.clone()))
                            .build()
                            .expect("valid put request"),
                    )
                    .build(),
                BatchWrite::Delete(key) => WriteRequest::builder()
                    .delete_request(
                        DeleteRequest::builder()
                            .set_key(Some(key.clone()))
                            .build()
                            .expect("valid delete request"),
                    )
                    .build(),
            })
            .collect();

        let mut request_items = HashMap::new();
        request_items.insert(request.table.clone(), writes);

        let output = self
            .batch_write_item()
            .set_request_items(Some(request_items))
            .send()
            .await?;

        let unprocessed = output
            .unprocessed_items
            .and_then(|mut u| u.remove(&request.table))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|w| {
                if let Some(put) = w.put_request {
                    put.item.map(BatchWrite::Put)
                } else {
                    w.delete_request.and_then(|d| d.key).map(BatchWrite::Delete)
                }
            })
            .collect();

        Ok(BatchWriteResponse { unprocessed })
    }

    async fn query(&self, request: PageRequest) -> Result<PageResponse> {
        let output = self
            .query()
            .table_name(request.table)
            .set_index_name(request.index_name)
            .set_key_condition_expression(request.key_condition_expression)
            .set_filter_expression(request.filter_expression)
            .set_projection_expression(request.projection_expression)
            .set_expression_attribute_names(names_or_none(&request.expression_attribute_names))
            .set_expression_attribute_values(values_or_none(&request.expression_attribute_values))
            .consistent_read(request.consistent_read)
            .scan_index_forward(request.scan_index_forward)
            .set_limit(request.limit)
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await?;
        Ok(PageResponse {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }

    async fn scan(&self, request: PageRequest) -> Result<PageResponse> {
        let output = self
            .scan()
            .table_name(request.table)
            .set_index_name(request.index_name)
            .set_filter_expression(request.filter_expression)
            .set_projection_expression(request.projection_expression)
            .set_expression_attribute_names(names_or_none(&request.expression_attribute_names))
            .set_expression_attribute_values(values_or_none(&request.expression_attribute_values))
            .consistent_read(request.consistent_read)
            .set_limit(request.limit)
            .set_exclusive_start_key(request.exclusive_start_key)
            .send()
            .await?;
        Ok(PageResponse {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }
}

/// An in-memory [`Backend`], for unit tests of code built on
/// [`crate::client::DynamoMapper`] without a live store.
///
/// Tables are schemaless here — `create_table` just remembers the name
/// exists, and item lookups match by whichever key attributes a request
/// supplies rather than by a declared hash/range schema, since the fake
/// has no need for the provisioning detail a real table requires.
pub struct FakeBackend {
    tables: std::sync::RwLock<HashMap<String, Vec<Item>>>,
}

impl FakeBackend {
    /// Builds an empty fake store.
    pub fn new() -> Self {
        Self {
            tables: std::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn key_matches(item: &Item, key: &Item) -> bool {
    key.iter().all(|(k, v)| item.get(k) == Some(v))
}

/// A minimal evaluator for the subset of condition-expression syntax our
/// own [`crate::expr::compiler`] emits: `attribute_exists`/
/// `attribute_not_exists`, the six comparison operators, and `AND`/`OR`/
/// `NOT` composition. Good enough for a test double; not a general
/// expression parser.
fn eval_condition(
    expr: &str,
    aliases: &HashMap<String, String>,
    params: &HashMap<String, AttributeValue>,
    item: Option<&Item>,
) -> bool {
    let expr = expr.trim();

    if let Some(stripped) = expr.strip_prefix("NOT ") {
        return !eval_condition(unwrap_parens(stripped.trim()), aliases, params, item);
    }

    // `field BETWEEN low AND high` is the one leaf the compiler emits with
    // an un-parenthesized top-level " AND " (every `And`/`Or` combinator
    // wraps both sides in parens), so it has to be recognized before the
    // generic AND-split below mistakes the bound for a second conjunct.
    if let Some(result) = eval_between(expr, aliases, params, item) {
        return result;
    }

    if let Some((left, right)) = split_top_level(expr, " AND ") {
        return eval_condition(left, aliases, params, item)
            && eval_condition(right, aliases, params, item);
    }
    if let Some((left, right)) = split_top_level(expr, " OR ") {
        return eval_condition(left, aliases, params, item)
            || eval_condition(right, aliases, params, item);
    }

    let expr = unwrap_parens(expr);

    if let Some(name) = expr
        .strip_prefix("attribute_not_exists(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let resolved = aliases.get(name).map(String::as_str).unwrap_or(name);
        return item.map(|i| !i.contains_key(resolved)).unwrap_or(true);
    }
    if let Some(name) = expr
        .strip_prefix("attribute_exists(")
        .and_then(|s| s.strip_suffix(')'))
    {
        let resolved = aliases.get(name).map(String::as_str).unwrap_or(name);
        return item.map(|i| i.contains_key(resolved)).unwrap_or(false);
    }
    if let Some(args) = expr.strip_prefix("begins_with(").and_then(|s| s.strip_suffix(')')) {
        let Some((name, value)) = args.split_once(", ") else { return false };
        let resolved = aliases.get(name.trim()).map(String::as_str).unwrap_or(name.trim());
        return match (item.and_then(|i| i.get(resolved)), params.get(value.trim())) {
            (Some(AttributeValue::S(actual)), Some(AttributeValue::S(prefix))) => actual.starts_with(prefix.as_str()),
            _ => false,
        };
    }
    if let Some(args) = expr.strip_prefix("contains(").and_then(|s| s.strip_suffix(')')) {
        let Some((name, value)) = args.split_once(", ") else { return false };
        let resolved = aliases.get(name.trim()).map(String::as_str).unwrap_or(name.trim());
        return match (item.and_then(|i| i.get(resolved)), params.get(value.trim())) {
            (Some(AttributeValue::S(actual)), Some(AttributeValue::S(needle))) => actual.contains(needle.as_str()),
            (Some(AttributeValue::Ss(actual)), Some(expected)) => actual.iter().any(|s| AttributeValue::S(s.clone()) == *expected),
            (Some(AttributeValue::L(actual)), Some(expected)) => actual.contains(expected),
            _ => false,
        };
    }
    if let Some(idx) = expr.find(" IN (") {
        if let Some(inner) = expr.strip_suffix(')').map(|s| &s[idx + " IN (".len()..]) {
            let name = &expr[..idx];
            let resolved = aliases.get(name.trim()).map(String::as_str).unwrap_or(name.trim());
            return match item.and_then(|i| i.get(resolved)) {
                Some(actual) => inner
                    .split(", ")
                    .any(|placeholder| params.get(placeholder.trim()) == Some(actual)),
                None => false,
            };
        }
    }

    for op in ["<>", "<=", ">=", "=", "<", ">"] {
        let needle = format!(" {op} ");
        if let Some(idx) = expr.find(&needle) {
            let (name, rest) = expr.split_at(idx);
            let value_placeholder = rest[needle.len()..].trim();
            let resolved = aliases.get(name.trim()).map(String::as_str).unwrap_or(name.trim());
            let expected = params.get(value_placeholder);
            let actual = item.and_then(|i| i.get(resolved));
            return match (actual, expected) {
                (Some(a), Some(e)) => match op {
                    "=" => a == e,
                    "<>" => a != e,
                    _ => compare_attr(a, e)
                        .map(|ord| match op {
                            "<" => ord.is_lt(),
                            "<=" => ord.is_le(),
                            ">" => ord.is_gt(),
                            ">=" => ord.is_ge(),
                            _ => unreachable!(),
                        })
                        .unwrap_or(false),
                },
                _ => false,
            };
        }
    }

    false
}

fn eval_between(
    expr: &str,
    aliases: &HashMap<String, String>,
    params: &HashMap<String, AttributeValue>,
    item: Option<&Item>,
) -> Option<bool> {
    let (name, rest) = split_top_level(expr, " BETWEEN ")?;
    let (low, high) = rest.split_once(" AND ")?;
    let resolved = aliases.get(name.trim()).map(String::as_str).unwrap_or(name.trim());
    let bounded = (|| {
        let actual = item?.get(resolved)?;
        let low = params.get(low.trim())?;
        let high = params.get(high.trim())?;
        Some(compare_attr(actual, low)?.is_ge() && compare_attr(actual, high)?.is_le())
    })();
    Some(bounded.unwrap_or(false))
}

fn compare_attr(a: &AttributeValue, b: &AttributeValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (AttributeValue::N(x), AttributeValue::N(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.parse::<f64>().ok()?),
        (AttributeValue::S(x), AttributeValue::S(y)) => Some(x.cmp(y)),
        (AttributeValue::B(x), AttributeValue::B(y)) => Some(x.as_ref().cmp(y.as_ref())),
        _ => None,
    }
}

fn unwrap_parens(expr: &str) -> &str {
    let expr = expr.trim();
    if expr.starts_with('(') && expr.ends_with(')') && balanced(&expr[1..expr.len() - 1]) {
        expr[1..expr.len() - 1].trim()
    } else {
        expr
    }
}

fn balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    for c in expr.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn split_top_level<'a>(expr: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let mut depth = 0i32;
    let bytes = expr.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && expr[i..].starts_with(sep) {
            return Some((&expr[..i], &expr[i + sep_bytes.len()..]));
        }
        i += 1;
    }
    None
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.read().expect("lock poisoned").keys().cloned().collect())
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<()> {
        self.tables
            .write()
            .expect("lock poisoned")
            .entry(request.table)
            .or_default();
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<()> {
        self.tables.write().expect("lock poisoned").remove(table);
        Ok(())
    }

    async fn describe_table_status(&self, table: &str) -> Result<TableStatus> {
        Ok(if self.tables.read().expect("lock poisoned").contains_key(table) {
            TableStatus::Active
        } else {
            TableStatus::NotFound
        })
    }

    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        let tables = self.tables.read().expect("lock poisoned");
        let found = tables
            .get(&request.table)
            .and_then(|items| items.iter().find(|item| key_matches(item, &request.key)))
            .cloned();
        Ok(found)
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<()> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let items = tables.entry(request.table).or_default();
        let existing = items.iter().find(|item| key_matches(item, &request.item));
        if let Some(expr) = &request.condition_expression {
            if !eval_condition(
                expr,
                &request.expression_attribute_names,
                &request.expression_attribute_values,
                existing,
            ) {
                return Err(ErrorKind::PermanentStore.with_message(
                    "ConditionalCheckFailedException: the conditional request failed",
                ));
            }
        }
        items.retain(|item| !key_matches(item, &request.item));
        items.push(request.item);
        Ok(())
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<Option<Item>> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let items = tables.entry(request.table).or_default();
        let existing = items
            .iter()
            .find(|item| key_matches(item, &request.key))
            .cloned();
        if let Some(expr) = &request.condition_expression {
            if !eval_condition(
                expr,
                &request.expression_attribute_names,
                &request.expression_attribute_values,
                existing.as_ref(),
            ) {
                return Err(ErrorKind::PermanentStore.with_message(
                    "ConditionalCheckFailedException: the conditional request failed",
                ));
            }
        }
        items.retain(|item| !key_matches(item, &request.key));
        Ok(existing)
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let items = tables.entry(request.table).or_default();
        let mut item = items
            .iter()
            .position(|item| key_matches(item, &request.key))
            .map(|idx| items.remove(idx))
            .unwrap_or_else(|| request.key.clone());

        apply_update_expression(
            &mut item,
            &request.update_expression,
            &request.expression_attribute_names,
            &request.expression_attribute_values,
        )?;

        items.push(item.clone());
        Ok(item)
    }

    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetResponse> {
        let tables = self.tables.read().expect("lock poisoned");
        let items = tables.get(&request.table);
        let found = request
            .keys
            .iter()
            .filter_map(|key| items.and_then(|items| items.iter().find(|item| key_matches(item, key))).cloned())
            .collect();
        Ok(BatchGetResponse {
            items: found,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn batch_write_item(&self, request: BatchWriteRequest) -> Result<BatchWriteResponse> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let items = tables.entry(request.table).or_default();
        for write in request.writes {
            match write {
                BatchWrite::Put(item) => {
                    items.retain(|existing| !key_matches(existing, &item));
                    items.push(item);
                }
                BatchWrite::Delete(key) => {
                    items.retain(|existing| !key_matches(existing, &key));
                }
            }
        }
        Ok(BatchWriteResponse {
            unprocessed: Vec::new(),
        })
    }

    async fn query(&self, request: PageRequest) -> Result<PageResponse> {
        let tables = self.tables.read().expect("lock poisoned");
        let items = tables.get(&request.table).cloned().unwrap_or_default();
        drop(tables);
        let matches = |item: &Item, expr: &Option<String>| {
            expr.as_ref()
                .map(|expr| {
                    eval_condition(
                        expr,
                        &request.expression_attribute_names,
                        &request.expression_attribute_values,
                        Some(item),
                    )
                })
                .unwrap_or(true)
        };
        let filtered = items
            .into_iter()
            .filter(|item| matches(item, &request.key_condition_expression))
            .filter(|item| matches(item, &request.filter_expression))
            .collect();
        Ok(PageResponse {
            items: filtered,
            last_evaluated_key: None,
        })
    }

    async fn scan(&self, request: PageRequest) -> Result<PageResponse> {
        let tables = self.tables.read().expect("lock poisoned");
        let items = tables.get(&request.table).cloned().unwrap_or_default();
        let filtered = if let Some(expr) = &request.filter_expression {
            items
                .into_iter()
                .filter(|item| {
                    eval_condition(
                        expr,
                        &request.expression_attribute_names,
                        &request.expression_attribute_values,
                        Some(item),
                    )
                })
                .collect()
        } else {
            items
        };
        Ok(PageResponse {
            items: filtered,
            last_evaluated_key: None,
        })
    }
}

fn apply_update_expression(
    item: &mut Item,
    update_expression: &str,
    aliases: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
) -> Result<()> {
    let rest = update_expression
        .strip_prefix("ADD ")
        .ok_or_else(|| ErrorKind::Expression.with_message("FakeBackend only supports ADD update expressions"))?;
    let mut parts = rest.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| ErrorKind::Expression.with_message("malformed ADD expression"))?;
    let value_placeholder = parts
        .next()
        .ok_or_else(|| ErrorKind::Expression.with_message("malformed ADD expression"))?;
    let resolved = aliases.get(name).map(String::as_str).unwrap_or(name);
    let delta = values
        .get(value_placeholder)
        .ok_or_else(|| ErrorKind::Expression.with_message("ADD value placeholder not bound"))?;

    let delta_n: i64 = match delta {
        AttributeValue::N(s) => s.parse().map_err(|e| {
            ErrorKind::Encoding.with_context(format_args!("ADD delta is not numeric: {e}"))
        })?,
        other => {
            return Err(ErrorKind::Encoding.with_context(format_args!(
                "ADD only supports numeric deltas, found {other:?}"
            )))
        }
    };

    let current: i64 = match item.get(resolved) {
        Some(AttributeValue::N(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };

    item.insert(resolved.to_string(), AttributeValue::N((current + delta_n).to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = FakeBackend::new();
        let table = "widgets".to_string();
        let key = item(&[("Id", AttributeValue::N("1".to_string()))]);
        let full = item(&[
            ("Id", AttributeValue::N("1".to_string())),
            ("Name", AttributeValue::S("bolt".to_string())),
        ]);
        backend
            .put_item(PutItemRequest {
                table: table.clone(),
                item: full.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        let fetched = backend
            .get_item(GetItemRequest {
                table,
                key,
                consistent_read: true,
            })
            .await
            .unwrap();
        assert_eq!(fetched, Some(full));
    }

    #[tokio::test]
    async fn condition_blocks_overwrite_when_attribute_exists() {
        let backend = FakeBackend::new();
        let table = "widgets".to_string();
        let full = item(&[("Id", AttributeValue::N("1".to_string()))]);
        backend
            .put_item(PutItemRequest {
                table: table.clone(),
                item: full.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut aliases = HashMap::new();
        aliases.insert("#n0".to_string(), "Id".to_string());
        let err = backend
            .put_item(PutItemRequest {
                table,
                item: full,
                condition_expression: Some("attribute_not_exists(#n0)".to_string()),
                expression_attribute_names: aliases,
                expression_attribute_values: HashMap::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentStore);
    }

    #[tokio::test]
    async fn query_applies_both_key_condition_and_filter() {
        let backend = FakeBackend::new();
        let table = "orders".to_string();
        for (customer, total) in [(7, 50), (7, 150), (8, 500)] {
            backend
                .put_item(PutItemRequest {
                    table: table.clone(),
                    item: item(&[
                        ("CustomerId", AttributeValue::N(customer.to_string())),
                        ("Total", AttributeValue::N(total.to_string())),
                    ]),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let mut aliases = HashMap::new();
        aliases.insert("#k0".to_string(), "CustomerId".to_string());
        aliases.insert("#f0".to_string(), "Total".to_string());
        let mut values = HashMap::new();
        values.insert(":k0".to_string(), AttributeValue::N("7".to_string()));
        values.insert(":f0".to_string(), AttributeValue::N("100".to_string()));

        let response = backend
            .query(PageRequest {
                table,
                key_condition_expression: Some("#k0 = :k0".to_string()),
                filter_expression: Some("#f0 > :f0".to_string()),
                expression_attribute_names: aliases,
                expression_attribute_values: values,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.items.len(), 1);
    }

    #[test]
    fn eval_condition_handles_between_without_mistaking_its_and_for_a_conjunct() {
        let mut aliases = HashMap::new();
        aliases.insert("#n0".to_string(), "Total".to_string());
        let mut params = HashMap::new();
        params.insert(":p0".to_string(), AttributeValue::N("100".to_string()));
        params.insert(":p1".to_string(), AttributeValue::N("200".to_string()));
        let row = item(&[("Total", AttributeValue::N("150".to_string()))]);

        assert!(eval_condition("#n0 BETWEEN :p0 AND :p1", &aliases, &params, Some(&row)));

        let outside = item(&[("Total", AttributeValue::N("300".to_string()))]);
        assert!(!eval_condition("#n0 BETWEEN :p0 AND :p1", &aliases, &params, Some(&outside)));
    }
}
