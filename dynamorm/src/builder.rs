//! Fluent typed query/scan builders (`spec.md` §5), in the
//! `IntoFuture`-driven style the teacher's `method::select::Select`
//! uses for its own fluent reads.

use crate::backend::{Backend, PageRequest};
use crate::client::DynamoMapper;
use crate::codec::Encodable;
use crate::config::ConsistentRead;
use crate::entity::{Entity, TableSchema};
use crate::error::{ErrorKind, Result};
use crate::expr::{compile, Predicate};
use crate::iter::Pager;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

enum Projection {
    FullModel,
    Fields(Vec<String>),
}

struct Shared<T: Entity, B: Backend> {
    mapper: DynamoMapper<B>,
    schema: Arc<TableSchema>,
    index: Option<String>,
    filter: Option<Predicate>,
    projection: Projection,
    consistent_read: Option<ConsistentRead>,
    paging_limit: Option<i32>,
    _marker: PhantomData<T>,
}

impl<T: Entity, B: Backend> Clone for Shared<T, B> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            schema: Arc::clone(&self.schema),
            index: self.index.clone(),
            filter: self.filter.clone(),
            projection: match &self.projection {
                Projection::FullModel => Projection::FullModel,
                Projection::Fields(f) => Projection::Fields(f.clone()),
            },
            consistent_read: self.consistent_read,
            paging_limit: self.paging_limit,
            _marker: PhantomData,
        }
    }
}

impl<T: Entity, B: Backend> Shared<T, B> {
    fn new(mapper: DynamoMapper<B>, schema: Arc<TableSchema>, index: Option<&'static str>) -> Self {
        Self {
            mapper,
            schema,
            index: index.map(str::to_string),
            filter: None,
            projection: Projection::FullModel,
            consistent_read: None,
            paging_limit: None,
            _marker: PhantomData,
        }
    }

    fn projection_expression(&self) -> Option<(String, std::collections::HashMap<String, String>)> {
        match &self.projection {
            Projection::FullModel => None,
            Projection::Fields(fields) => {
                let mut aliases = std::collections::HashMap::new();
                let parts: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        let placeholder = format!("#proj{i}");
                        aliases.insert(placeholder.clone(), f.clone());
                        placeholder
                    })
                    .collect();
                Some((parts.join(", "), aliases))
            }
        }
    }

    fn consistent_read_bool(&self) -> bool {
        self.consistent_read.unwrap_or(self.mapper.config().consistent_read) == ConsistentRead::Strong
    }

    fn page_size(&self) -> i32 {
        self.paging_limit.unwrap_or(self.mapper.config().paging_limit)
    }

    /// AND-joins `predicate` onto any filter set by a previous call,
    /// rather than overwriting it (`spec.md` §4.5 "compile and append").
    fn add_filter(&mut self, predicate: Predicate) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    /// Projects onto the intersection of `M`'s fields and this table's own
    /// fields (`spec.md` §4.5 `select<TModel>()`).
    fn select_fields_for<M: Entity>(&mut self) {
        let table_fields: std::collections::HashSet<&str> =
            self.schema.fields.iter().map(|f| f.name).collect();
        let fields = M::fields()
            .iter()
            .map(|f| f.name)
            .filter(|name| table_fields.contains(name))
            .map(str::to_string)
            .collect();
        self.projection = Projection::Fields(fields);
    }

    /// Projects onto every field of this table (`spec.md` §4.5
    /// `selectTableFields()`), useful paired with an index that only
    /// projects a subset of them.
    fn select_all_table_fields(&mut self) {
        self.projection = Projection::Fields(self.schema.fields.iter().map(|f| f.name.to_string()).collect());
    }
}

/// Resolves the secondary index a [`Predicate`] referencing exactly one
/// field routes through, for `local_index` when no index name is given
/// explicitly (`spec.md` §4.5).
fn resolve_local_index(schema: &TableSchema, referenced_fields: &[String]) -> Result<String> {
    let [field] = referenced_fields else {
        return Err(ErrorKind::Schema.with_message(
            "local_index without an explicit name requires the predicate to reference exactly one field",
        ));
    };
    schema
        .local_indexes
        .iter()
        .chain(schema.global_indexes.iter())
        .find(|idx| idx.hash_key == field || idx.range_key == Some(field.as_str()))
        .map(|idx| idx.name.to_string())
        .ok_or_else(|| {
            ErrorKind::Schema.with_context(format_args!(
                "field {field:?} does not resolve to an index on table {:?}",
                schema.name
            ))
        })
}

/// A fluent, lazily-executed query against a base table or a secondary
/// index (`spec.md` §5 "Query builder").
pub struct QueryBuilder<T: Entity, B: Backend = aws_sdk_dynamodb::Client> {
    shared: Shared<T, B>,
    key_condition: Option<Predicate>,
    scan_index_forward: Option<bool>,
}

impl<T: Entity, B: Backend> Clone for QueryBuilder<T, B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            key_condition: self.key_condition.clone(),
            scan_index_forward: self.scan_index_forward,
        }
    }
}

impl<T: Entity, B: Backend> QueryBuilder<T, B> {
    pub(crate) fn new(mapper: DynamoMapper<B>, schema: Arc<TableSchema>, index: Option<&'static str>) -> Self {
        Self {
            shared: Shared::new(mapper, schema, index),
            key_condition: None,
            scan_index_forward: None,
        }
    }

    /// Adds to the key condition (usually `Predicate::eq(hash_key, v)`,
    /// optionally a range-key comparison), AND-joining with whatever a
    /// previous call set rather than overwriting it. At least one call is
    /// required before `.exec()`.
    #[must_use]
    pub fn key_condition(mut self, predicate: Predicate) -> Self {
        self.key_condition = Some(match self.key_condition.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Routes this query through a local or global secondary index. If
    /// `name` is given it must already exist on the table; otherwise the
    /// index is resolved from the single field `predicate` references
    /// (`spec.md` §4.5 `local_index`). The predicate is also folded into
    /// the key condition, AND-joined with any that was already set.
    pub fn local_index(mut self, predicate: Predicate, name: Option<&str>) -> Result<Self> {
        let compiled = compile(&predicate, &self.shared.schema, "k")?;
        let index_name = match name {
            Some(name) => {
                self.shared.schema.index(name).ok_or_else(|| {
                    ErrorKind::Schema.with_context(format_args!(
                        "table {:?} has no index named {name:?}",
                        self.shared.schema.name
                    ))
                })?;
                name.to_string()
            }
            None => resolve_local_index(&self.shared.schema, &compiled.referenced_fields)?,
        };
        self.shared.index = Some(index_name);
        self.key_condition = Some(match self.key_condition.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        Ok(self)
    }

    /// Adds a filter, applied by the store after the key condition
    /// narrows the partition but before results are returned — it does
    /// not reduce read capacity consumed. AND-joins with any filter a
    /// previous call set.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.shared.add_filter(predicate);
        self
    }

    /// Restricts the returned attributes to `fields` (plus whatever the
    /// index always projects), instead of the full item.
    #[must_use]
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.shared.projection = Projection::Fields(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Projects onto the intersection of `M`'s fields and this table's
    /// own fields, for decoding into a narrower shape via
    /// `exec_into::<M>()` (`spec.md` §4.5 `select<TModel>()`).
    #[must_use]
    pub fn select_model<M: Entity>(mut self) -> Self {
        self.shared.select_fields_for::<M>();
        self
    }

    /// Projects onto every field of this table (`spec.md` §4.5
    /// `selectTableFields()`), useful paired with an index that only
    /// projects a subset of them.
    #[must_use]
    pub fn select_table_fields(mut self) -> Self {
        self.shared.select_all_table_fields();
        self
    }

    /// Returns the full item — undoes a prior [`QueryBuilder::select`],
    /// [`QueryBuilder::select_model`], or [`QueryBuilder::select_table_fields`].
    #[must_use]
    pub fn select_full_item(mut self) -> Self {
        self.shared.projection = Projection::FullModel;
        self
    }

    /// Requests a strongly or eventually consistent read, overriding
    /// [`crate::config::ClientConfig::consistent_read`] for this query.
    #[must_use]
    pub fn consistent_read(mut self, mode: ConsistentRead) -> Self {
        self.shared.consistent_read = Some(mode);
        self
    }

    /// Orders results ascending by range key (the store's default).
    #[must_use]
    pub fn order_by_ascending(mut self) -> Self {
        self.scan_index_forward = Some(true);
        self
    }

    /// Orders results descending by range key.
    #[must_use]
    pub fn order_by_descending(mut self) -> Self {
        self.scan_index_forward = Some(false);
        self
    }

    /// Overrides the per-request page size.
    #[must_use]
    pub fn paging_limit(mut self, limit: i32) -> Self {
        self.shared.paging_limit = Some(limit);
        self
    }

    fn build_request(&self, cursor: Option<crate::backend::Item>) -> Result<PageRequest> {
        let key_condition = self
            .key_condition
            .as_ref()
            .ok_or_else(|| ErrorKind::Expression.with_message("key_condition is required before executing a query"))?;
        let key_compiled = compile(key_condition, &self.shared.schema, "k")?;
        let mut names = key_compiled.aliases;
        let mut values = key_compiled.params;

        let filter_expression = match &self.shared.filter {
            Some(predicate) => {
                let compiled = compile(predicate, &self.shared.schema, "f")?;
                names.extend(compiled.aliases);
                values.extend(compiled.params);
                Some(compiled.expression)
            }
            None => None,
        };

        let projection_expression = self.shared.projection_expression().map(|(expr, aliases)| {
            names.extend(aliases);
            expr
        });

        Ok(PageRequest {
            table: self.shared.schema.name.to_string(),
            index_name: self.shared.index.clone(),
            key_condition_expression: Some(key_compiled.expression),
            filter_expression,
            projection_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            consistent_read: self.shared.consistent_read_bool() && self.shared.index.is_none(),
            scan_index_forward: self
                .scan_index_forward
                .unwrap_or(self.shared.mapper.config().scan_index_forward),
            limit: Some(self.shared.page_size()),
            exclusive_start_key: cursor,
        })
    }

    /// Runs the query, fetching every page, and decodes each returned
    /// item as `T`.
    pub async fn exec(&self) -> Result<Vec<T>> {
        self.exec_limit(None).await
    }

    /// Runs the query, stopping once `limit` items have been collected
    /// (fewer pages are fetched than [`QueryBuilder::exec`] would need).
    pub async fn exec_limit(&self, limit: Option<usize>) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            out.push(crate::client::decode_item::<T>(item)?);
            if limit.map(|l| out.len() >= l).unwrap_or(false) {
                break;
            }
        }
        Ok(out)
    }

    /// Runs the query, decoding each returned item as `R` instead of `T`
    /// — useful against a projecting secondary index whose item shape is
    /// narrower than the base table's.
    pub async fn exec_into<R: Entity>(&self) -> Result<Vec<R>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            out.push(crate::client::decode_item::<R>(item)?);
        }
        Ok(out)
    }

    /// Runs the query and extracts a single field from each returned
    /// item, decoded as `K`.
    pub async fn exec_column<K: Encodable>(&self, field: &str) -> Result<Vec<K>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            match item.get(field) {
                Some(value) => out.push(K::decode(value)?),
                None => {
                    return Err(ErrorKind::Schema.with_context(format_args!(
                        "projected item did not include field {field:?}"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Returns a lazy pager over this query's results, fetching pages on
    /// demand instead of eagerly collecting them all (`spec.md` §9
    /// "paging state machine").
    pub fn iter(&self) -> Pager {
        let this = self.clone();
        Pager::new(move |cursor| {
            let this = this.clone();
            Box::pin(async move {
                let request = this.build_request(cursor)?;
                let timeout = this.shared.mapper.config().max_retry_on_exception_timeout;
                crate::retry::exec(timeout, &[], || this.shared.mapper.backend().query(request.clone())).await
            }) as Pin<Box<dyn std::future::Future<Output = Result<crate::backend::PageResponse>> + Send>>
        })
    }
}

impl<T: Entity, B: Backend> IntoFuture for &QueryBuilder<T, B> {
    type Output = Result<Vec<T>>;
    type IntoFuture = Pin<Box<dyn std::future::Future<Output = Result<Vec<T>>> + Send + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        let this = self.clone();
        Box::pin(async move { this.exec().await })
    }
}

/// A fluent, lazily-executed scan of a base table or secondary index
/// (`spec.md` §5 "Scan builder").
pub struct ScanBuilder<T: Entity, B: Backend = aws_sdk_dynamodb::Client> {
    shared: Shared<T, B>,
}

impl<T: Entity, B: Backend> Clone for ScanBuilder<T, B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Entity, B: Backend> ScanBuilder<T, B> {
    pub(crate) fn new(mapper: DynamoMapper<B>, schema: Arc<TableSchema>, index: Option<&'static str>) -> Self {
        Self {
            shared: Shared::new(mapper, schema, index),
        }
    }

    /// Adds a filter, applied by the store after it reads an item but
    /// before returning it — it does not reduce read capacity consumed.
    /// AND-joins with any filter a previous call set.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.shared.add_filter(predicate);
        self
    }

    /// Restricts the returned attributes to `fields`.
    #[must_use]
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.shared.projection = Projection::Fields(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Projects onto the intersection of `M`'s fields and this table's
    /// own fields, for decoding into a narrower shape via
    /// `exec_into::<M>()` (`spec.md` §4.5 `select<TModel>()`).
    #[must_use]
    pub fn select_model<M: Entity>(mut self) -> Self {
        self.shared.select_fields_for::<M>();
        self
    }

    /// Projects onto every field of this table (`spec.md` §4.5
    /// `selectTableFields()`).
    #[must_use]
    pub fn select_table_fields(mut self) -> Self {
        self.shared.select_all_table_fields();
        self
    }

    /// Returns the full item — undoes a prior [`ScanBuilder::select`],
    /// [`ScanBuilder::select_model`], or [`ScanBuilder::select_table_fields`].
    #[must_use]
    pub fn select_full_item(mut self) -> Self {
        self.shared.projection = Projection::FullModel;
        self
    }

    /// Requests a strongly or eventually consistent read, overriding
    /// [`crate::config::ClientConfig::consistent_read`] for this scan.
    #[must_use]
    pub fn consistent_read(mut self, mode: ConsistentRead) -> Self {
        self.shared.consistent_read = Some(mode);
        self
    }

    /// Overrides the per-request page size.
    #[must_use]
    pub fn paging_limit(mut self, limit: i32) -> Self {
        self.shared.paging_limit = Some(limit);
        self
    }

    fn build_request(&self, cursor: Option<crate::backend::Item>) -> Result<PageRequest> {
        let mut names = std::collections::HashMap::new();
        let mut values = std::collections::HashMap::new();

        let filter_expression = match &self.shared.filter {
            Some(predicate) => {
                let compiled = compile(predicate, &self.shared.schema, "f")?;
                names.extend(compiled.aliases);
                values.extend(compiled.params);
                Some(compiled.expression)
            }
            None => None,
        };

        let projection_expression = self.shared.projection_expression().map(|(expr, aliases)| {
            names.extend(aliases);
            expr
        });

        Ok(PageRequest {
            table: self.shared.schema.name.to_string(),
            index_name: self.shared.index.clone(),
            key_condition_expression: None,
            filter_expression,
            projection_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            consistent_read: self.shared.consistent_read_bool() && self.shared.index.is_none(),
            scan_index_forward: true,
            limit: Some(self.shared.page_size()),
            exclusive_start_key: cursor,
        })
    }

    /// Runs the scan, fetching every page, and decodes each returned
    /// item as `T`.
    pub async fn exec(&self) -> Result<Vec<T>> {
        self.exec_limit(None).await
    }

    /// Runs the scan, stopping once `limit` items have been collected.
    pub async fn exec_limit(&self, limit: Option<usize>) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            out.push(crate::client::decode_item::<T>(item)?);
            if limit.map(|l| out.len() >= l).unwrap_or(false) {
                break;
            }
        }
        Ok(out)
    }

    /// Runs the scan, decoding each returned item as `R` instead of `T`.
    pub async fn exec_into<R: Entity>(&self) -> Result<Vec<R>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            out.push(crate::client::decode_item::<R>(item)?);
        }
        Ok(out)
    }

    /// Runs the scan and extracts a single field from each returned
    /// item, decoded as `K`.
    pub async fn exec_column<K: Encodable>(&self, field: &str) -> Result<Vec<K>> {
        let mut out = Vec::new();
        let mut pager = self.iter();
        while let Some(item) = pager.next().await? {
            match item.get(field) {
                Some(value) => out.push(K::decode(value)?),
                None => {
                    return Err(ErrorKind::Schema.with_context(format_args!(
                        "projected item did not include field {field:?}"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Returns a lazy pager over this scan's results.
    pub fn iter(&self) -> Pager {
        let this = self.clone();
        Pager::new(move |cursor| {
            let this = this.clone();
            Box::pin(async move {
                let request = this.build_request(cursor)?;
                let timeout = this.shared.mapper.config().max_retry_on_exception_timeout;
                crate::retry::exec(timeout, &[], || this.shared.mapper.backend().scan(request.clone())).await
            }) as Pin<Box<dyn std::future::Future<Output = Result<crate::backend::PageResponse>> + Send>>
        })
    }
}

impl<T: Entity, B: Backend> IntoFuture for &ScanBuilder<T, B> {
    type Output = Result<Vec<T>>;
    type IntoFuture = Pin<Box<dyn std::future::Future<Output = Result<Vec<T>>> + Send + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        let this = self.clone();
        Box::pin(async move { this.exec().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;
    use crate::client::DynamoMapper;
    use crate::config::ClientConfig;
    use crate::entity::{DbType, FieldAccessor};

    #[derive(Default, Debug, Clone, PartialEq, Eq)]
    struct LogEntry {
        stream: String,
        seq: i64,
        level: String,
    }

    impl Entity for LogEntry {
        const TABLE_NAME: &'static str = "builder_tests_log_entry";

        const LOCAL_INDEXES: &'static [fn() -> crate::entity::IndexSchema] = &[|| crate::entity::IndexSchema {
            name: "ByLevel",
            hash_key: "Stream",
            range_key: Some("Level"),
            projection: crate::entity::Projection::All,
            global: false,
            read_capacity: None,
            write_capacity: None,
        }];

        fn fields() -> &'static [FieldAccessor<Self>] {
            static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<LogEntry>>> = once_cell::sync::Lazy::new(|| {
                vec![
                    FieldAccessor {
                        name: "Stream",
                        db_type: DbType::String,
                        is_hash_key: true,
                        is_range_key: false,
                        get: |v| Encodable::encode(&v.stream),
                        set: |v, a| {
                            v.stream = Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "Seq",
                        db_type: DbType::Number,
                        is_hash_key: false,
                        is_range_key: true,
                        get: |v| Encodable::encode(&v.seq),
                        set: |v, a| {
                            v.seq = Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "Level",
                        db_type: DbType::String,
                        is_hash_key: false,
                        is_range_key: false,
                        get: |v| Encodable::encode(&v.level),
                        set: |v, a| {
                            v.level = Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                ]
            });
            &FIELDS
        }
    }

    #[derive(Default, Debug, Clone, PartialEq, Eq)]
    struct LevelOnly {
        stream: String,
        level: String,
    }

    impl Entity for LevelOnly {
        const TABLE_NAME: &'static str = "builder_tests_level_only";

        fn fields() -> &'static [FieldAccessor<Self>] {
            static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<LevelOnly>>> = once_cell::sync::Lazy::new(|| {
                vec![
                    FieldAccessor {
                        name: "Stream",
                        db_type: DbType::String,
                        is_hash_key: true,
                        is_range_key: false,
                        get: |v| Encodable::encode(&v.stream),
                        set: |v, a| {
                            v.stream = Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "Level",
                        db_type: DbType::String,
                        is_hash_key: false,
                        is_range_key: false,
                        get: |v| Encodable::encode(&v.level),
                        set: |v, a| {
                            v.level = Encodable::decode(a)?;
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
    async fn local_index_resolves_by_single_referenced_field() {
        let mapper = mapper();
        mapper
            .put_item(&LogEntry {
                stream: "a".to_string(),
                seq: 1,
                level: "ERROR".to_string(),
            })
            .await
            .unwrap();
        mapper
            .put_item(&LogEntry {
                stream: "a".to_string(),
                seq: 2,
                level: "INFO".to_string(),
            })
            .await
            .unwrap();

        let results: Vec<LogEntry> = mapper
            .from_query::<LogEntry>()
            .unwrap()
            .key_condition(Predicate::eq("Stream", "a"))
            .local_index(Predicate::eq("Level", "ERROR"), None)
            .unwrap()
            .exec()
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].level, "ERROR");
    }

    #[tokio::test]
    async fn local_index_by_explicit_name_rejects_unknown_index() {
        let mapper = mapper();
        let err = mapper
            .from_query::<LogEntry>()
            .unwrap()
            .key_condition(Predicate::eq("Stream", "a"))
            .local_index(Predicate::eq("Level", "ERROR"), Some("DoesNotExist"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
    }

    #[tokio::test]
    async fn select_model_projects_intersection_of_fields() {
        let mapper = mapper();
        mapper
            .put_item(&LogEntry {
                stream: "a".to_string(),
                seq: 1,
                level: "ERROR".to_string(),
            })
            .await
            .unwrap();

        let narrowed: Vec<LevelOnly> = mapper
            .from_query::<LogEntry>()
            .unwrap()
            .key_condition(Predicate::eq("Stream", "a"))
            .select_model::<LevelOnly>()
            .exec_into::<LevelOnly>()
            .await
            .unwrap();

        assert_eq!(
            narrowed,
            vec![LevelOnly {
                stream: "a".to_string(),
                level: "ERROR".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn repeated_filter_calls_and_join() {
        let mapper = mapper();
        for (seq, level) in [(1, "ERROR"), (2, "INFO"), (3, "ERROR")] {
            mapper
                .put_item(&LogEntry {
                    stream: "a".to_string(),
                    seq,
                    level: level.to_string(),
                })
                .await
                .unwrap();
        }

        let results: Vec<LogEntry> = mapper
            .from_query::<LogEntry>()
            .unwrap()
            .key_condition(Predicate::eq("Stream", "a"))
            .filter(Predicate::eq("Level", "ERROR"))
            .filter(Predicate::gt("Seq", 1))
            .exec()
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seq, 3);
    }

    #[tokio::test]
    async fn exec_without_key_condition_is_a_schema_error() {
        let mapper = mapper();
        let err = mapper.from_query::<LogEntry>().unwrap().exec().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Expression);
    }
}
