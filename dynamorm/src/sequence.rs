//! Atomic named counters built on [`crate::client::DynamoMapper::increment`]
//! (`spec.md` §5 "Sequence source").
//!
//! A sequence lives as one item per counter name in an ordinary
//! registered table: the table's hash key is the sequence's name, and
//! one numeric field holds its value. Reusing `increment`'s `ADD`
//! expression gets the atomicity for free — concurrent callers racing
//! `next` on the same name never observe or hand out the same value
//! twice, because the store serializes `ADD`s to a single item.

use crate::backend::Backend;
use crate::client::{DynamoMapper, Key};
use crate::codec::Encodable;
use crate::entity::Entity;
use crate::error::Result;
use std::marker::PhantomData;

/// A named counter backed by an [`Entity`] table, one item per sequence
/// name.
pub struct Counter<T: Entity, B: Backend = aws_sdk_dynamodb::Client> {
    mapper: DynamoMapper<B>,
    field: &'static str,
    _marker: PhantomData<T>,
}

impl<T: Entity, B: Backend> Counter<T, B> {
    /// Builds a counter over `T`'s `field`, keyed by `T`'s hash key (the
    /// sequence name).
    pub fn new(mapper: DynamoMapper<B>, field: &'static str) -> Self {
        Self {
            mapper,
            field,
            _marker: PhantomData,
        }
    }

    /// Registers `T`'s schema so [`crate::client::DynamoMapper::create_missing`]
    /// will provision its table.
    pub fn init_schema(&self) -> Result<()> {
        self.mapper.init_schema::<T>()?;
        Ok(())
    }

    /// Returns a sequence's current value without advancing it, creating
    /// the sequence at `0` if it does not yet exist.
    pub async fn current(&self, sequence: impl Encodable) -> Result<i64> {
        self.mapper
            .increment::<T>(Key::hash(sequence)?, self.field, 0)
            .await
    }

    /// Advances a sequence by one and returns its new value.
    pub async fn next(&self, sequence: impl Encodable) -> Result<i64> {
        self.next_by(sequence, 1).await
    }

    /// Advances a sequence by `delta` (which may be negative) and
    /// returns its new value.
    pub async fn next_by(&self, sequence: impl Encodable, delta: i64) -> Result<i64> {
        self.mapper
            .increment::<T>(Key::hash(sequence)?, self.field, delta)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackend;
    use crate::config::ClientConfig;
    use crate::entity::{DbType, FieldAccessor};

    #[derive(Default)]
    struct OrderSequence {
        name: String,
        value: i64,
    }

    impl Entity for OrderSequence {
        const TABLE_NAME: &'static str = "sequence_tests_order_sequence";

        fn fields() -> &'static [FieldAccessor<Self>] {
            static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<OrderSequence>>> =
                once_cell::sync::Lazy::new(|| {
                    vec![
                        FieldAccessor {
                            name: "Name",
                            db_type: DbType::String,
                            is_hash_key: true,
                            is_range_key: false,
                            get: |v| crate::codec::Encodable::encode(&v.name),
                            set: |v, a| {
                                v.name = crate::codec::Encodable::decode(a)?;
                                Ok(())
                            },
                        },
                        FieldAccessor {
                            name: "Value",
                            db_type: DbType::Number,
                            is_hash_key: false,
                            is_range_key: false,
                            get: |v| crate::codec::Encodable::encode(&v.value),
                            set: |v, a| {
                                v.value = crate::codec::Encodable::decode(a)?;
                                Ok(())
                            },
                        },
                    ]
                });
            &FIELDS
        }
    }

    #[tokio::test]
    async fn next_increments_from_zero() {
        let mapper = DynamoMapper::with_backend(FakeBackend::new(), ClientConfig::default());
        let counter: Counter<OrderSequence, FakeBackend> = Counter::new(mapper, "Value");
        assert_eq!(counter.current("orders").await.unwrap(), 0);
        assert_eq!(counter.next("orders").await.unwrap(), 1);
        assert_eq!(counter.next("orders").await.unwrap(), 2);
        assert_eq!(counter.next_by("orders", 10).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn distinct_names_are_independent() {
        let mapper = DynamoMapper::with_backend(FakeBackend::new(), ClientConfig::default());
        let counter: Counter<OrderSequence, FakeBackend> = Counter::new(mapper, "Value");
        counter.next("a").await.unwrap();
        counter.next("a").await.unwrap();
        assert_eq!(counter.next("b").await.unwrap(), 1);
        assert_eq!(counter.current("a").await.unwrap(), 2);
    }
}
