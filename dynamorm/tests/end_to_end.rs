//! End-to-end scenarios against [`dynamorm::FakeBackend`], one per
//! literal example in the engine's design notes: round-trip, batch,
//! query with a filter, index routing, atomic increment, and a
//! narrower-shape projection.

use dynamorm::entity::{DbType, FieldAccessor};
use dynamorm::{ClientConfig, ConsistentRead, DynamoMapper, Entity, IndexOf, Key, Predicate};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct Poco {
    id: i64,
    name: String,
}

impl Entity for Poco {
    const TABLE_NAME: &'static str = "end_to_end_poco";

    fn fields() -> &'static [FieldAccessor<Self>] {
        static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<Poco>>> = once_cell::sync::Lazy::new(|| {
            vec![
                FieldAccessor {
                    name: "Id",
                    db_type: DbType::Number,
                    is_hash_key: true,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.id),
                    set: |v, a| {
                        v.id = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
                FieldAccessor {
                    name: "Name",
                    db_type: DbType::String,
                    is_hash_key: false,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.name),
                    set: |v, a| {
                        v.name = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
            ]
        });
        &FIELDS
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct Order {
    customer_id: i64,
    order_id: i64,
    total: i64,
    date: String,
}

impl Entity for Order {
    const TABLE_NAME: &'static str = "end_to_end_order";

    const GLOBAL_INDEXES: &'static [fn() -> dynamorm::IndexSchema] = &[|| dynamorm::IndexSchema {
        name: "OrderByDate",
        hash_key: "Date",
        range_key: None,
        projection: dynamorm::Projection::All,
        global: true,
        read_capacity: None,
        write_capacity: None,
    }];

    fn fields() -> &'static [FieldAccessor<Self>] {
        static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<Order>>> = once_cell::sync::Lazy::new(|| {
            vec![
                FieldAccessor {
                    name: "CustomerId",
                    db_type: DbType::Number,
                    is_hash_key: true,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.customer_id),
                    set: |v, a| {
                        v.customer_id = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
                FieldAccessor {
                    name: "OrderId",
                    db_type: DbType::Number,
                    is_hash_key: false,
                    is_range_key: true,
                    get: |v| dynamorm::Encodable::encode(&v.order_id),
                    set: |v, a| {
                        v.order_id = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
                FieldAccessor {
                    name: "Total",
                    db_type: DbType::Number,
                    is_hash_key: false,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.total),
                    set: |v, a| {
                        v.total = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
                FieldAccessor {
                    name: "Date",
                    db_type: DbType::String,
                    is_hash_key: false,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.date),
                    set: |v, a| {
                        v.date = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
            ]
        });
        &FIELDS
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct OrderSummary {
    customer_id: i64,
    order_id: i64,
    total: i64,
}

impl Entity for OrderSummary {
    const TABLE_NAME: &'static str = "end_to_end_order_summary";

    fn fields() -> &'static [FieldAccessor<Self>] {
        static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<OrderSummary>>> =
            once_cell::sync::Lazy::new(|| {
                vec![
                    FieldAccessor {
                        name: "CustomerId",
                        db_type: DbType::Number,
                        is_hash_key: true,
                        is_range_key: false,
                        get: |v| dynamorm::Encodable::encode(&v.customer_id),
                        set: |v, a| {
                            v.customer_id = dynamorm::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "OrderId",
                        db_type: DbType::Number,
                        is_hash_key: false,
                        is_range_key: true,
                        get: |v| dynamorm::Encodable::encode(&v.order_id),
                        set: |v, a| {
                            v.order_id = dynamorm::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                    FieldAccessor {
                        name: "Total",
                        db_type: DbType::Number,
                        is_hash_key: false,
                        is_range_key: false,
                        get: |v| dynamorm::Encodable::encode(&v.total),
                        set: |v, a| {
                            v.total = dynamorm::Encodable::decode(a)?;
                            Ok(())
                        },
                    },
                ]
            });
        &FIELDS
    }
}

struct OrderByDate;

impl IndexOf for OrderByDate {
    type Base = Order;
    const INDEX_NAME: &'static str = "OrderByDate";
    const IS_GLOBAL: bool = true;
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
struct Hits {
    name: String,
    n: i64,
}

impl Entity for Hits {
    const TABLE_NAME: &'static str = "end_to_end_hits";

    fn fields() -> &'static [FieldAccessor<Self>] {
        static FIELDS: once_cell::sync::Lazy<Vec<FieldAccessor<Hits>>> = once_cell::sync::Lazy::new(|| {
            vec![
                FieldAccessor {
                    name: "Name",
                    db_type: DbType::String,
                    is_hash_key: true,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.name),
                    set: |v, a| {
                        v.name = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
                FieldAccessor {
                    name: "N",
                    db_type: DbType::Number,
                    is_hash_key: false,
                    is_range_key: false,
                    get: |v| dynamorm::Encodable::encode(&v.n),
                    set: |v, a| {
                        v.n = dynamorm::Encodable::decode(a)?;
                        Ok(())
                    },
                },
            ]
        });
        &FIELDS
    }
}

fn mapper() -> DynamoMapper<dynamorm::FakeBackend> {
    DynamoMapper::with_backend(dynamorm::FakeBackend::new(), ClientConfig::default())
}

#[tokio::test]
async fn round_trip() {
    let mapper = mapper();
    mapper.init_schema::<Poco>().unwrap();
    mapper
        .put_item(&Poco {
            id: 1,
            name: "foo".to_string(),
        })
        .await
        .unwrap();

    let fetched: Option<Poco> = mapper.get_item(Key::hash(1i64).unwrap()).await.unwrap();
    assert_eq!(
        fetched,
        Some(Poco {
            id: 1,
            name: "foo".to_string(),
        })
    );
}

#[tokio::test]
async fn batch_round_trips_sixty_items_in_one_batch() {
    let mapper = mapper();
    let items: Vec<Poco> = (1..=60)
        .map(|id| Poco {
            id,
            name: format!("item-{id}"),
        })
        .collect();
    mapper.put_items(&items).await.unwrap();

    let keys = (1..=60).map(|id| Key::hash(id).unwrap()).collect();
    let mut fetched: Vec<Poco> = mapper.get_items(keys).await.unwrap();
    fetched.sort_by_key(|p| p.id);
    assert_eq!(fetched, items);
}

#[tokio::test]
async fn query_filters_to_customer_and_total() {
    let mapper = mapper();
    let orders = [
        (7, 1, 50, "2020-01-01"),
        (7, 2, 150, "2020-01-02"),
        (7, 3, 200, "2020-01-03"),
        (8, 1, 500, "2020-01-01"),
    ];
    for (customer_id, order_id, total, date) in orders {
        mapper
            .put_item(&Order {
                customer_id,
                order_id,
                total,
                date: date.to_string(),
            })
            .await
            .unwrap();
    }

    let results: Vec<Order> = mapper
        .from_query::<Order>()
        .unwrap()
        .key_condition(Predicate::eq("CustomerId", 7))
        .filter(Predicate::gt("Total", 100))
        .exec()
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|o| o.customer_id == 7 && o.total > 100));
    assert!(results[0].order_id < results[1].order_id);
}

#[tokio::test]
async fn index_routing_sets_index_name_and_drops_consistent_read() {
    let mapper = mapper();
    mapper
        .put_item(&Order {
            customer_id: 7,
            order_id: 1,
            total: 50,
            date: "2020-01-01".to_string(),
        })
        .await
        .unwrap();
    mapper
        .put_item(&Order {
            customer_id: 9,
            order_id: 4,
            total: 999,
            date: "2020-01-01".to_string(),
        })
        .await
        .unwrap();

    let results: Vec<Order> = mapper
        .from_query_index::<OrderByDate>()
        .unwrap()
        .key_condition(Predicate::eq("Date", "2020-01-01"))
        .consistent_read(ConsistentRead::Strong)
        .exec()
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn increment_starts_from_absent_and_accumulates() {
    let mapper = mapper();
    let key = Key::hash("hits".to_string()).unwrap();

    let v1 = mapper.increment::<Hits>(key.clone(), "N", 1).await.unwrap();
    let v2 = mapper.increment::<Hits>(key.clone(), "N", 1).await.unwrap();
    let v3 = mapper.increment::<Hits>(key.clone(), "N", 1).await.unwrap();
    assert_eq!((v1, v2, v3), (1, 2, 3));

    let fetched: Option<Hits> = mapper.get_item(key).await.unwrap();
    assert_eq!(fetched.unwrap().n, 3);
}

#[tokio::test]
async fn projection_narrows_to_summary_shape() {
    let mapper = mapper();
    mapper
        .put_item(&Order {
            customer_id: 7,
            order_id: 1,
            total: 50,
            date: "2020-01-01".to_string(),
        })
        .await
        .unwrap();

    let summaries: Vec<OrderSummary> = mapper
        .from_query::<Order>()
        .unwrap()
        .key_condition(Predicate::eq("CustomerId", 7))
        .exec_into::<OrderSummary>()
        .await
        .unwrap();

    assert_eq!(
        summaries,
        vec![OrderSummary {
            customer_id: 7,
            order_id: 1,
            total: 50,
        }]
    );
}
