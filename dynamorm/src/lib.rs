#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A typed object-mapping client for a hosted key-value document store
//! modeled on Amazon DynamoDB. Record types implement [`Entity`] (almost
//! always via `#[derive(Entity)]`), and [`DynamoMapper`] provides
//! schema-aware get/put/delete/batch/query/scan operations over them
//! without the caller ever touching a raw attribute map.
//!
//! # Examples
//!
//! ```no_run
//! use dynamorm::{ClientConfig, DynamoMapper, Entity};
//!
//! #[derive(Entity, Default)]
//! #[dynamorm(table = "orders")]
//! struct Order {
//!     #[dynamorm(hash_key)]
//!     customer_id: i64,
//!     #[dynamorm(range_key)]
//!     order_id: i64,
//!     total_cents: i64,
//! }
//!
//! # async fn run() -> dynamorm::Result<()> {
//! let mapper = DynamoMapper::connect_with_config(ClientConfig::default()).await;
//! mapper.init_schema::<Order>()?;
//! mapper.create_missing().await?;
//!
//! mapper
//!     .put_item(&Order {
//!         customer_id: 1,
//!         order_id: 100,
//!         total_cents: 2599,
//!     })
//!     .await?;
//!
//! let orders: Vec<Order> = mapper
//!     .from_query::<Order>()?
//!     .key_condition(dynamorm::Predicate::eq("CustomerId", 1))
//!     .exec()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod expr;
pub mod iter;
pub mod registry;
pub mod retry;
pub mod sequence;

pub use backend::{Backend, FakeBackend};
pub use builder::{QueryBuilder, ScanBuilder};
pub use client::{DynamoMapper, Key};
pub use codec::Encodable;
pub use config::{ClientConfig, ConsistentRead};
pub use entity::{DbType, Entity, IndexOf, IndexSchema, Projection, TableSchema};
pub use error::{Error, ErrorKind, Result};
pub use expr::Predicate;
pub use sequence::Counter;

pub use dynamorm_derive::{Entity, IndexOf};

#[doc(hidden)]
/// Re-exports used by generated `#[derive(Entity)]` code. Not part of the
/// public API.
pub mod __private {
    pub use once_cell::sync::Lazy;
}
