//! Engine configuration, with the literal defaults from `spec.md` §4.4.

use std::time::Duration;

/// Read consistency requested for a get/query/scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistentRead {
    /// Strongly consistent read.
    Strong,
    /// Eventually consistent ("best-effort") read.
    Eventual,
}

/// Configuration for a [`crate::client::DynamoMapper`].
///
/// All fields are optional in the sense that [`ClientConfig::default`]
/// supplies the values `spec.md` specifies; use the `with_*` builders to
/// override individual ones, mirroring the teacher's
/// `Connect::with_capacity`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default read consistency for base-table operations. Strong by
    /// default; queries/scans against a global secondary index always
    /// fall back to eventual regardless of this setting, since DynamoDB
    /// itself does not support strongly consistent reads on GSIs.
    pub consistent_read: ConsistentRead,
    /// Default provisioned read capacity for newly created tables.
    pub read_capacity: i64,
    /// Default provisioned write capacity for newly created tables.
    pub write_capacity: i64,
    /// How often to re-poll `DescribeTable` while waiting for a table to
    /// become `Active` (or to disappear, when waiting for deletion).
    pub poll_table_status: Duration,
    /// Total time the retry wrapper will spend retrying a single logical
    /// call before giving up with [`crate::error::ErrorKind::Timeout`].
    pub max_retry_on_exception_timeout: Duration,
    /// Default page size for scan/query iteration and `Limit` requests.
    pub paging_limit: i32,
    /// Default scan/query order; `true` is ascending by range key.
    pub scan_index_forward: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            consistent_read: ConsistentRead::Strong,
            read_capacity: 10,
            write_capacity: 5,
            poll_table_status: Duration::from_secs(2),
            max_retry_on_exception_timeout: Duration::from_secs(60),
            paging_limit: 1000,
            scan_index_forward: true,
        }
    }
}

impl ClientConfig {
    /// Overrides the default read consistency.
    #[must_use]
    pub fn with_consistent_read(mut self, consistent_read: ConsistentRead) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Overrides the default provisioned read/write capacity for newly
    /// created tables.
    #[must_use]
    pub fn with_capacity(mut self, read: i64, write: i64) -> Self {
        self.read_capacity = read;
        self.write_capacity = write;
        self
    }

    /// Overrides the table-status poll interval.
    #[must_use]
    pub fn with_poll_table_status(mut self, interval: Duration) -> Self {
        self.poll_table_status = interval;
        self
    }

    /// Overrides the total retry budget.
    #[must_use]
    pub fn with_max_retry_on_exception_timeout(mut self, timeout: Duration) -> Self {
        self.max_retry_on_exception_timeout = timeout;
        self
    }

    /// Overrides the default page size.
    #[must_use]
    pub fn with_paging_limit(mut self, limit: i32) -> Self {
        self.paging_limit = limit;
        self
    }

    /// Overrides the default scan/query order.
    #[must_use]
    pub fn with_scan_index_forward(mut self, forward: bool) -> Self {
        self.scan_index_forward = forward;
        self
    }
}

/// The maximum number of keys in a single `BatchGetItem` request.
pub const BATCH_GET_LIMIT: usize = 100;

/// The maximum number of items in a single `BatchWriteItem` request.
pub const BATCH_WRITE_LIMIT: usize = 25;
