//! The lazy paging state machine backing [`crate::builder::QueryBuilder`]
//! and [`crate::builder::ScanBuilder`] (`spec.md` §9 "paging state
//! machine").
//!
//! A [`Pager`] fetches pages on demand rather than eagerly, so a caller
//! that only wants the first handful of matches (`exec_limit`) never
//! pays for pages beyond what it consumed.

use crate::backend::{Item, PageResponse};
use crate::error::Result;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

type FetchFuture = Pin<Box<dyn Future<Output = Result<PageResponse>> + Send>>;

/// A lazy, page-at-a-time iterator over query/scan results.
///
/// Not a [`futures::Stream`]: the engine's operations are all
/// request/response, and a plain `async fn next` is the simplest shape
/// that lets a caller `while let Some(item) = pager.next().await?`
/// without pulling in a streaming combinator dependency for this alone.
pub struct Pager {
    fetch: Box<dyn FnMut(Option<Item>) -> FetchFuture + Send>,
    buffer: VecDeque<Item>,
    cursor: Option<Item>,
    exhausted: bool,
}

impl Pager {
    pub(crate) fn new(fetch: impl FnMut(Option<Item>) -> FetchFuture + Send + 'static) -> Self {
        Self {
            fetch: Box::new(fetch),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Returns the next item, fetching another page from the store only
    /// when the current one is exhausted. Returns `Ok(None)` once every
    /// page has been consumed.
    pub async fn next(&mut self) -> Result<Option<Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }
            let response = (self.fetch)(self.cursor.take()).await?;
            self.buffer.extend(response.items);
            match response.last_evaluated_key {
                Some(next_cursor) => self.cursor = Some(next_cursor),
                None => self.exhausted = true,
            }
            if self.buffer.is_empty() && self.exhausted {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn item(n: i32) -> Item {
        let mut map = Item::new();
        map.insert("n".to_string(), AttributeValue::N(n.to_string()));
        map
    }

    #[tokio::test]
    async fn drains_multiple_pages_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_closure = Arc::clone(&calls);
        let mut pager = Pager::new(move |cursor| {
            let calls = Arc::clone(&calls_in_closure);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match cursor {
                    None => Ok(PageResponse {
                        items: vec![item(1), item(2)],
                        last_evaluated_key: Some(item(2)),
                    }),
                    Some(_) => Ok(PageResponse {
                        items: vec![item(3)],
                        last_evaluated_key: None,
                    }),
                }
            })
        });

        let mut seen = Vec::new();
        while let Some(item) = pager.next().await.unwrap() {
            seen.push(item);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_first_page_ends_iteration() {
        let mut pager = Pager::new(|_cursor| {
            Box::pin(async move {
                Ok(PageResponse {
                    items: vec![],
                    last_evaluated_key: None,
                })
            })
        });
        assert!(pager.next().await.unwrap().is_none());
    }
}
