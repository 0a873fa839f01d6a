//! The remote list source seam.
//!
//! Implementors provide one page of records per call; the paging policy
//! (cursor, dedup, persistence, single-flight) lives in
//! [`RepoFeed`](crate::manager::RepoFeed).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::RepoRecord;

/// One page of results from a remote list source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Records in server order.
    pub records: Vec<RepoRecord>,
    /// The source's total-page estimate, when its pagination metadata
    /// carried one. Absent metadata is not an error.
    pub last_page: Option<u32>,
}

/// Transport-level failure while fetching a page.
///
/// Never retried automatically; the manager logs it and leaves the working
/// set and cursor untouched.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("rate limited by the remote API")]
    RateLimited,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A remote source of paged repository listings.
pub trait PageSource: Send + Sync {
    /// The canonical name of this source (e.g., "GitHub"), for logs.
    fn name(&self) -> &str;

    /// Fetch page `page` with `per_page` records per page.
    fn fetch_page<'a>(
        &'a self,
        page: u32,
        per_page: u32,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Page, TransportError>> + Send + 'a>>;
}

impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_page<'a>(
        &'a self,
        page: u32,
        per_page: u32,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Page, TransportError>> + Send + 'a>> {
        (**self).fetch_page(page, per_page, client, timeout)
    }
}

/// One scripted response for [`MockSource`].
#[derive(Clone, Debug)]
pub enum MockPage {
    /// Serve a page of records with an optional total-page estimate.
    Serve {
        records: Vec<RepoRecord>,
        last_page: Option<u32>,
    },
    /// Simulate a non-success HTTP status.
    Status(u16),
    /// Simulate a 429 from the remote API.
    RateLimited,
}

struct MockInner {
    /// Remaining scripted responses, reversed so pop() serves in order.
    responses: Mutex<Vec<MockPage>>,
    /// Served when the script is exhausted.
    fallback: MockPage,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

/// A scripted [`PageSource`] for tests.
///
/// Serves responses in order, repeating the last one when the script runs
/// out. Counts calls and can simulate per-call latency. Clones share the
/// same script and counter.
#[derive(Clone)]
pub struct MockSource {
    inner: Arc<MockInner>,
}

impl MockSource {
    /// A source that always serves `response`.
    pub fn new(response: MockPage) -> Self {
        Self {
            inner: Arc::new(MockInner {
                responses: Mutex::new(Vec::new()),
                fallback: response,
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// A source that serves `responses` in order, repeating the last one.
    pub fn with_sequence(mut responses: Vec<MockPage>) -> Self {
        assert!(
            !responses.is_empty(),
            "sequence must have at least one response"
        );
        let fallback = responses.last().cloned().unwrap();
        responses.reverse();
        Self {
            inner: Arc::new(MockInner {
                responses: Mutex::new(responses),
                fallback,
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Add simulated network latency to every call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    /// How many times `fetch_page` has been called.
    pub fn call_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockPage {
        let mut seq = self.inner.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.inner.fallback.clone())
    }
}

impl PageSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch_page<'a>(
        &'a self,
        _page: u32,
        _per_page: u32,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Page, TransportError>> + Send + 'a>> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        let delay = *self.inner.delay.lock().unwrap();

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockPage::Serve { records, last_page } => Ok(Page { records, last_page }),
                MockPage::Status(code) => Err(TransportError::Status(code)),
                MockPage::RateLimited => Err(TransportError::RateLimited),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> RepoRecord {
        RepoRecord {
            id,
            name: format!("repo-{id}"),
            description: None,
            html_url: format!("https://example.com/repo-{id}"),
        }
    }

    fn page(ids: &[u64]) -> MockPage {
        MockPage::Serve {
            records: ids.iter().copied().map(record).collect(),
            last_page: None,
        }
    }

    #[tokio::test]
    async fn sequence_serves_in_order_then_repeats_last() {
        let source = MockSource::with_sequence(vec![page(&[1]), page(&[2])]);
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(1);

        let first = source.fetch_page(1, 2, &client, timeout).await.unwrap();
        assert_eq!(first.records[0].id, 1);
        let second = source.fetch_page(2, 2, &client, timeout).await.unwrap();
        assert_eq!(second.records[0].id, 2);
        // Exhausted: keeps serving the last scripted response.
        let third = source.fetch_page(3, 2, &client, timeout).await.unwrap();
        assert_eq!(third.records[0].id, 2);
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test]
    async fn scripted_errors_surface_as_transport_errors() {
        let source = MockSource::with_sequence(vec![MockPage::Status(500), MockPage::RateLimited]);
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(1);

        let err = source.fetch_page(1, 2, &client, timeout).await.unwrap_err();
        assert!(matches!(err, TransportError::Status(500)));
        let err = source.fetch_page(1, 2, &client, timeout).await.unwrap_err();
        assert!(matches!(err, TransportError::RateLimited));
    }

    #[tokio::test]
    async fn clones_share_the_call_counter() {
        let source = MockSource::new(page(&[1]));
        let observer = source.clone();
        let client = reqwest::Client::new();

        source
            .fetch_page(1, 2, &client, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(observer.call_count(), 1);
    }
}
