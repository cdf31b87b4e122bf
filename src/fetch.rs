//! Paginated retrieval from the BVL API.
//!
//! Pages are requested with `limit`/`offset` until the API signals the end of
//! the data: an empty (or absent) `items` array, or a short page. Transport
//! failures and non-2xx responses are retried with exponential backoff; a body
//! that is not the expected envelope is never retried.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::FetchSettings;
use crate::model::RawRecord;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("giving up on {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Bounded exponential backoff: the wait before retry `n` is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(retry))
    }

    #[cfg(test)]
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|retry| self.delay_for(retry)).collect()
    }
}

/// Records gathered for one endpoint. `error` is set when the fetch stopped
/// early; `records` still holds every page received before that.
#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub pages: usize,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Fetcher {
    client: Client,
    base_url: String,
    page_size: usize,
    max_pages: Option<usize>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(base_url: &str, settings: &FetchSettings, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("bvl-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            page_size: settings.page_size,
            max_pages: settings.max_pages,
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: settings.retry_delay(),
            },
            cancel,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn fetch_all(&self, path: &str) -> FetchOutcome {
        let url = self.build_url(path);
        let mut records = Vec::new();
        let mut offset = 0_usize;
        let mut pages = 0_usize;

        loop {
            if let Some(max_pages) = self.max_pages {
                if pages >= max_pages {
                    info!(path, max_pages, "reached max pages limit");
                    break;
                }
            }

            info!(path, page = pages + 1, offset, limit = self.page_size, "fetching page");
            let items = match self.get_page(&url, offset).await {
                Ok(items) => items,
                Err(err) => {
                    error!(path, offset, kept = records.len(), error = %err, "fetch aborted");
                    return FetchOutcome {
                        records,
                        pages,
                        error: Some(err),
                    };
                }
            };

            if items.is_empty() {
                info!(path, offset, "no more items");
                break;
            }

            let received = items.len();
            records.extend(items);
            pages += 1;
            debug!(path, received, total = records.len(), "page received");

            if received < self.page_size {
                info!(path, received, "short page, end of data");
                break;
            }

            offset += self.page_size;
        }

        info!(path, total = records.len(), pages, "fetch completed");
        FetchOutcome {
            records,
            pages,
            error: None,
        }
    }

    async fn get_page(&self, url: &str, offset: usize) -> Result<Vec<RawRecord>, FetchError> {
        let mut retry = 0_u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let err = match self.request_page(url, offset).await {
                Ok(items) => return Ok(items),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if retry >= self.retry.max_retries {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: retry + 1,
                    last: Box::new(err),
                });
            }

            let delay = self.retry.delay_for(retry);
            warn!(
                url,
                attempt = retry + 1,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            self.wait(delay).await?;
            retry += 1;
        }
    }

    async fn wait(&self, delay: Duration) -> Result<(), FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn request_page(&self, url: &str, offset: usize) -> Result<Vec<RawRecord>, FetchError> {
        let response = self
            .client
            .get(url)
            .query(&[("limit", self.page_size), ("offset", offset)])
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            warn!(url, offset, "no content returned");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        parse_items(url, &body)
    }
}

fn parse_items(url: &str, body: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let malformed = |reason: String| FetchError::Malformed {
        url: url.to_string(),
        reason,
    };

    let envelope: Value =
        serde_json::from_slice(body).map_err(|err| malformed(format!("invalid JSON: {err}")))?;
    let Value::Object(mut envelope) = envelope else {
        return Err(malformed("response is not a JSON object".to_string()));
    };

    let items = match envelope.remove("items") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(malformed("`items` is not an array".to_string())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(malformed(format!("item {index} is not an object"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(page_size: usize, max_retries: u32) -> FetchSettings {
        FetchSettings {
            page_size,
            max_pages: None,
            timeout_secs: 5,
            max_retries,
            retry_delay_ms: 1,
        }
    }

    fn page(start: usize, count: usize) -> Value {
        let items = (start..start + count)
            .map(|i| json!({ "kennr": format!("K-{i:05}"), "mittelname": format!("Mittel {i}") }))
            .collect::<Vec<_>>();
        json!({ "items": items })
    }

    async fn mount_page(server: &MockServer, endpoint: &str, offset: usize, body: Value) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetch_all_stops_after_short_page() {
        let server = MockServer::start().await;
        mount_page(&server, "/mittel/", 0, page(0, 1000)).await;
        mount_page(&server, "/mittel/", 1000, page(1000, 1000)).await;
        mount_page(&server, "/mittel/", 2000, page(2000, 400)).await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(1000, 3), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("mittel/").await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.records.len(), 2400);
        assert_eq!(outcome.records[2399]["kennr"], "K-02399");
    }

    #[tokio::test]
    async fn fetch_all_sends_limit_and_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/awg/"))
            .and(query_param("limit", "50"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 3)))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(50, 0), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("/awg/").await;

        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn empty_page_ends_fetch_without_adding_records() {
        let server = MockServer::start().await;
        mount_page(&server, "/kode/", 0, page(0, 2)).await;
        mount_page(&server, "/kode/", 2, json!({ "items": [] })).await;
        Mock::given(method("GET"))
            .and(path("/kode/"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(4, 2)))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(2, 0), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("kode/").await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn missing_items_field_is_an_empty_page() {
        let server = MockServer::start().await;
        mount_page(&server, "/stand/", 0, json!({ "count": 0 })).await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(10, 0), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("stand/").await;

        assert!(outcome.is_complete());
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.pages, 0);
    }

    #[tokio::test]
    async fn no_content_is_a_valid_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hinweis/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(10, 3), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("hinweis/").await;

        assert!(outcome.is_complete());
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retried_exactly_max_retries_times() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/awg/"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(10, 3), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("awg/").await;

        match outcome.error {
            Some(FetchError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, FetchError::Status { status: 503, .. }));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_keep_earlier_pages() {
        let server = MockServer::start().await;
        mount_page(&server, "/awg_kultur/", 0, page(0, 2)).await;
        Mock::given(method("GET"))
            .and(path("/awg_kultur/"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(2, 1), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("awg_kultur/").await;

        assert!(!outcome.is_complete());
        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn malformed_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wirkstoff/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(&server.uri(), &settings(10, 3), CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("wirkstoff/").await;

        assert!(matches!(outcome.error, Some(FetchError::Malformed { .. })));
    }

    #[tokio::test]
    async fn max_pages_limits_the_fetch() {
        let server = MockServer::start().await;
        mount_page(&server, "/adresse/", 0, page(0, 5)).await;
        mount_page(&server, "/adresse/", 5, page(5, 5)).await;

        let mut limited = settings(5, 0);
        limited.max_pages = Some(2);
        let fetcher = Fetcher::new(&server.uri(), &limited, CancellationToken::new()).unwrap();
        let outcome = fetcher.fetch_all("adresse/").await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 10);
    }

    #[tokio::test]
    async fn cancelled_token_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/awg/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut slow = settings(10, 5);
        slow.retry_delay_ms = 60_000;
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::new(&server.uri(), &slow, cancel.clone()).unwrap();

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let outcome = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch_all("awg/"))
            .await
            .unwrap();
        trigger.await.unwrap();

        assert!(matches!(outcome.error, Some(FetchError::Cancelled)));
    }

    #[test]
    fn backoff_schedule_strictly_increases() {
        let policy = RetryPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(250),
        };

        let schedule = policy.schedule();
        assert_eq!(schedule.len(), 4);
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
        assert!(schedule.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn parse_items_rejects_non_array_items() {
        let err = parse_items("http://x/", br#"{"items": {"a": 1}}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));

        let items = parse_items("http://x/", br#"{"items": null}"#).unwrap();
        assert!(items.is_empty());
    }
}
