//! Async HTTP client shared by all adapters, with capped exponential-backoff retry.
//!
//! Every failure is retried the same way, 4xx responses included. The last error
//! is returned unchanged once the attempts run out.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Total attempts per call (initial plus retries).
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Delay before the first retry; doubles for each later retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// How often and how patiently to retry one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_COUNT,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `failed` (0-based): base * 2^failed.
    pub fn backoff(&self, failed: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << failed.min(16))
    }
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted.
///
/// Sleeps `policy.backoff(i)` after the i-th failure. The final error is returned as-is.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "{} failed: {}; retrying",
                    what,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Method and body of an outbound request.
#[derive(Debug, Clone)]
enum Method {
    Get,
    PostJson(serde_json::Value),
}

/// Description of one outbound request. Rebuilt into a fresh reqwest request per attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::PostJson(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Add a header. `name` must be lowercase. Values that are not valid header text are dropped.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(v) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), v);
        } else {
            debug!("dropping invalid {} header value {:?}", name, value);
        }
        self
    }

    pub fn referer(mut self, referer: Option<&str>) -> Self {
        if let Some(v) = referer.and_then(|r| HeaderValue::from_str(r).ok()) {
            self.headers.insert(REFERER, v);
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// HTTP client with retry. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Build a client with default User-Agent, timeout, and retry policy.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send once; non-2xx statuses become errors so they are retried like any other failure.
    async fn send(&self, req: &FetchRequest) -> Result<reqwest::Response, reqwest::Error> {
        let builder = match &req.method {
            Method::Get => self.inner.get(&req.url),
            Method::PostJson(body) => self.inner.post(&req.url).json(body),
        };
        builder
            .query(&req.query)
            .headers(req.headers.clone())
            .send()
            .await?
            .error_for_status()
    }

    /// Fetch the body as text.
    pub async fn text(&self, req: &FetchRequest) -> Result<String, reqwest::Error> {
        retry(&self.policy, req.url(), || async {
            self.send(req).await?.text().await
        })
        .await
    }

    /// Fetch and decode a JSON body. Decode failures are retried too.
    pub async fn json<T: DeserializeOwned>(&self, req: &FetchRequest) -> Result<T, reqwest::Error> {
        retry(&self.policy, req.url(), || async {
            self.send(req).await?.json::<T>().await
        })
        .await
    }

    /// Fetch raw bytes (images).
    pub async fn bytes(&self, req: &FetchRequest) -> Result<Vec<u8>, reqwest::Error> {
        retry(&self.policy, req.url(), || async {
            let body = self.send(req).await?.bytes().await?;
            Ok::<_, reqwest::Error>(body.to_vec())
        })
        .await
    }
}

/// Builder for HttpClient with optional User-Agent, timeout, and retry settings.
#[derive(Debug)]
pub struct HttpClientBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
    retry_count: u32,
    base_delay_ms: u64,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set total attempts per call (default 3, minimum 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set the delay before the first retry in milliseconds (default 1000).
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpClient {
            inner,
            policy: RetryPolicy {
                attempts: self.retry_count,
                base_delay: Duration::from_millis(self.base_delay_ms),
            },
        })
    }
}
