// src/utils/http.rs

//! HTTP retrieval with failure classification and capped backoff.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, RetryConfig};

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub cap: Duration,
    /// Consecutive failures from which retries are reported at `warn`
    pub warn_after: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            cap: Duration::from_secs(config.cap_secs),
            warn_after: config.warn_after,
        }
    }

    /// Wait before the retry following failure number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = 2u64.saturating_pow(attempt);
        Duration::from_secs(secs).min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    /// Length announced by the server, if any
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared HTTP client used by every upstream call of a poller.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(crawler: &CrawlerConfig, retry: &RetryConfig) -> Result<Self> {
        Ok(Self::with_policy(
            create_async_client(crawler)?,
            RetryPolicy::from_config(retry),
        ))
    }

    pub fn with_policy(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET `url`, retrying transient failures until the upstream answers.
    ///
    /// Transient failures never escalate; a non-2xx status is returned as
    /// [`AppError::UpstreamProtocol`] immediately.
    pub async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url, query).await {
                Err(AppError::Transient { message, .. }) => {
                    let wait = self.policy.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    if attempt >= self.policy.warn_after {
                        log::warn!(
                            "{url} failed {attempt} times in a row ({message}); retrying in {}s",
                            wait.as_secs()
                        );
                    } else {
                        log::debug!("{url} failed ({message}); retrying in {}s", wait.as_secs());
                    }
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    /// Single GET attempt; used for images, where failure is not retried.
    pub async fn download(&self, url: &str) -> Result<RawResponse> {
        self.fetch_once(url, &[]).await
    }

    async fn fetch_once(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamProtocol {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::transient(url, e))?;

        Ok(RawResponse {
            url: url.to_string(),
            status: status.as_u16(),
            content_length,
            body: body.to_vec(),
        })
    }
}

fn classify(url: &str, err: reqwest::Error) -> AppError {
    if err.is_builder() {
        AppError::Http(err)
    } else {
        AppError::transient(url, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        let client = create_async_client(&CrawlerConfig::default()).unwrap();
        Fetcher::with_policy(client, RetryPolicy::default())
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (0..9).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 32, 64, 120, 120]);
        assert_eq!(policy.delay(200).as_secs(), 120);
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.do"))
            .and(query_param("eqkType", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/list.do", server.uri());
        let response = fetcher().fetch(&url, &[("eqkType", "all")]).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "[]");
    }

    #[tokio::test]
    async fn test_fetch_retries_timeouts_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .with_priority(1)
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed/>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let policy = RetryPolicy {
            cap: Duration::from_millis(10),
            warn_after: 1,
        };
        let url = format!("{}/feed.xml", server.uri());
        let response = Fetcher::with_policy(client, policy)
            .fetch(&url, &[])
            .await
            .unwrap();
        assert_eq!(response.text(), "<feed/>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher().fetch(&server.uri(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamProtocol { status: 503, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher()
            .download(&format!("http://{addr}/img.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transient { .. }));
        assert!(!err.is_fatal());
    }
}
