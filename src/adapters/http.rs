//! Shared HTTP plumbing for provider adapters.
//!
//! Every provider call goes through [`ProviderClient::get_json`]: a single
//! GET with a per-attempt timeout, retried with exponential backoff and
//! jitter for retryable failures only (timeouts, connection errors, 429,
//! 5xx). Client errors other than 429 fail immediately.

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{error, warn};

use crate::config::{ConfigError, ProviderConfig};
use crate::error::UpstreamError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub struct ProviderClient {
    http: reqwest::Client,
    max_attempts: u32,
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("city-assistant/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// GET a JSON payload, retrying retryable failures up to the attempt
    /// budget.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(url, query, headers).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.retryable() {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                error!(url, attempts = attempt, error = %err, "provider retries exhausted");
                return Err(err);
            }

            let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
            let delay = backoff + Duration::from_millis(jitter);
            warn!(url, attempt, error = %err, delay_ms = delay.as_millis() as u64,
                "provider call failed, retrying");
            tokio::time::sleep(delay).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn attempt(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let mut request = self.http.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::rate_limited(format!(
                "provider rate limited the request: {}",
                status
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamError::not_found(format!(
                "provider returned {}",
                status
            )));
        }
        if status.is_client_error() {
            return Err(UpstreamError::invalid_input(format!(
                "provider rejected the request: {}",
                status
            )));
        }
        if status.is_server_error() {
            return Err(UpstreamError::unavailable(format!(
                "provider returned {}",
                status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError::unavailable(format!("invalid provider payload: {}", e)))
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::timeout(format!("provider call timed out: {}", err))
    } else {
        UpstreamError::unavailable(format!("provider unreachable: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Minimal HTTP server answering every request with one canned
    /// response. Returns the base URL and a request counter.
    async fn stub_server(response: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let server_hits = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let hits = server_hits.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    hits.fetch_add(1, Ordering::SeqCst);
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn client(max_attempts: u32) -> ProviderClient {
        let config = ProviderConfig {
            max_attempts,
            request_timeout: Duration::from_secs(5),
            ..ProviderConfig::default()
        };
        ProviderClient::new(&config).unwrap()
    }

    const RESPONSE_503: &str =
        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const RESPONSE_400: &str =
        "HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const RESPONSE_429: &str =
        "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const RESPONSE_OK: &str = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
        content-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}";

    #[tokio::test]
    async fn repeated_503_exhausts_the_attempt_budget() {
        init_tracing();
        let (base, hits) = stub_server(RESPONSE_503).await;

        let err = client(3)
            .get_json(&format!("{}/timezone/Africa/Nairobi", base), &[], &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::Unavailable);
        assert_eq!(hits.load(Ordering::SeqCst), 3, "one call per attempt");
    }

    #[tokio::test]
    async fn non_retryable_status_fails_on_the_first_attempt() {
        init_tracing();
        let (base, hits) = stub_server(RESPONSE_400).await;

        let err = client(3).get_json(&base, &[], &[]).await.unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::InvalidInput);
        assert_eq!(hits.load(Ordering::SeqCst), 1, "4xx must not be retried");
    }

    #[tokio::test]
    async fn rate_limiting_maps_to_rate_limited() {
        init_tracing();
        let (base, hits) = stub_server(RESPONSE_429).await;

        let err = client(1).get_json(&base, &[], &[]).await.unwrap_err();

        assert_eq!(err.kind, UpstreamErrorKind::RateLimited);
        assert!(err.retryable());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_response_parses_without_retrying() {
        init_tracing();
        let (base, hits) = stub_server(RESPONSE_OK).await;

        let value = client(3).get_json(&base, &[], &[]).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
