use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::config::{DartConfig, DartUrls};
use super::error::{DartError, Result};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// HTTP client for the DART system with built-in rate limiting and retry logic.
///
/// The `Dart` client is the entry point for talking to Korea's DART disclosure
/// system: the Open DART REST API (JSON, authenticated by `crtfc_key`) and the
/// public report viewer (HTML pages). The API key is carried explicitly by the
/// client rather than through any process-wide registry, so independent clients
/// with different keys or base URLs can coexist in one process.
///
/// Rate limiting uses a token bucket (Open DART allows 1,000 requests per day
/// with burst limits; the default here is a conservative 5 requests/second).
/// Transient failures and HTTP 429 responses are retried with exponential
/// backoff and jitter.
#[derive(Debug, Clone)]
pub struct Dart {
    /// HTTP client for making requests
    pub(crate) client: reqwest::Client,

    /// Token bucket rate limiter
    pub(crate) rate_limiter: Arc<Governor>,

    /// Open DART API key
    pub(crate) api_key: String,

    /// Base URL for the Open DART REST API
    pub(crate) api_url: String,

    /// Base URL for the DART report viewer
    pub(crate) viewer_url: String,
}

impl Dart {
    /// Creates a new Dart client with sensible defaults.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Open DART API key issued at opendart.fss.or.kr
    pub fn new(api_key: &str) -> Result<Self> {
        let config = DartConfig {
            api_key: api_key.to_string(),
            user_agent: concat!("dartkit/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit: 5,
            timeout: Duration::from_secs(30),
            base_urls: DartUrls::default(),
        };
        Self::with_config(config)
    }

    /// Creates a Dart client with custom configuration settings.
    ///
    /// # Errors
    ///
    /// Returns `DartError::ConfigError` if the API key is empty, the rate limit
    /// is zero, or the HTTP client cannot be built.
    pub fn with_config(config: DartConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DartError::ConfigError("API key must not be empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| DartError::ConfigError(format!("Invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| DartError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.rate_limit).ok_or_else(|| {
                DartError::ConfigError("Rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(Dart {
            client,
            rate_limiter,
            api_key: config.api_key,
            api_url: config.base_urls.api,
            viewer_url: config.base_urls.viewer,
        })
    }

    /// Calculates the wait duration for retry attempts: `(2^retry × 1000ms) ± 20%`.
    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        // Add some jitter (±20% of the calculated backoff)
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// Builds an Open DART API endpoint URL with the key and query parameters attached.
    pub(crate) fn api_endpoint(&self, path: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}/{}?crtfc_key={}", self.api_url, path, self.api_key);
        for (key, value) in params {
            if !value.is_empty() {
                url.push('&');
                url.push_str(key);
                url.push('=');
                url.push_str(value);
            }
        }
        url
    }

    /// Fetches binary data from a URL with automatic rate limiting and retry logic.
    ///
    /// Used for downloading attachments such as zipped XBRL bundles. Retries up
    /// to 5 times on rate limit responses; 404 and other client errors return
    /// immediately.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut retries = 0;

        loop {
            self.rate_limiter.until_ready().await;

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(DartError::RequestError)?;

            match response.status() {
                reqwest::StatusCode::OK => {
                    return response
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(DartError::RequestError);
                }
                reqwest::StatusCode::NOT_FOUND => {
                    return Err(DartError::NotFound);
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= MAX_RETRIES {
                        return Err(DartError::RateLimitExceeded);
                    }
                    let retry_after = Self::calculate_backoff(retries);
                    sleep(retry_after).await;
                    retries += 1;
                    continue;
                }
                status => {
                    return Err(DartError::InvalidResponse(format!(
                        "Unexpected status code: {}",
                        status
                    )));
                }
            }
        }
    }

    /// Fetches text content from a URL with rate limiting and retries.
    ///
    /// This is the primary method for retrieving both Open DART JSON responses
    /// and report viewer HTML pages. Rate limit responses (429) are retried
    /// with the `Retry-After` header when present, otherwise with exponential
    /// backoff; network errors are retried the same way. Other HTTP errors
    /// return immediately.
    pub async fn get(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            let response_result = self.client.get(url).send().await;

            match response_result {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();

                    match status {
                        reqwest::StatusCode::OK => {
                            return response.text().await.map_err(DartError::RequestError);
                        }
                        reqwest::StatusCode::NOT_FOUND => {
                            return Err(DartError::NotFound);
                        }
                        reqwest::StatusCode::TOO_MANY_REQUESTS => {
                            if retries >= MAX_RETRIES {
                                return Err(DartError::RateLimitExceeded);
                            }

                            let retry_after_duration = headers
                                .get("retry-after")
                                .and_then(|h| h.to_str().ok())
                                .and_then(|s| s.parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or_else(|| Self::calculate_backoff(retries));

                            tracing::warn!(
                                "Rate limit hit (429) for {}. Attempt {}/{}. Waiting for {:?} before retry.",
                                url,
                                retries + 1,
                                MAX_RETRIES + 1,
                                retry_after_duration
                            );
                            sleep(retry_after_duration).await;
                            retries += 1;
                            continue;
                        }
                        other_status => {
                            let error_body = response
                                .text()
                                .await
                                .unwrap_or_else(|_| "Failed to read error body".to_string());

                            return Err(DartError::InvalidResponse(format!(
                                "Unexpected status code: {} for URL: {}. Response preview: {}",
                                other_status,
                                url,
                                error_body.chars().take(200).collect::<String>()
                            )));
                        }
                    }
                }
                Err(e) => {
                    if retries >= MAX_RETRIES {
                        return Err(DartError::RequestError(e));
                    }
                    let backoff_duration = Self::calculate_backoff(retries);
                    tracing::warn!(
                        "Request failed for {}: {:?}. Attempt {}/{}. Retrying in {:?}.",
                        url,
                        e,
                        retries + 1,
                        MAX_RETRIES + 1,
                        backoff_duration
                    );
                    sleep(backoff_duration).await;
                    retries += 1;
                    continue;
                }
            }
        }
    }

    /// Checks the `status` field of an Open DART JSON envelope.
    ///
    /// Open DART reports errors in-band: `"000"` is success, `"013"` means the
    /// query matched nothing, everything else is a key, quota, or service
    /// problem. `"013"` maps to [`DartError::NoDataReceived`] so callers can
    /// distinguish an empty result from a broken query and fall back to an
    /// alternate report-detail type.
    pub(crate) fn check_status(status: &str, message: &str) -> Result<()> {
        match status {
            "000" => Ok(()),
            "013" => Err(DartError::NoDataReceived),
            "020" => Err(DartError::RateLimitExceeded),
            _ => Err(DartError::ApiStatus {
                status: status.to_string(),
                message: message.to_string(),
            }),
        }
    }

    /// Returns the base URL for the Open DART REST API.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Returns the base URL for the DART report viewer.
    pub fn viewer_url(&self) -> &str {
        &self.viewer_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff() {
        let backoff0 = Dart::calculate_backoff(0);
        let backoff1 = Dart::calculate_backoff(1);
        let backoff2 = Dart::calculate_backoff(2);

        // Check that backoff increases exponentially
        assert!(backoff0 < backoff1);
        assert!(backoff1 < backoff2);

        // Check that backoff is roughly within expected range
        assert!(backoff0.as_millis() >= 800 && backoff0.as_millis() <= 1200); // ±20% of 1000ms
        assert!(backoff1.as_millis() >= 1600 && backoff1.as_millis() <= 2400); // ±20% of 2000ms
        assert!(backoff2.as_millis() >= 3200 && backoff2.as_millis() <= 4800); // ±20% of 4000ms
    }

    #[test]
    fn test_check_status() {
        assert!(Dart::check_status("000", "정상").is_ok());
        assert!(matches!(
            Dart::check_status("013", "조회된 데이타가 없습니다."),
            Err(DartError::NoDataReceived)
        ));
        assert!(matches!(
            Dart::check_status("020", ""),
            Err(DartError::RateLimitExceeded)
        ));
        assert!(matches!(
            Dart::check_status("010", "등록되지 않은 키입니다."),
            Err(DartError::ApiStatus { .. })
        ));
    }

    #[test]
    fn test_api_endpoint() {
        let dart = Dart::new("0123456789abcdef0123456789abcdef01234567").unwrap();
        let url = dart.api_endpoint("list.json", &[("corp_code", "00126380"), ("end_de", "")]);
        assert_eq!(
            url,
            "https://opendart.fss.or.kr/api/list.json?crtfc_key=0123456789abcdef0123456789abcdef01234567&corp_code=00126380"
        );
    }
}
