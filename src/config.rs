use std::time::Duration;

/// Configuration for the Dart client
#[derive(Debug, Clone)]
pub struct DartConfig {
    /// Open DART API key (40-character `crtfc_key`)
    pub api_key: String,
    /// User agent string for HTTP requests
    pub user_agent: String,
    /// Rate limit in requests per second
    pub rate_limit: u32,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Base URLs for the DART services
    pub base_urls: DartUrls,
}

/// Base URLs for the DART services
#[derive(Debug, Clone)]
pub struct DartUrls {
    /// Base URL for the Open DART REST API
    pub api: String,
    /// Base URL for the DART report viewer (HTML pages)
    pub viewer: String,
}

impl DartConfig {
    /// Creates a new DartConfig with custom settings
    ///
    /// # Basic usage
    ///
    /// ```rust
    /// use dartkit::{Dart, DartConfig};
    /// use std::time::Duration;
    /// let config = DartConfig::new("0123456789abcdef0123456789abcdef01234567", 5, Duration::from_secs(30), None);
    /// let dart = Dart::with_config(config)?;
    /// # Ok::<(), dartkit::DartError>(())
    /// ```
    pub fn new(
        api_key: impl Into<String>,
        rate_limit: u32,
        timeout: Duration,
        base_urls: Option<DartUrls>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            user_agent: concat!("dartkit/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit,
            timeout,
            base_urls: base_urls.unwrap_or_default(),
        }
    }
}

impl Default for DartUrls {
    fn default() -> Self {
        Self {
            api: "https://opendart.fss.or.kr/api".to_string(),
            viewer: "https://dart.fss.or.kr".to_string(),
        }
    }
}
