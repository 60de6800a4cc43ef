use thiserror::Error;

#[derive(Error, Debug)]
pub enum DartError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("No data received for the query (DART status 013)")]
    NoDataReceived,

    #[error("Could not find consolidated financial statements")]
    NotFoundConsolidated,

    #[error("Failed to analyze or merge filing {rcept_no} ({report_nm}, filed {rcept_dt}): {source}")]
    MergeFailure {
        rcept_no: String,
        report_nm: String,
        rcept_dt: String,
        #[source]
        source: Box<DartError>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Open DART refused the request (status {status}): {message}")]
    ApiStatus { status: String, message: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl DartError {
    /// Wraps an analysis error with the identity of the filing that caused it,
    /// so a failed fold step can never be mistaken for a clean skip.
    pub fn merge_failure(rcept_no: &str, report_nm: &str, rcept_dt: &str, source: DartError) -> Self {
        DartError::MergeFailure {
            rcept_no: rcept_no.to_string(),
            report_nm: report_nm.to_string(),
            rcept_dt: rcept_dt.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, DartError>;
