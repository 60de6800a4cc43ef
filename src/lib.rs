//! # DartKit - A Rust client for Korea's DART disclosure system
//!
//! DartKit retrieves and reconciles corporate financial statements from DART
//! (Data Analysis, Retrieval and Transfer), the disclosure system run by
//! Korea's Financial Supervisory Service. It searches a company's periodic
//! filings through the Open DART API, extracts the four primary statements
//! from each filing (XBRL attachments when available, report viewer HTML
//! otherwise), and folds the per-filing tables into one multi-year statement
//! per kind.
//!
//! ## Features
//!
//! - **Rate-limited HTTP client** - Token-bucket limiting and retry with
//!   backoff against the Open DART request quotas
//! - **Filing directory** - Paged `list.json` searches with annual, semiannual,
//!   and quarterly cadences and the audit-report fallback
//! - **HTML table extraction** - Discovers statement tables on viewer pages,
//!   resolves rowspan/colspan headers, and normalizes units and signs
//! - **XBRL materialization** - Renders presentation-linkbase tables into the
//!   same matrix form, with consolidated/separate scope filtering
//! - **Reconciliation** - Merges filings across years by value identity and
//!   label fallbacks, tracking every label an account has carried
//! - **CSV persistence** - Saves and reloads a full extraction result
//!
//! ## Requirements
//!
//! DartKit is an async-first library and requires an async runtime. We recommend
//! [tokio](https://tokio.rs), which is the most widely used async runtime in the Rust ecosystem.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use dartkit::{extract, Dart, ExtractOptions, StatementKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Initialize with an Open DART API key
//!     let dart = Dart::new("your-40-char-api-key")?;
//!     let connector = my_connector(); // anything implementing SourceConnector
//!
//!     let options = ExtractOptions::new("00126380", "20150101");
//!     let result = extract(&dart, &connector, &options).await?;
//!
//!     if let Some(bs) = result.statement(StatementKind::Bs) {
//!         println!("{}: {} accounts", bs.title(), bs.n_rows());
//!     }
//!     result.save("fsdata/00126380_annual")?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod traits;

mod extract;
mod filings;
mod html;
mod matrix;
mod merge;
pub mod parsing;
mod result;
pub mod xbrl;

// Core Dart functionality
pub use config::{DartConfig, DartUrls};
pub use core::Dart;
pub use error::{DartError, Result};

// Re-export core types and traits for a clean API
pub use extract::{analyze_filing, extract, ExtractOptions};
pub use filings::{FilingReference, ReportCadence, SearchResponse};
pub use html::extract_statements;
pub use matrix::{
    Cell, Column, ColumnKey, LabelShadowTable, Lang, MetaColumn, Period, StatementKind,
    StatementMatrix,
};
pub use merge::{init_shadow, merge_into};
pub use result::{ExtractInfo, FinancialStatementResult};
pub use traits::{FilingOperations, SourceConnector};
pub use xbrl::{XbrlDocument, XbrlRenderOptions, XbrlTable};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
