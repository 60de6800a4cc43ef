//! Trait definitions for the collaborators of the extraction pipeline.
//!
//! Two seams are involved in building a financial statement. The filing
//! directory ([`FilingOperations`], implemented by the `Dart` client) answers
//! "which filings exist for this company in this window". The document source
//! ([`SourceConnector`]) turns a filing reference into analyzable material:
//! viewer HTML pages or a parsed XBRL document.
//!
//! Keeping the source behind a trait lets the extraction fold run against
//! anything that can produce documents: a live viewer scraper, a local
//! archive, or an in-memory mock in tests.

use async_trait::async_trait;

use super::error::Result;
use super::filings::{FilingReference, ReportCadence};
use super::xbrl::XbrlDocument;

/// Operations for searching the DART filing directory.
///
/// All searches go through Open DART's `list.json` endpoint filtered by a
/// report detail-type code. The three methods encode the three search shapes
/// the extraction pipeline needs: a raw paged search, the annual search with
/// its audit-report fallback, and the tolerant semiannual/quarterly search
/// that treats "no data" as an empty list.
#[async_trait]
pub trait FilingOperations {
    /// Searches filings of a given detail type, following result pagination.
    async fn search_filings(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        pblntf_detail_ty: &str,
        last_report_only: bool,
    ) -> Result<Vec<FilingReference>>;
    /// Searches annual business reports, falling back to audit reports
    /// (`F001`/`F002`) when no business report exists in the window.
    async fn annual_reports(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        separate: bool,
    ) -> Result<Vec<FilingReference>>;
    /// Searches semiannual or quarterly reports; an empty window yields an
    /// empty list rather than an error.
    async fn periodic_reports(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        cadence: ReportCadence,
    ) -> Result<Vec<FilingReference>>;
}

/// Operations for materializing a filing's documents.
///
/// A filing is identified by its receipt number; what lies behind it depends
/// on the source. Implementations decide how pages are discovered (for the
/// DART viewer: the attached pages whose titles read 재무제표 or 감사보고서,
/// skipping 주석, 결합, 의견, 수정, and 검토보고서 sections) and how XBRL
/// bundles are located and parsed.
#[async_trait]
pub trait SourceConnector {
    /// Returns candidate statement pages for a filing, in document order.
    ///
    /// The extraction fold scans the pages front to back and keeps the first
    /// page on which any requested statement table is found, so connectors
    /// should return pages ordered the way the filing presents them.
    async fn fetch_pages(&self, filing: &FilingReference, separate: bool) -> Result<Vec<String>>;

    /// Returns the filing's XBRL document, or `None` when the filing has no
    /// XBRL attachment.
    async fn fetch_xbrl(&self, filing: &FilingReference) -> Result<Option<XbrlDocument>>;
}
