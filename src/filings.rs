use async_trait::async_trait;
use serde::Deserialize;

use super::core::Dart;
use super::error::{DartError, Result};
use super::traits::FilingOperations;

/// Filings fetched per `list.json` page. Open DART caps this at 100.
const PAGE_COUNT: u32 = 100;

/// Cadence of the periodic reports a search targets.
///
/// Open DART tags periodic disclosures with a detail type code: `A001` for
/// annual business reports, `A002` for semiannual reports, and `A003` for
/// quarterly reports. A cadence also implies every coarser cadence, so asking
/// for quarterly data walks annual, then semiannual, then quarterly filings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportCadence {
    Annual,
    Semiannual,
    Quarterly,
}

impl ReportCadence {
    /// The `pblntf_detail_ty` code for this cadence.
    pub fn detail_type(&self) -> &'static str {
        match self {
            ReportCadence::Annual => "A001",
            ReportCadence::Semiannual => "A002",
            ReportCadence::Quarterly => "A003",
        }
    }

    /// Human-readable cadence name, used in progress logging.
    pub fn label(&self) -> &'static str {
        match self {
            ReportCadence::Annual => "Annual",
            ReportCadence::Semiannual => "Semiannual",
            ReportCadence::Quarterly => "Quarterly",
        }
    }

    /// All cadences from annual down to and including this one.
    pub fn progression(&self) -> &'static [ReportCadence] {
        match self {
            ReportCadence::Annual => &[ReportCadence::Annual],
            ReportCadence::Semiannual => &[ReportCadence::Annual, ReportCadence::Semiannual],
            ReportCadence::Quarterly => &[
                ReportCadence::Annual,
                ReportCadence::Semiannual,
                ReportCadence::Quarterly,
            ],
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ReportCadence::Annual => "annual",
            ReportCadence::Semiannual => "half",
            ReportCadence::Quarterly => "quarter",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "annual" => Some(ReportCadence::Annual),
            "half" => Some(ReportCadence::Semiannual),
            "quarter" => Some(ReportCadence::Quarterly),
            _ => None,
        }
    }
}

/// A single filing row from the Open DART `list.json` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingReference {
    /// DART corporation code (8 digits)
    pub corp_code: String,
    /// Corporation name
    pub corp_name: String,
    /// Stock ticker (6 digits), empty for unlisted companies
    #[serde(default)]
    pub stock_code: String,
    /// Corporation class: Y (KOSPI), K (KOSDAQ), N (KONEX), E (other)
    #[serde(default)]
    pub corp_cls: String,
    /// Report title, e.g. "사업보고서 (2018.12)"
    pub report_nm: String,
    /// Receipt number (14 digits), the filing's primary key
    pub rcept_no: String,
    /// Filer name
    #[serde(default)]
    pub flr_nm: String,
    /// Receipt date (YYYYMMDD)
    pub rcept_dt: String,
    /// Remark codes (유/정/철 etc.)
    #[serde(default)]
    pub rm: String,
}

impl FilingReference {
    /// The filing year, taken from the receipt date.
    pub fn year(&self) -> Option<i32> {
        self.rcept_dt.get(..4)?.parse().ok()
    }
}

/// Envelope of a `list.json` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub page_no: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub total_page: u32,
    #[serde(default, rename = "list")]
    pub filings: Vec<FilingReference>,
}

#[async_trait]
impl FilingOperations for Dart {
    /// Searches Open DART filings, walking every result page.
    ///
    /// Filings come back in the API's own order (newest receipt first). An
    /// in-band error status becomes the corresponding [`DartError`], so a
    /// `013` empty result surfaces as [`DartError::NoDataReceived`].
    async fn search_filings(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        pblntf_detail_ty: &str,
        last_report_only: bool,
    ) -> Result<Vec<FilingReference>> {
        let mut filings = Vec::new();
        let mut page_no = 1u32;

        loop {
            let page = page_no.to_string();
            let page_count = PAGE_COUNT.to_string();
            let url = self.api_endpoint(
                "list.json",
                &[
                    ("corp_code", corp_code),
                    ("bgn_de", bgn_de),
                    ("end_de", end_de.unwrap_or("")),
                    ("pblntf_detail_ty", pblntf_detail_ty),
                    ("last_reprt_at", if last_report_only { "Y" } else { "N" }),
                    ("page_no", &page),
                    ("page_count", &page_count),
                ],
            );

            let body = self.get(&url).await?;
            let response: SearchResponse = serde_json::from_str(&body)?;
            Dart::check_status(&response.status, &response.message)?;

            let total_page = response.total_page;
            filings.extend(response.filings);

            if page_no >= total_page {
                break;
            }
            page_no += 1;
        }

        Ok(filings)
    }

    /// Searches annual business reports, falling back to audit reports.
    ///
    /// Some companies never file a business report (`A001`) but do publish an
    /// audit report carrying the same statements; when the primary search
    /// comes back empty the search is retried with `F001` (separate) or
    /// `F002` (consolidated).
    async fn annual_reports(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        separate: bool,
    ) -> Result<Vec<FilingReference>> {
        let primary = self
            .search_filings(
                corp_code,
                bgn_de,
                end_de,
                ReportCadence::Annual.detail_type(),
                true,
            )
            .await;

        let filings = match primary {
            Err(DartError::NoDataReceived) => {
                let fallback = if separate { "F001" } else { "F002" };
                tracing::debug!(
                    "No business reports for {}; retrying with audit reports ({})",
                    corp_code,
                    fallback
                );
                self.search_filings(corp_code, bgn_de, end_de, fallback, true)
                    .await?
            }
            other => other?,
        };

        if filings.is_empty() {
            return Err(DartError::NotFound);
        }
        Ok(filings)
    }

    /// Searches semiannual or quarterly reports.
    ///
    /// Unlike annual reports these are optional in a date range that starts
    /// mid-year, so an empty result contributes an empty list instead of an
    /// error.
    async fn periodic_reports(
        &self,
        corp_code: &str,
        bgn_de: &str,
        end_de: Option<&str>,
        cadence: ReportCadence,
    ) -> Result<Vec<FilingReference>> {
        match self
            .search_filings(corp_code, bgn_de, end_de, cadence.detail_type(), true)
            .await
        {
            Err(DartError::NoDataReceived) => Ok(Vec::new()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_codes() {
        assert_eq!(ReportCadence::Annual.detail_type(), "A001");
        assert_eq!(ReportCadence::Semiannual.detail_type(), "A002");
        assert_eq!(ReportCadence::Quarterly.detail_type(), "A003");
    }

    #[test]
    fn test_cadence_progression() {
        assert_eq!(
            ReportCadence::Quarterly.progression(),
            &[
                ReportCadence::Annual,
                ReportCadence::Semiannual,
                ReportCadence::Quarterly
            ]
        );
        assert_eq!(ReportCadence::Annual.progression(), &[ReportCadence::Annual]);
        assert_eq!(ReportCadence::from_tag("half"), Some(ReportCadence::Semiannual));
    }

    #[test]
    fn test_search_response_deserializes() {
        let body = r#"{
            "status": "000",
            "message": "정상",
            "page_no": 1,
            "page_count": 100,
            "total_count": 2,
            "total_page": 1,
            "list": [
                {
                    "corp_code": "00126380",
                    "corp_name": "삼성전자",
                    "stock_code": "005930",
                    "corp_cls": "Y",
                    "report_nm": "사업보고서 (2018.12)",
                    "rcept_no": "20190401004781",
                    "flr_nm": "삼성전자",
                    "rcept_dt": "20190401",
                    "rm": "연"
                },
                {
                    "corp_code": "00126380",
                    "corp_name": "삼성전자",
                    "stock_code": "005930",
                    "corp_cls": "Y",
                    "report_nm": "사업보고서 (2017.12)",
                    "rcept_no": "20180402005019",
                    "flr_nm": "삼성전자",
                    "rcept_dt": "20180402",
                    "rm": "연"
                }
            ]
        }"#;

        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.status, "000");
        assert_eq!(response.total_page, 1);
        assert_eq!(response.filings.len(), 2);
        assert_eq!(response.filings[0].rcept_no, "20190401004781");
        assert_eq!(response.filings[0].year(), Some(2019));
    }

    #[test]
    fn test_error_envelope_deserializes_without_list() {
        let body = r#"{"status": "013", "message": "조회된 데이타가 없습니다."}"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.status, "013");
        assert!(response.filings.is_empty());
    }
}
