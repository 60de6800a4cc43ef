//! Extraction orchestration: from a filing search to a reconciled result.
//!
//! The pipeline walks periodic filings newest-first, one cadence at a time
//! (annual, then semiannual, then quarterly when requested). The first filing
//! that yields statement tables becomes the anchor; every later filing is
//! folded into it through the reconciliation engine, so the anchor's row
//! order and account titles win and older periods accumulate as new data
//! columns.
//!
//! Filings from 2012 onward are analyzed from their XBRL attachment when one
//! exists; older filings, and filings without XBRL, fall back to scraping the
//! viewer HTML pages.

use std::collections::HashMap;

use super::error::{DartError, Result};
use super::filings::{FilingReference, ReportCadence};
use super::html;
use super::matrix::{Lang, LabelShadowTable, StatementKind, StatementMatrix};
use super::merge::{init_shadow, merge_into};
use super::result::{ExtractInfo, FinancialStatementResult};
use super::traits::{FilingOperations, SourceConnector};
use super::xbrl::{XbrlDocument, XbrlRenderOptions};

/// First filing year for which DART mandates XBRL attachments.
const FIRST_XBRL_YEAR: i32 = 2012;

/// Minimum populated cells for a dated column to survive a filing's analysis.
const MIN_DATA_POINTS: usize = 1;

/// Parameters of an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub corp_code: String,
    pub bgn_de: String,
    pub end_de: Option<String>,
    pub kinds: Vec<StatementKind>,
    pub separate: bool,
    pub lang: Lang,
    pub report_tp: ReportCadence,
    pub skip_error: bool,
    pub prefer_xbrl: bool,
}

impl ExtractOptions {
    /// Default options: all four statements, consolidated, Korean labels,
    /// annual reports only, XBRL preferred, per-filing errors skipped.
    pub fn new(corp_code: impl Into<String>, bgn_de: impl Into<String>) -> Self {
        ExtractOptions {
            corp_code: corp_code.into(),
            bgn_de: bgn_de.into(),
            end_de: None,
            kinds: StatementKind::ALL.to_vec(),
            separate: false,
            lang: Lang::Ko,
            report_tp: ReportCadence::Annual,
            skip_error: true,
            prefer_xbrl: true,
        }
    }

    pub fn end_de(mut self, end_de: impl Into<String>) -> Self {
        self.end_de = Some(end_de.into());
        self
    }

    pub fn kinds(mut self, kinds: &[StatementKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn separate(mut self, separate: bool) -> Self {
        self.separate = separate;
        self
    }

    pub fn lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn report_tp(mut self, cadence: ReportCadence) -> Self {
        self.report_tp = cadence;
        self
    }

    pub fn skip_error(mut self, skip_error: bool) -> Self {
        self.skip_error = skip_error;
        self
    }

    /// Prefer viewer HTML over XBRL even for filings that carry XBRL.
    pub fn prefer_web(mut self) -> Self {
        self.prefer_xbrl = false;
        self
    }
}

/// Searches filings and folds them into a reconciled financial statement.
///
/// Returns [`DartError::NotFoundConsolidated`] when consolidated statements
/// were requested but none could be found across the whole window, and
/// [`DartError::MergeFailure`] when `skip_error` is off and a single filing's
/// analysis or reconciliation fails.
pub async fn extract<D, C>(
    directory: &D,
    connector: &C,
    options: &ExtractOptions,
) -> Result<FinancialStatementResult>
where
    D: FilingOperations + Sync,
    C: SourceConnector + Sync,
{
    let mut statements: Option<HashMap<StatementKind, Option<StatementMatrix>>> = None;
    let mut shadows: HashMap<StatementKind, LabelShadowTable> = HashMap::new();

    for cadence in options.report_tp.progression() {
        let filings = match cadence {
            ReportCadence::Annual => {
                directory
                    .annual_reports(
                        &options.corp_code,
                        &options.bgn_de,
                        options.end_de.as_deref(),
                        options.separate,
                    )
                    .await?
            }
            other => {
                directory
                    .periodic_reports(
                        &options.corp_code,
                        &options.bgn_de,
                        options.end_de.as_deref(),
                        *other,
                    )
                    .await?
            }
        };
        tracing::debug!("{} {} reports found", filings.len(), cadence.label());

        for filing in &filings {
            if let Err(err) = fold_filing(connector, filing, options, &mut statements, &mut shadows).await
            {
                let err = DartError::merge_failure(
                    &filing.rcept_no,
                    &filing.report_nm,
                    &filing.rcept_dt,
                    err,
                );
                if options.skip_error {
                    tracing::warn!("Skipping filing: {}", err);
                } else {
                    return Err(err);
                }
            }
        }
    }

    let mut statements = statements.unwrap_or_else(|| {
        options.kinds.iter().map(|kind| (*kind, None)).collect()
    });
    if !options.separate && statements.values().all(Option::is_none) {
        return Err(DartError::NotFoundConsolidated);
    }

    for matrix in statements.values_mut().flatten() {
        matrix.drop_empty_data_columns();
        matrix.sort_data_columns();
    }
    let mut labels: HashMap<StatementKind, Option<LabelShadowTable>> = HashMap::new();
    for kind in &options.kinds {
        let shadow = shadows.remove(kind).map(|mut shadow| {
            shadow.drop_empty_columns();
            shadow.sort_columns();
            shadow
        });
        labels.insert(*kind, shadow);
    }

    let info = ExtractInfo {
        corp_code: options.corp_code.clone(),
        bgn_de: options.bgn_de.clone(),
        end_de: options.end_de.clone(),
        separate: options.separate,
        report_tp: options.report_tp,
        lang: options.lang,
    };
    Ok(FinancialStatementResult::new(statements, labels, info))
}

/// Analyzes one filing and folds its statements into the running result.
async fn fold_filing<C>(
    connector: &C,
    filing: &FilingReference,
    options: &ExtractOptions,
    statements: &mut Option<HashMap<StatementKind, Option<StatementMatrix>>>,
    shadows: &mut HashMap<StatementKind, LabelShadowTable>,
) -> Result<()>
where
    C: SourceConnector + Sync,
{
    let analyzed = analyze_filing(connector, filing, options).await?;

    match statements {
        None => {
            if !options.separate && analyzed.values().all(Option::is_none) {
                return Err(DartError::NotFoundConsolidated);
            }
            let mut seed = HashMap::new();
            for kind in &options.kinds {
                let matrix = analyzed.get(kind).cloned().flatten();
                seed.insert(*kind, seed_kind(*kind, matrix, shadows));
            }
            *statements = Some(seed);
        }
        Some(base_map) => {
            for kind in &options.kinds {
                let Some(Some(new)) = analyzed.get(kind) else {
                    continue;
                };
                match (base_map.get_mut(kind), shadows.get_mut(kind)) {
                    (Some(Some(base)), Some(shadow)) => merge_into(base, shadow, new),
                    _ => {
                        // a statement kind that earlier filings never carried
                        let seeded = seed_kind(*kind, Some(new.clone()), shadows);
                        base_map.insert(*kind, seeded);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Installs a freshly analyzed matrix as the anchor for its statement kind.
///
/// A matrix without a Korean label column cannot anchor reconciliation and is
/// dropped with a warning.
fn seed_kind(
    kind: StatementKind,
    matrix: Option<StatementMatrix>,
    shadows: &mut HashMap<StatementKind, LabelShadowTable>,
) -> Option<StatementMatrix> {
    let matrix = matrix?;
    match init_shadow(&matrix) {
        Some(shadow) => {
            shadows.insert(kind, shadow);
            Some(matrix)
        }
        None => {
            tracing::warn!(
                "Discarding {} table without a label_ko column: {}",
                kind.tag(),
                matrix.title()
            );
            None
        }
    }
}

/// Analyzes a single filing into per-kind statement matrices.
///
/// XBRL is used when the filing is recent enough to carry it and the source
/// has it; otherwise the viewer pages are scanned front to back and the first
/// page with any requested statement table wins. Columns with at most
/// [`MIN_DATA_POINTS`] populated cells are dropped before reconciliation.
pub async fn analyze_filing<C>(
    connector: &C,
    filing: &FilingReference,
    options: &ExtractOptions,
) -> Result<HashMap<StatementKind, Option<StatementMatrix>>>
where
    C: SourceConnector + Sync,
{
    let xbrl = if options.prefer_xbrl && filing.year().is_some_and(|year| year >= FIRST_XBRL_YEAR)
    {
        connector.fetch_xbrl(filing).await?
    } else {
        None
    };

    let mut analyzed = match xbrl {
        Some(document) => analyze_xbrl(&document, options)?,
        None => analyze_pages(connector, filing, options).await?,
    };

    for matrix in analyzed.values_mut().flatten() {
        matrix.drop_sparse_data_columns(MIN_DATA_POINTS);
    }
    Ok(analyzed)
}

/// Materializes the requested statements from an XBRL document.
fn analyze_xbrl(
    document: &XbrlDocument,
    options: &ExtractOptions,
) -> Result<HashMap<StatementKind, Option<StatementMatrix>>> {
    if !options.separate && !document.exist_consolidated() {
        return Err(DartError::NotFoundConsolidated);
    }

    let currency = document
        .reporting_currency()
        .unwrap_or_else(|| "KRW".to_string());
    let render = XbrlRenderOptions::for_scope(options.separate, options.lang);

    let mut analyzed = HashMap::new();
    for kind in &options.kinds {
        let matrix = document
            .statement_table(*kind, options.separate)
            .map(|table| table.to_matrix(&currency, &render));
        analyzed.insert(*kind, matrix);
    }
    Ok(analyzed)
}

/// Scrapes the requested statements from the filing's viewer pages.
///
/// Pages are tried in document order; the first page yielding any requested
/// table supplies the whole filing's statements. Non-breaking spaces are
/// normalized before parsing since viewer pages pad header cells with them.
async fn analyze_pages<C>(
    connector: &C,
    filing: &FilingReference,
    options: &ExtractOptions,
) -> Result<HashMap<StatementKind, Option<StatementMatrix>>>
where
    C: SourceConnector + Sync,
{
    let pages = connector.fetch_pages(filing, options.separate).await?;
    for page in &pages {
        let page = page.replace('\u{a0}', " ");
        let found = html::extract_statements(&page, &options.kinds, options.separate, options.lang);
        if found.values().any(Option::is_some) {
            return Ok(found);
        }
    }

    tracing::debug!(
        "No statement tables found in {} pages of filing {}",
        pages.len(),
        filing.rcept_no
    );
    Ok(options.kinds.iter().map(|kind| (*kind, None)).collect())
}
