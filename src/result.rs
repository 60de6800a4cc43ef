//! Result container for an extraction run and its CSV persistence.
//!
//! A [`FinancialStatementResult`] bundles the reconciled statement matrices,
//! their label shadow tables, and the request parameters that produced them.
//! The whole bundle round-trips through a directory of CSV files: `info.csv`
//! for the request parameters, plus `data_{tag}.csv` and `labels_{tag}.csv`
//! per statement kind. Data files carry a fixed two-row header: the first row
//! holds the statement title over the metadata columns and the period key
//! over each data column, the second row holds the metadata column name or
//! the `|`-joined scope labels.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};

use super::error::{DartError, Result};
use super::filings::ReportCadence;
use super::matrix::{
    Cell, Column, ColumnKey, LabelShadowTable, Lang, MetaColumn, Period, StatementKind,
    StatementMatrix,
};

/// The request parameters an extraction ran with.
#[derive(Debug, Clone)]
pub struct ExtractInfo {
    pub corp_code: String,
    pub bgn_de: String,
    pub end_de: Option<String>,
    pub separate: bool,
    pub report_tp: ReportCadence,
    pub lang: Lang,
}

/// Reconciled financial statements for one company and date range.
#[derive(Debug, Clone)]
pub struct FinancialStatementResult {
    statements: HashMap<StatementKind, Option<StatementMatrix>>,
    labels: HashMap<StatementKind, Option<LabelShadowTable>>,
    info: ExtractInfo,
}

impl FinancialStatementResult {
    pub fn new(
        statements: HashMap<StatementKind, Option<StatementMatrix>>,
        labels: HashMap<StatementKind, Option<LabelShadowTable>>,
        info: ExtractInfo,
    ) -> Self {
        FinancialStatementResult {
            statements,
            labels,
            info,
        }
    }

    pub fn info(&self) -> &ExtractInfo {
        &self.info
    }

    /// The statement kinds present in this result, in fixed bs/is/cis/cf order.
    pub fn kinds(&self) -> Vec<StatementKind> {
        StatementKind::ALL
            .iter()
            .copied()
            .filter(|kind| matches!(self.statements.get(kind), Some(Some(_))))
            .collect()
    }

    pub fn statement(&self, kind: StatementKind) -> Option<&StatementMatrix> {
        self.statements.get(&kind).and_then(|m| m.as_ref())
    }

    pub fn labels(&self, kind: StatementKind) -> Option<&LabelShadowTable> {
        self.labels.get(&kind).and_then(|l| l.as_ref())
    }

    /// Saves the result as a directory of CSV files, creating it if needed.
    ///
    /// Returns the container directory path.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        self.write_info(&dir.join("info.csv"))?;
        for kind in self.kinds() {
            if let Some(matrix) = self.statement(kind) {
                write_matrix(matrix, &dir.join(format!("data_{}.csv", kind.tag())))?;
            }
            if let Some(shadow) = self.labels(kind) {
                write_shadow(shadow, &dir.join(format!("labels_{}.csv", kind.tag())))?;
            }
        }
        Ok(dir.to_path_buf())
    }

    /// Loads a result previously written by [`save`](Self::save).
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let info = read_info(&dir.join("info.csv"))?;

        let mut statements = HashMap::new();
        let mut labels = HashMap::new();
        for kind in StatementKind::ALL {
            let data_path = dir.join(format!("data_{}.csv", kind.tag()));
            if data_path.exists() {
                statements.insert(kind, Some(read_matrix(&data_path)?));
            } else {
                statements.insert(kind, None);
            }
            let labels_path = dir.join(format!("labels_{}.csv", kind.tag()));
            if labels_path.exists() {
                labels.insert(kind, Some(read_shadow(&labels_path)?));
            } else {
                labels.insert(kind, None);
            }
        }

        Ok(FinancialStatementResult {
            statements,
            labels,
            info,
        })
    }

    fn write_info(&self, path: &Path) -> Result<()> {
        let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
        writer.write_record(["corp_code", self.info.corp_code.as_str()])?;
        writer.write_record(["bgn_de", self.info.bgn_de.as_str()])?;
        writer.write_record(["end_de", self.info.end_de.as_deref().unwrap_or("")])?;
        writer.write_record(["separate", if self.info.separate { "true" } else { "false" }])?;
        writer.write_record(["report_tp", self.info.report_tp.tag()])?;
        writer.write_record(["lang", self.info.lang.tag()])?;
        writer.flush()?;
        Ok(())
    }
}

fn read_info(path: &Path) -> Result<ExtractInfo> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut fields: HashMap<String, String> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(key), Some(value)) = (record.get(0), record.get(1)) {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    let field = |key: &str| -> Result<String> {
        fields
            .get(key)
            .cloned()
            .ok_or_else(|| DartError::ParseError(format!("info.csv is missing '{}'", key)))
    };

    let end_de = field("end_de")?;
    Ok(ExtractInfo {
        corp_code: field("corp_code")?,
        bgn_de: field("bgn_de")?,
        end_de: if end_de.is_empty() { None } else { Some(end_de) },
        separate: field("separate")? == "true",
        report_tp: ReportCadence::from_tag(&field("report_tp")?)
            .ok_or_else(|| DartError::ParseError("info.csv has an unknown report_tp".to_string()))?,
        lang: Lang::from_tag(&field("lang")?)
            .ok_or_else(|| DartError::ParseError("info.csv has an unknown lang".to_string()))?,
    })
}

fn cell_to_field(cell: &Cell) -> String {
    match cell {
        Cell::Number(v) => v.to_string(),
        Cell::Text(s) => s.clone(),
        Cell::Empty => String::new(),
    }
}

fn field_to_cell(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Empty
    } else if let Ok(v) = field.parse::<f64>() {
        Cell::Number(v)
    } else {
        Cell::Text(field.to_string())
    }
}

fn write_matrix(matrix: &StatementMatrix, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut top = Vec::new();
    let mut bottom = Vec::new();
    for column in matrix.columns() {
        match column {
            Column::Meta(meta) => {
                top.push(matrix.title().to_string());
                bottom.push(meta.name());
            }
            Column::Data(key) => {
                top.push(key.period.key());
                bottom.push(key.labels.join("|"));
            }
        }
    }
    writer.write_record(&top)?;
    writer.write_record(&bottom)?;

    for idx in 0..matrix.n_rows() {
        let record: Vec<String> = matrix.row(idx).iter().map(cell_to_field).collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_matrix(path: &Path) -> Result<StatementMatrix> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = reader.records();
    let top = records
        .next()
        .transpose()?
        .ok_or_else(|| DartError::ParseError(format!("{} has no header rows", path.display())))?;
    let bottom = records
        .next()
        .transpose()?
        .ok_or_else(|| DartError::ParseError(format!("{} has no header rows", path.display())))?;

    let mut title = String::new();
    let mut columns = Vec::new();
    for (first, second) in top.iter().zip(bottom.iter()) {
        if let Some(period) = Period::parse(first) {
            let labels = if second.is_empty() {
                Vec::new()
            } else {
                second.split('|').map(str::to_string).collect()
            };
            columns.push(Column::Data(ColumnKey::new(period, labels)));
        } else {
            let meta = MetaColumn::parse(second).ok_or_else(|| {
                DartError::ParseError(format!("unknown metadata column '{}'", second))
            })?;
            if title.is_empty() {
                title = first.to_string();
            }
            columns.push(Column::Meta(meta));
        }
    }

    let mut matrix = StatementMatrix::new(title, columns);
    for record in records {
        let record = record?;
        matrix.push_row(record.iter().map(field_to_cell).collect());
    }
    Ok(matrix)
}

fn write_shadow(shadow: &LabelShadowTable, path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let defaults = shadow.default_titles();
    let mut top = Vec::new();
    let mut bottom = Vec::new();
    if defaults.is_some() {
        top.push(MetaColumn::ConceptId.name());
        bottom.push(String::new());
    }
    for (key, _) in shadow.columns() {
        top.push(key.period.key());
        bottom.push(key.labels.join("|"));
    }
    writer.write_record(&top)?;
    writer.write_record(&bottom)?;

    for idx in 0..shadow.n_rows() {
        let mut record = Vec::new();
        if let Some(titles) = defaults {
            record.push(titles.get(idx).cloned().unwrap_or_default());
        }
        for (_, labels) in shadow.columns() {
            record.push(labels.get(idx).cloned().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_shadow(path: &Path) -> Result<LabelShadowTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = reader.records();
    let top = records
        .next()
        .transpose()?
        .ok_or_else(|| DartError::ParseError(format!("{} has no header rows", path.display())))?;
    let bottom = records
        .next()
        .transpose()?
        .ok_or_else(|| DartError::ParseError(format!("{} has no header rows", path.display())))?;

    let has_defaults = top
        .get(0)
        .is_some_and(|name| name == MetaColumn::ConceptId.name());
    let first_data = if has_defaults { 1 } else { 0 };

    let mut keys = Vec::new();
    for (first, second) in top.iter().zip(bottom.iter()).skip(first_data) {
        let period = Period::parse(first).ok_or_else(|| {
            DartError::ParseError(format!("label column '{}' is not a period key", first))
        })?;
        let labels = if second.is_empty() {
            Vec::new()
        } else {
            second.split('|').map(str::to_string).collect()
        };
        keys.push(ColumnKey::new(period, labels));
    }

    let mut defaults: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); keys.len()];
    for record in records {
        let record = record?;
        if has_defaults {
            defaults.push(record.get(0).unwrap_or("").to_string());
        }
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(record.get(first_data + idx).unwrap_or("").to_string());
        }
    }

    let mut shadow = LabelShadowTable::new(if has_defaults { Some(defaults) } else { None });
    for (key, labels) in keys.into_iter().zip(columns) {
        shadow.add_column(key, labels);
    }
    Ok(shadow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Cell, Column, ColumnKey, MetaColumn, Period, StatementMatrix};

    fn sample_matrix() -> StatementMatrix {
        let mut matrix = StatementMatrix::new(
            "Statement of financial position (Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::ConceptId),
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(ColumnKey::new(
                    Period::parse("20181231").unwrap(),
                    vec!["연결재무제표".to_string()],
                )),
                Column::Data(ColumnKey::new(
                    Period::parse("20171231").unwrap(),
                    vec!["연결재무제표".to_string()],
                )),
            ],
        );
        matrix.push_row(vec![
            Cell::Text("ifrs_Assets".to_string()),
            Cell::Text("자산총계".to_string()),
            Cell::Number(339_357_244_000_000.0),
            Cell::Number(301_752_090_000_000.0),
        ]);
        matrix.push_row(vec![
            Cell::Text("ifrs_Liabilities".to_string()),
            Cell::Text("부채총계".to_string()),
            Cell::Number(91_604_067_000_000.0),
            Cell::Empty,
        ]);
        matrix
    }

    fn sample_info() -> ExtractInfo {
        ExtractInfo {
            corp_code: "00126380".to_string(),
            bgn_de: "20170101".to_string(),
            end_de: None,
            separate: false,
            report_tp: ReportCadence::Annual,
            lang: Lang::Ko,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let matrix = sample_matrix();
        let mut shadow = LabelShadowTable::new(Some(vec![
            "ifrs_Assets".to_string(),
            "ifrs_Liabilities".to_string(),
        ]));
        shadow.add_column(
            ColumnKey::new(
                Period::parse("20181231").unwrap(),
                vec!["연결재무제표".to_string()],
            ),
            vec!["자산총계".to_string(), "부채총계".to_string()],
        );

        let mut statements = HashMap::new();
        let mut labels = HashMap::new();
        for kind in StatementKind::ALL {
            statements.insert(kind, None);
            labels.insert(kind, None);
        }
        statements.insert(StatementKind::Bs, Some(matrix.clone()));
        labels.insert(StatementKind::Bs, Some(shadow));

        let result = FinancialStatementResult::new(statements, labels, sample_info());

        let dir = tempfile::tempdir().unwrap();
        let saved = result.save(dir.path().join("00126380_annual")).unwrap();
        let loaded = FinancialStatementResult::load(&saved).unwrap();

        assert_eq!(loaded.kinds(), vec![StatementKind::Bs]);
        assert_eq!(loaded.info().corp_code, "00126380");
        assert_eq!(loaded.info().end_de, None);
        assert_eq!(loaded.info().report_tp, ReportCadence::Annual);

        let reloaded = loaded.statement(StatementKind::Bs).unwrap();
        assert_eq!(reloaded.title(), matrix.title());
        assert_eq!(reloaded.columns(), matrix.columns());
        assert_eq!(reloaded.row(0), matrix.row(0));
        assert_eq!(reloaded.row(1), matrix.row(1));

        let shadow = loaded.labels(StatementKind::Bs).unwrap();
        assert_eq!(
            shadow.default_titles(),
            Some(&["ifrs_Assets".to_string(), "ifrs_Liabilities".to_string()][..])
        );
        assert_eq!(shadow.columns()[0].1, vec!["자산총계", "부채총계"]);
    }

    #[test]
    fn test_missing_statement_stays_none() {
        let mut statements = HashMap::new();
        let mut labels = HashMap::new();
        for kind in StatementKind::ALL {
            statements.insert(kind, None);
            labels.insert(kind, None);
        }
        statements.insert(StatementKind::Cf, Some(sample_matrix()));

        let result = FinancialStatementResult::new(statements, labels, sample_info());
        let dir = tempfile::tempdir().unwrap();
        let saved = result.save(dir.path().join("fsdata")).unwrap();
        let loaded = FinancialStatementResult::load(&saved).unwrap();

        assert!(loaded.statement(StatementKind::Bs).is_none());
        assert!(loaded.statement(StatementKind::Cf).is_some());
        assert!(loaded.labels(StatementKind::Cf).is_none());
    }
}
