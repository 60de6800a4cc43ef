//! The row/column data model shared by the HTML extractor, the XBRL
//! materializer, and the reconciliation engine.
//!
//! A [`StatementMatrix`] is a flat 2-D table: a handful of metadata columns
//! (concept id, labels, class hierarchy) followed by one data column per
//! reporting period and classification. The parallel [`LabelShadowTable`]
//! records, per date column, which native label sourced each row's value; it
//! is a first-class output because label-based row matching during merges is
//! reproduced from it.

use chrono::NaiveDate;
use std::collections::HashSet;

/// The four statement types the extraction core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Statement of financial position (balance sheet)
    Bs,
    /// Income statement
    Is,
    /// Statement of comprehensive income
    Cis,
    /// Statement of cash flows
    Cf,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::Bs,
        StatementKind::Is,
        StatementKind::Cis,
        StatementKind::Cf,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            StatementKind::Bs => "bs",
            StatementKind::Is => "is",
            StatementKind::Cis => "cis",
            StatementKind::Cf => "cf",
        }
    }

    pub fn english_title(&self) -> &'static str {
        match self {
            StatementKind::Bs => "Statement of financial position",
            StatementKind::Is => "Income statement",
            StatementKind::Cis => "Statement of comprehensive income",
            StatementKind::Cf => "Statement of cash flows",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bs" => Some(StatementKind::Bs),
            "is" => Some(StatementKind::Is),
            "cis" => Some(StatementKind::Cis),
            "cf" => Some(StatementKind::Cf),
            _ => None,
        }
    }
}

/// Label language selection for extracted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Ko,
    En,
}

impl Lang {
    pub fn tag(&self) -> &'static str {
        match self {
            Lang::Ko => "ko",
            Lang::En => "en",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ko" => Some(Lang::Ko),
            "en" => Some(Lang::En),
            _ => None,
        }
    }
}

/// A reporting period: either a balance-sheet style instant or a flow-style
/// interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Instant(NaiveDate),
    Interval { start: NaiveDate, end: NaiveDate },
}

impl Period {
    /// Canonical string form: `YYYYMMDD` or `YYYYMMDD-YYYYMMDD`.
    pub fn key(&self) -> String {
        match self {
            Period::Instant(date) => date.format("%Y%m%d").to_string(),
            Period::Interval { start, end } => {
                format!("{}-{}", start.format("%Y%m%d"), end.format("%Y%m%d"))
            }
        }
    }

    /// The first embedded date, used for descending column ordering.
    pub fn sort_date(&self) -> NaiveDate {
        match self {
            Period::Instant(date) => *date,
            Period::Interval { start, .. } => *start,
        }
    }

    /// Parses the canonical string form back into a period.
    pub fn parse(text: &str) -> Option<Period> {
        let parse_date = |s: &str| NaiveDate::parse_from_str(s, "%Y%m%d").ok();
        match text.split_once('-') {
            Some((start, end)) => Some(Period::Interval {
                start: parse_date(start)?,
                end: parse_date(end)?,
            }),
            None => Some(Period::Instant(parse_date(text)?)),
        }
    }
}

/// Composite key of a data column: the period plus the classification labels
/// (consolidated/separate, dimension members) that qualify it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    pub period: Period,
    pub labels: Vec<String>,
}

impl ColumnKey {
    pub fn new(period: Period, labels: Vec<String>) -> Self {
        ColumnKey { period, labels }
    }
}

/// Metadata (non-period) columns of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaColumn {
    ConceptId,
    LabelKo,
    LabelEn,
    Comment,
    Class(usize),
}

impl MetaColumn {
    pub fn name(&self) -> String {
        match self {
            MetaColumn::ConceptId => "concept_id".to_string(),
            MetaColumn::LabelKo => "label_ko".to_string(),
            MetaColumn::LabelEn => "label_en".to_string(),
            MetaColumn::Comment => "comment".to_string(),
            MetaColumn::Class(depth) => format!("class{}", depth),
        }
    }

    pub fn parse(name: &str) -> Option<MetaColumn> {
        match name {
            "concept_id" => Some(MetaColumn::ConceptId),
            "label_ko" => Some(MetaColumn::LabelKo),
            "label_en" => Some(MetaColumn::LabelEn),
            "comment" => Some(MetaColumn::Comment),
            _ => name
                .strip_prefix("class")
                .and_then(|d| d.parse().ok())
                .map(MetaColumn::Class),
        }
    }
}

/// One column of a [`StatementMatrix`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Meta(MetaColumn),
    Data(ColumnKey),
}

impl Column {
    pub fn as_data(&self) -> Option<&ColumnKey> {
        match self {
            Column::Data(key) => Some(key),
            Column::Meta(_) => None,
        }
    }
}

/// A single cell. `Empty` is the explicit "no data" sentinel; a zero from the
/// source is stored as `Number(0.0)`, never collapsed into `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A financial statement materialized as a flat table.
///
/// Metadata columns come first in their original order, then data columns.
/// Column keys are unique: adding a data column whose key already exists is a
/// no-op (keep-first), which preserves the uniqueness invariant across merges.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementMatrix {
    title: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl StatementMatrix {
    pub fn new(title: impl Into<String>, columns: Vec<Column>) -> Self {
        StatementMatrix {
            title: title.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, idx: usize) -> &[Cell] {
        &self.rows[idx]
    }

    /// Appends a row; the cell count must match the column count.
    pub fn push_row(&mut self, cells: Vec<Cell>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        self.rows.push(cells);
    }

    pub fn column_index(&self, column: &Column) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn meta_index(&self, meta: MetaColumn) -> Option<usize> {
        self.column_index(&Column::Meta(meta))
    }

    pub fn data_index(&self, key: &ColumnKey) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.as_data() == Some(key))
    }

    /// All data column keys in column order.
    pub fn data_keys(&self) -> Vec<ColumnKey> {
        self.columns
            .iter()
            .filter_map(|c| c.as_data().cloned())
            .collect()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    pub fn cell_by_key(&self, row: usize, key: &ColumnKey) -> Option<&Cell> {
        self.data_index(key).map(|col| &self.rows[row][col])
    }

    pub fn meta_cell(&self, row: usize, meta: MetaColumn) -> Option<&Cell> {
        self.meta_index(meta).map(|col| &self.rows[row][col])
    }

    /// Text of a metadata cell, empty string when absent.
    pub fn meta_text(&self, row: usize, meta: MetaColumn) -> String {
        self.meta_cell(row, meta)
            .and_then(|c| c.as_text())
            .unwrap_or("")
            .to_string()
    }

    /// True when every data cell in the matrix is the no-data sentinel.
    pub fn is_data_empty(&self) -> bool {
        let data_indices: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Column::Data(_)))
            .map(|(i, _)| i)
            .collect();
        if data_indices.is_empty() {
            return true;
        }
        self.rows
            .iter()
            .all(|row| data_indices.iter().all(|&i| row[i].is_empty()))
    }

    /// Appends a data column. Duplicate keys are dropped (keep-first), so the
    /// column-key uniqueness invariant always holds.
    pub fn add_data_column(&mut self, key: ColumnKey, cells: Vec<Cell>) {
        if self.data_index(&key).is_some() {
            tracing::debug!("Dropping duplicate data column {:?}", key);
            return;
        }
        debug_assert_eq!(cells.len(), self.rows.len());
        self.columns.push(Column::Data(key));
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
    }

    /// Drops data columns that are empty in every row. Metadata columns are
    /// always retained.
    pub fn drop_empty_data_columns(&mut self) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| match c {
                Column::Meta(_) => true,
                Column::Data(_) => self.rows.iter().any(|row| !row[i].is_empty()),
            })
            .collect();
        self.retain_columns(&keep);
    }

    /// Drops data columns with fewer than `min_count + 1` populated cells.
    /// Guards against one-off footnote columns surviving an extraction.
    pub fn drop_sparse_data_columns(&mut self, min_count: usize) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| match c {
                Column::Meta(_) => true,
                Column::Data(_) => {
                    self.rows.iter().filter(|row| !row[i].is_empty()).count() > min_count
                }
            })
            .collect();
        self.retain_columns(&keep);
    }

    /// Keeps only the data columns whose key satisfies the predicate.
    /// Metadata columns are always retained.
    pub fn retain_data_columns_where(&mut self, pred: impl Fn(&ColumnKey) -> bool) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| match c {
                Column::Meta(_) => true,
                Column::Data(key) => pred(key),
            })
            .collect();
        self.retain_columns(&keep);
    }

    fn retain_columns(&mut self, keep: &[bool]) {
        let mut idx = 0;
        self.columns.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        for row in &mut self.rows {
            let mut idx = 0;
            row.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
    }

    /// Reorders data columns by embedded date descending; metadata columns
    /// keep their original position in front.
    pub fn sort_data_columns(&mut self) {
        let mut meta: Vec<usize> = Vec::new();
        let mut data: Vec<usize> = Vec::new();
        for (i, column) in self.columns.iter().enumerate() {
            match column {
                Column::Meta(_) => meta.push(i),
                Column::Data(_) => data.push(i),
            }
        }
        data.sort_by(|&a, &b| {
            let ka = self.columns[a].as_data().map(|k| k.period.key());
            let kb = self.columns[b].as_data().map(|k| k.period.key());
            kb.cmp(&ka)
        });
        let order: Vec<usize> = meta.into_iter().chain(data).collect();
        self.columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&i| row[i].clone()).collect();
        }
    }
}

/// Per-date-column record of which native label sourced each row's value.
///
/// The default column holds the canonical concept title per row (when a
/// concept column exists); every data column holds the Korean label text that
/// matched during extraction or merging. An empty string means "checked, no
/// label found" as opposed to a column that was never recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelShadowTable {
    default_titles: Option<Vec<String>>,
    columns: Vec<(ColumnKey, Vec<String>)>,
}

impl LabelShadowTable {
    pub fn new(default_titles: Option<Vec<String>>) -> Self {
        LabelShadowTable {
            default_titles,
            columns: Vec::new(),
        }
    }

    pub fn default_titles(&self) -> Option<&[String]> {
        self.default_titles.as_deref()
    }

    pub fn columns(&self) -> &[(ColumnKey, Vec<String>)] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.default_titles
            .as_ref()
            .map(|t| t.len())
            .or_else(|| self.columns.first().map(|(_, l)| l.len()))
            .unwrap_or(0)
    }

    /// Appends a label column (keep-first on duplicate keys, mirroring
    /// [`StatementMatrix::add_data_column`]).
    pub fn add_column(&mut self, key: ColumnKey, labels: Vec<String>) {
        if self.columns.iter().any(|(k, _)| k == &key) {
            return;
        }
        self.columns.push((key, labels));
    }

    /// Every label ever recorded for a row, for label-based matching.
    pub fn row_label_set(&self, row: usize) -> HashSet<String> {
        let mut set = HashSet::new();
        if let Some(titles) = &self.default_titles {
            if let Some(t) = titles.get(row) {
                if !t.is_empty() {
                    set.insert(t.clone());
                }
            }
        }
        for (_, labels) in &self.columns {
            if let Some(l) = labels.get(row) {
                if !l.is_empty() {
                    set.insert(l.clone());
                }
            }
        }
        set
    }

    /// Drops label columns that are empty strings in every row.
    pub fn drop_empty_columns(&mut self) {
        self.columns
            .retain(|(_, labels)| labels.iter().any(|l| !l.is_empty()));
    }

    /// Orders label columns by embedded date descending, matching the data
    /// matrix ordering.
    pub fn sort_columns(&mut self) {
        self.columns
            .sort_by(|(a, _), (b, _)| b.period.key().cmp(&a.period.key()));
    }
}
