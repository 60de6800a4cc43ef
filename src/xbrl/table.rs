//! Materialization of a role table's presentation tree into a
//! [`StatementMatrix`].

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

use crate::matrix::{Cell, Column, ColumnKey, Lang, MetaColumn, Period, StatementMatrix};

use super::document::{Classification, LabelNode, XbrlTable};

/// Rendering options for [`XbrlTable::to_matrix`].
#[derive(Debug, Clone)]
pub struct XbrlRenderOptions {
    /// Label language for the class columns and column keys.
    pub lang: Lang,
    /// Keep only classifications whose dimension labels contain this text.
    pub label_filter: Option<String>,
    /// Emit rows for abstract (heading) concepts.
    pub show_abstract: bool,
    /// Emit the class hierarchy columns.
    pub show_class: bool,
    /// Maximum class depth; deeper subtrees are cut off entirely.
    pub show_depth: usize,
    /// Emit the concept_id column.
    pub show_concept: bool,
    /// Drop data columns qualified by more than the top-level
    /// consolidated/separate dimension.
    pub ignore_subclass: bool,
}

impl Default for XbrlRenderOptions {
    fn default() -> Self {
        XbrlRenderOptions {
            lang: Lang::Ko,
            label_filter: None,
            show_abstract: false,
            show_class: true,
            show_depth: 10,
            show_concept: true,
            ignore_subclass: true,
        }
    }
}

impl XbrlRenderOptions {
    /// The options the extraction pipeline uses for one statement variant.
    pub fn for_scope(separate: bool, lang: Lang) -> Self {
        XbrlRenderOptions {
            lang,
            label_filter: Some(if separate { "Separate" } else { "Consolidated" }.to_string()),
            ..XbrlRenderOptions::default()
        }
    }
}

impl XbrlTable {
    /// Materializes the table into matrix form.
    ///
    /// Columns are one per distinct (period, labels) classification, newest
    /// first, after instants have been reconciled with interval columns.
    /// Rows are the presentation tree flattened depth-first; a subtree deeper
    /// than `show_depth` is dropped whole. Data columns with no values at
    /// all are pruned.
    pub fn to_matrix(&self, currency: &str, options: &XbrlRenderOptions) -> StatementMatrix {
        let mut cls = self.classifications();
        if let Some(filter) = &options.label_filter {
            cls.retain(|c| c.label_contains(filter));
        }
        merge_period_shapes(&mut cls);

        let mut depth = self
            .roots()
            .iter()
            .map(|root| max_depth(root, options.show_abstract))
            .max()
            .unwrap_or(0);
        depth = depth.min(options.show_depth);

        let title = format!("{} (Unit: {})", self.definition(), currency);

        let mut columns: Vec<Column> = Vec::new();
        if options.show_concept {
            columns.push(Column::Meta(MetaColumn::ConceptId));
        }
        columns.push(Column::Meta(MetaColumn::LabelKo));
        columns.push(Column::Meta(MetaColumn::LabelEn));
        if options.show_class {
            for idx in 0..depth {
                columns.push(Column::Meta(MetaColumn::Class(idx)));
            }
        }

        // Classifications sharing a column key are grouped; at lookup time
        // the last context with a value wins.
        let mut groups: Vec<(ColumnKey, Vec<Classification>)> = Vec::new();
        for c in cls {
            let key = c.column_key(options.lang);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, list)) => list.push(c),
                None => groups.push((key, vec![c])),
            }
        }
        for (key, _) in &groups {
            columns.push(Column::Data(key.clone()));
        }

        let mut matrix = StatementMatrix::new(title, columns);
        for root in self.roots() {
            self.generate_rows(root, &[], depth, &groups, options, &mut matrix);
        }

        matrix.drop_empty_data_columns();
        if options.ignore_subclass {
            matrix.retain_data_columns_where(|key| key.labels.len() == 1);
        }
        matrix
    }

    fn generate_rows(
        &self,
        node: &LabelNode,
        chain: &[String],
        depth: usize,
        groups: &[(ColumnKey, Vec<Classification>)],
        options: &XbrlRenderOptions,
        matrix: &mut StatementMatrix,
    ) {
        let mut chain = chain.to_vec();
        chain.push(node.label(options.lang).to_string());
        if options.show_class && chain.len() > depth {
            return;
        }

        if !node.is_abstract || options.show_abstract {
            let mut row: Vec<Cell> = Vec::with_capacity(matrix.n_columns());
            if options.show_concept {
                row.push(Cell::Text(node.concept_id.clone()));
            }
            row.push(Cell::Text(node.label_ko.clone()));
            row.push(Cell::Text(node.label_en.clone()));
            if options.show_class {
                for idx in 0..depth {
                    row.push(Cell::Text(
                        chain.get(idx).cloned().unwrap_or_default(),
                    ));
                }
            }
            for (_, group) in groups {
                let mut value = Cell::Empty;
                for c in group {
                    let candidate = self.fact_value(&c.context_id, &node.concept_id, &node.label_ko);
                    if !candidate.is_empty() {
                        value = candidate;
                    }
                }
                row.push(value);
            }
            matrix.push_row(row);
        }

        for child in &node.children {
            self.generate_rows(child, &chain, depth, groups, options, matrix);
        }
    }
}

/// Reconciles mixed period shapes within one table: when any interval column
/// exists, instant columns are rewritten as intervals so they line up. The
/// start is taken from the interval sharing the same end date; an instant
/// with no matching interval opens at January 1st of its year.
pub(crate) fn merge_period_shapes(cls: &mut [Classification]) {
    let mut starts: HashMap<NaiveDate, NaiveDate> = HashMap::new();
    for c in cls.iter() {
        if let Period::Interval { start, end } = c.period {
            starts.insert(end, start);
        }
    }
    if starts.is_empty() {
        return;
    }
    for c in cls.iter_mut() {
        if let Period::Instant(end) = c.period {
            let start = starts
                .get(&end)
                .copied()
                .or_else(|| NaiveDate::from_ymd_opt(end.year(), 1, 1))
                .unwrap_or(end);
            c.period = Period::Interval { start, end };
        }
    }
}

/// Maximum depth of a presentation subtree; abstract leaves only count when
/// they will be shown.
fn max_depth(node: &LabelNode, show_abstract: bool) -> usize {
    if node.children.is_empty() && node.is_abstract {
        return if show_abstract { 1 } else { 0 };
    }
    1 + node
        .children
        .iter()
        .map(|child| max_depth(child, show_abstract))
        .max()
        .unwrap_or(0)
}
