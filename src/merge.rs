//! Reconciliation of statements extracted from successive filings.
//!
//! Older filings re-report prior periods, so each newly extracted matrix
//! mostly overlaps the accumulated one. Merging adds only the genuinely new
//! period columns to the accumulated matrix, row-aligned against the
//! accumulated rows: first by value identity over the overlapping period
//! columns (account rows get renamed between filings, values do not), then by
//! concept id, English label, and finally by the canonical Korean labels
//! recorded in the shadow table. Every match consumes the matched new row so
//! two accumulated rows can never claim the same source.

use std::collections::{HashMap, HashSet};

use crate::matrix::{Cell, ColumnKey, LabelShadowTable, MetaColumn, StatementMatrix};
use crate::parsing::numeric::canonical_title;

/// Builds the label shadow table for a freshly accumulated matrix.
///
/// Returns `None` when the matrix has no Korean label column, which marks a
/// misextracted table that cannot participate in merging.
pub fn init_shadow(matrix: &StatementMatrix) -> Option<LabelShadowTable> {
    matrix.meta_index(MetaColumn::LabelKo)?;

    let default_titles = matrix.meta_index(MetaColumn::ConceptId).map(|_| {
        (0..matrix.n_rows())
            .map(|row| canonical_title(&matrix.meta_text(row, MetaColumn::ConceptId)))
            .collect()
    });
    let mut shadow = LabelShadowTable::new(default_titles);
    for key in matrix.data_keys() {
        let labels = (0..matrix.n_rows())
            .map(|row| canonical_title(&matrix.meta_text(row, MetaColumn::LabelKo)))
            .collect();
        shadow.add_column(key, labels);
    }
    Some(shadow)
}

/// Merges one newly extracted matrix into the accumulated one.
///
/// Only period columns absent from `base` are added, newest first. Columns
/// already present are left untouched; a base row with no counterpart in
/// `new` gets the no-data sentinel and an empty shadow label.
pub fn merge_into(base: &mut StatementMatrix, shadow: &mut LabelShadowTable, new: &StatementMatrix) {
    let base_keys: HashSet<ColumnKey> = base.data_keys().into_iter().collect();
    let new_keys = new.data_keys();

    let overlap: Vec<ColumnKey> = new_keys
        .iter()
        .filter(|k| base_keys.contains(k))
        .cloned()
        .collect();
    let mut diff: Vec<ColumnKey> = new_keys
        .into_iter()
        .filter(|k| !base_keys.contains(k))
        .collect();
    diff.sort_by(|a, b| b.period.key().cmp(&a.period.key()));

    for key in diff {
        let mut ndata = vec![Cell::Empty; base.n_rows()];
        let mut nlabels = vec![String::new(); base.n_rows()];
        if !overlap.is_empty() {
            value_pass(base, new, &key, &overlap, &mut ndata, &mut nlabels);
        }
        label_pass(base, new, shadow, &key, &mut ndata, &mut nlabels);
        base.add_data_column(key.clone(), ndata);
        shadow.add_column(key, nlabels);
    }
}

/// Row alignment by value identity over the overlapping period columns.
///
/// A new row matches a base row when every overlapping column where both
/// carry a number agrees (at least one must), all under the same sign. The
/// sign-flipped comparison is a fallback for filings that change the
/// presentation sign of an account; a flipped match also flips the carried
/// value.
fn value_pass(
    base: &StatementMatrix,
    new: &StatementMatrix,
    key: &ColumnKey,
    overlap: &[ColumnKey],
    ndata: &mut [Cell],
    nlabels: &mut [String],
) {
    let Some(new_col) = new.data_index(key) else {
        return;
    };
    let mut used: HashSet<usize> = HashSet::new();

    for row in 0..base.n_rows() {
        let mut found = None;
        'search: for sign in [1.0, -1.0] {
            for nrow in 0..new.n_rows() {
                if used.contains(&nrow) || !rows_match(base, row, new, nrow, overlap, sign) {
                    continue;
                }
                let value = match new.cell(nrow, new_col) {
                    Cell::Number(v) => Cell::Number(sign * v),
                    Cell::Text(t) => Cell::Text(t.clone()),
                    Cell::Empty => continue,
                };
                used.insert(nrow);
                found = Some((value, canonical_title(&new.meta_text(nrow, MetaColumn::LabelKo))));
                break 'search;
            }
        }
        if let Some((value, label)) = found {
            ndata[row] = value;
            nlabels[row] = label;
        }
    }
}

/// True when the two rows agree on every overlapping column where both carry
/// numbers, under `sign`, and at least one column was actually compared.
fn rows_match(
    base: &StatementMatrix,
    row: usize,
    new: &StatementMatrix,
    nrow: usize,
    overlap: &[ColumnKey],
    sign: f64,
) -> bool {
    let mut compared = false;
    for key in overlap {
        let (Some(bi), Some(ni)) = (base.data_index(key), new.data_index(key)) else {
            continue;
        };
        match (base.cell(row, bi).as_number(), new.cell(nrow, ni).as_number()) {
            (Some(bv), Some(nv)) => {
                if bv != sign * nv {
                    return false;
                }
                compared = true;
            }
            // The base value exists but the new row cannot confirm it.
            (Some(_), None) => return false,
            (None, _) => continue,
        }
    }
    compared
}

/// Fallback row alignment for rows the value pass left unfilled: concept id
/// first, then English label, then the canonical Korean label against every
/// label the shadow table ever recorded for the row.
fn label_pass(
    base: &StatementMatrix,
    new: &StatementMatrix,
    shadow: &LabelShadowTable,
    key: &ColumnKey,
    ndata: &mut [Cell],
    nlabels: &mut [String],
) {
    let Some(new_col) = new.data_index(key) else {
        return;
    };
    if base.meta_index(MetaColumn::LabelKo).is_none()
        || new.meta_index(MetaColumn::LabelKo).is_none()
    {
        return;
    }
    let concept_exists = base.meta_index(MetaColumn::ConceptId).is_some()
        && new.meta_index(MetaColumn::ConceptId).is_some();
    let en_exists = base.meta_index(MetaColumn::LabelEn).is_some()
        && new.meta_index(MetaColumn::LabelEn).is_some();

    let mut pending: Vec<(usize, HashSet<String>)> = Vec::new();
    let mut by_concept: HashMap<String, usize> = HashMap::new();
    let mut by_en: HashMap<String, usize> = HashMap::new();
    for row in 0..base.n_rows() {
        // Rows already carrying a number are settled.
        if matches!(ndata[row], Cell::Number(_)) {
            continue;
        }
        let label = canonical_title(&base.meta_text(row, MetaColumn::LabelKo));
        let mut labels = shadow.row_label_set(row);
        labels.insert(label);
        pending.push((row, labels));
        if concept_exists {
            by_concept.insert(base.meta_text(row, MetaColumn::ConceptId), row);
        }
        if en_exists {
            by_en.insert(base.meta_text(row, MetaColumn::LabelEn), row);
        }
    }

    let mut used: HashSet<usize> = HashSet::new();
    for nrow in 0..new.n_rows() {
        let label = canonical_title(&new.meta_text(nrow, MetaColumn::LabelKo));

        let mut found: Option<usize> = None;
        if concept_exists {
            if let Some(&row) = by_concept.get(&new.meta_text(nrow, MetaColumn::ConceptId)) {
                if used.contains(&row) {
                    continue;
                }
                found = Some(row);
            }
        }
        if found.is_none() && en_exists {
            if let Some(&row) = by_en.get(&new.meta_text(nrow, MetaColumn::LabelEn)) {
                if used.contains(&row) {
                    continue;
                }
                found = Some(row);
            }
        }
        if found.is_none() {
            found = pending
                .iter()
                .find(|(row, labels)| !used.contains(row) && labels.contains(&label))
                .map(|(row, _)| *row);
        }

        if let Some(row) = found {
            used.insert(row);
            ndata[row] = new.cell(nrow, new_col).clone();
            nlabels[row] = label;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Column, Period};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key(y: i32) -> ColumnKey {
        ColumnKey::new(
            Period::Instant(date(y, 12, 31)),
            vec!["연결재무제표".to_string()],
        )
    }

    /// label / 2018 / 2017 rows: the shape an annual-report extraction has.
    fn base_matrix(rows: &[(&str, f64, f64)]) -> StatementMatrix {
        let mut matrix = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(key(2018)),
                Column::Data(key(2017)),
            ],
        );
        for (label, a, b) in rows {
            matrix.push_row(vec![
                Cell::Text(label.to_string()),
                Cell::Number(*a),
                Cell::Number(*b),
            ]);
        }
        matrix
    }

    #[test]
    fn new_period_column_joins_by_value_identity() {
        let mut base = base_matrix(&[
            ("자산총계", 1000.0, 900.0),
            ("부채총계", 600.0, 550.0),
            ("자본총계", 400.0, 350.0),
        ]);
        let mut shadow = init_shadow(&base).unwrap();

        // The older filing re-reports 2017 and adds 2016; its rows are
        // reordered and renamed.
        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(key(2017)),
                Column::Data(key(2016)),
            ],
        );
        new.push_row(vec![
            Cell::Text("자본 총계".to_string()),
            Cell::Number(350.0),
            Cell::Number(300.0),
        ]);
        new.push_row(vec![
            Cell::Text("자산 총계".to_string()),
            Cell::Number(900.0),
            Cell::Number(800.0),
        ]);
        new.push_row(vec![
            Cell::Text("부채 총계".to_string()),
            Cell::Number(550.0),
            Cell::Number(500.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);

        let k2016 = key(2016);
        assert!(base.data_index(&k2016).is_some());
        assert_eq!(base.cell_by_key(0, &k2016), Some(&Cell::Number(800.0)));
        assert_eq!(base.cell_by_key(1, &k2016), Some(&Cell::Number(500.0)));
        assert_eq!(base.cell_by_key(2, &k2016), Some(&Cell::Number(300.0)));
        // The shadow records the canonical label that sourced each row
        let (_, labels) = shadow
            .columns()
            .iter()
            .find(|(k, _)| k == &k2016)
            .unwrap()
            .clone();
        assert_eq!(labels[0], "자산총계");
    }

    #[test]
    fn overlapping_columns_are_not_rewritten() {
        let mut base = base_matrix(&[("자산총계", 1000.0, 900.0)]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![Column::Meta(MetaColumn::LabelKo), Column::Data(key(2017))],
        );
        new.push_row(vec![Cell::Text("자산총계".to_string()), Cell::Number(999.0)]);

        merge_into(&mut base, &mut shadow, &new);

        // 2017 already existed; the conflicting restatement is ignored
        assert_eq!(base.n_columns(), 3);
        assert_eq!(base.cell_by_key(0, &key(2017)), Some(&Cell::Number(900.0)));
    }

    #[test]
    fn sign_flip_matches_and_flips_the_carried_value() {
        let mut base = base_matrix(&[("이익잉여금", -120.0, -100.0)]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(key(2017)),
                Column::Data(key(2016)),
            ],
        );
        new.push_row(vec![
            Cell::Text("결손금".to_string()),
            Cell::Number(100.0),
            Cell::Number(80.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);
        assert_eq!(base.cell_by_key(0, &key(2016)), Some(&Cell::Number(-80.0)));
    }

    #[test]
    fn equal_values_consume_rows_in_order() {
        // Two accumulated rows share the same 2017 value; each must claim a
        // distinct new row.
        let mut base = base_matrix(&[("매출채권", 500.0, 300.0), ("기타채권", 450.0, 300.0)]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(key(2017)),
                Column::Data(key(2016)),
            ],
        );
        new.push_row(vec![
            Cell::Text("매출채권".to_string()),
            Cell::Number(300.0),
            Cell::Number(250.0),
        ]);
        new.push_row(vec![
            Cell::Text("기타채권".to_string()),
            Cell::Number(300.0),
            Cell::Number(200.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);
        assert_eq!(base.cell_by_key(0, &key(2016)), Some(&Cell::Number(250.0)));
        assert_eq!(base.cell_by_key(1, &key(2016)), Some(&Cell::Number(200.0)));
    }

    #[test]
    fn all_overlapping_columns_must_agree() {
        // 2018 matches but 2017 differs: not the same account row.
        let mut base = base_matrix(&[("유동자산", 700.0, 600.0)]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::LabelKo),
                Column::Data(key(2018)),
                Column::Data(key(2017)),
                Column::Data(key(2016)),
            ],
        );
        new.push_row(vec![
            Cell::Text("유동부채".to_string()),
            Cell::Number(700.0),
            Cell::Number(999.0),
            Cell::Number(400.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);
        // Value identity failed on 2017 and the labels differ: unfilled
        assert_eq!(base.cell_by_key(0, &key(2016)), Some(&Cell::Empty));
        let (_, labels) = shadow.columns().last().unwrap().clone();
        assert_eq!(labels[0], "");
    }

    #[test]
    fn label_fallback_uses_canonical_titles_from_the_shadow() {
        // No overlapping period columns at all, so only labels can align rows.
        let mut base = base_matrix(&[("1.유동자산[주석3]", 700.0, 600.0)]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position(Unit: KRW)",
            vec![Column::Meta(MetaColumn::LabelKo), Column::Data(key(2016))],
        );
        new.push_row(vec![
            Cell::Text("유동자산".to_string()),
            Cell::Number(500.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);
        assert_eq!(base.cell_by_key(0, &key(2016)), Some(&Cell::Number(500.0)));
    }

    #[test]
    fn concept_id_outranks_labels() {
        let mut base = StatementMatrix::new(
            "Statement of financial position (Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::ConceptId),
                Column::Meta(MetaColumn::LabelKo),
                Column::Meta(MetaColumn::LabelEn),
                Column::Data(key(2018)),
            ],
        );
        base.push_row(vec![
            Cell::Text("ifrs-full_Equity".to_string()),
            Cell::Text("자본총계".to_string()),
            Cell::Text("Total equity".to_string()),
            Cell::Number(73045202000000.0),
        ]);
        let mut shadow = init_shadow(&base).unwrap();

        let mut new = StatementMatrix::new(
            "Statement of financial position (Unit: KRW)",
            vec![
                Column::Meta(MetaColumn::ConceptId),
                Column::Meta(MetaColumn::LabelKo),
                Column::Meta(MetaColumn::LabelEn),
                Column::Data(key(2016)),
            ],
        );
        // The Korean label changed between filings; the concept id did not.
        new.push_row(vec![
            Cell::Text("ifrs-full_Equity".to_string()),
            Cell::Text("자본 총계 합계".to_string()),
            Cell::Text("Total equity".to_string()),
            Cell::Number(64000000000000.0),
        ]);

        merge_into(&mut base, &mut shadow, &new);
        assert_eq!(
            base.cell_by_key(0, &key(2016)),
            Some(&Cell::Number(64000000000000.0))
        );
    }
}
