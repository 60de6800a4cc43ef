mod common;

use chrono::NaiveDate;
use common::read_fixture;
use dartkit::{
    extract_statements, Cell, Column, ColumnKey, Lang, MetaColumn, Period, StatementKind,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn consolidated_balance_sheet_page() {
    let page = read_fixture("html/bs_2018.html");
    let found = extract_statements(&page, &[StatementKind::Bs], false, Lang::Ko);
    let matrix = found[&StatementKind::Bs].as_ref().unwrap();

    assert_eq!(matrix.title(), "Statement of financial position(Unit: KRW)");
    assert_eq!(matrix.columns()[0], Column::Meta(MetaColumn::LabelKo));
    assert_eq!(matrix.columns()[1], Column::Meta(MetaColumn::Comment));

    let keys = matrix.data_keys();
    assert_eq!(
        keys[0],
        ColumnKey::new(
            Period::Instant(date(2018, 12, 31)),
            vec!["연결재무제표".to_string()]
        )
    );
    assert_eq!(keys[1].period, Period::Instant(date(2017, 12, 31)));

    assert_eq!(matrix.n_rows(), 6);
    // Abstract heading rows carry no values
    assert_eq!(matrix.meta_text(0, MetaColumn::LabelKo), "자산");
    assert_eq!(matrix.cell_by_key(0, &keys[0]), Some(&Cell::Empty));
    // Values are scaled by the (단위: 백만원) marker
    assert_eq!(matrix.meta_text(1, MetaColumn::LabelKo), "유동자산");
    assert_eq!(matrix.meta_text(1, MetaColumn::Comment), "4");
    assert_eq!(
        matrix.cell_by_key(1, &keys[0]),
        Some(&Cell::Number(80_039_000_000.0))
    );
    assert_eq!(
        matrix.cell_by_key(3, &keys[1]),
        Some(&Cell::Number(201_175_000_000.0))
    );
}

#[test]
fn separate_search_rejects_consolidated_page() {
    let page = read_fixture("html/bs_2018.html");
    let found = extract_statements(&page, &[StatementKind::Bs], true, Lang::Ko);
    assert!(found[&StatementKind::Bs].is_none());
}

#[test]
fn english_scope_label() {
    let page = read_fixture("html/bs_2018.html");
    let found = extract_statements(&page, &[StatementKind::Bs], false, Lang::En);
    let matrix = found[&StatementKind::Bs].as_ref().unwrap();
    assert_eq!(
        matrix.data_keys()[0].labels,
        vec!["Consolidated".to_string()]
    );
}

#[test]
fn semiannual_income_statement_with_quarter_columns() {
    let page = read_fixture("html/is_half_2018.html");
    let found = extract_statements(&page, &[StatementKind::Is], false, Lang::Ko);
    let matrix = found[&StatementKind::Is].as_ref().unwrap();

    let keys = matrix.data_keys();
    assert_eq!(keys.len(), 2);
    // The 3개월 column is rewritten to the trailing quarter window
    assert_eq!(
        keys[0].period,
        Period::Interval {
            start: date(2018, 3, 1),
            end: date(2018, 6, 30),
        }
    );
    // The 누적 column keeps the cumulative window
    assert_eq!(
        keys[1].period,
        Period::Interval {
            start: date(2018, 1, 1),
            end: date(2018, 6, 30),
        }
    );

    assert_eq!(matrix.meta_text(0, MetaColumn::LabelKo), "매출액");
    assert_eq!(
        matrix.cell_by_key(0, &keys[0]),
        Some(&Cell::Number(29_101_000_000.0))
    );
    assert_eq!(
        matrix.cell_by_key(0, &keys[1]),
        Some(&Cell::Number(58_483_000_000.0))
    );
}

#[test]
fn missing_statement_kinds_map_to_none() {
    let page = read_fixture("html/bs_2018.html");
    let found = extract_statements(
        &page,
        &[StatementKind::Bs, StatementKind::Cf],
        false,
        Lang::Ko,
    );
    assert!(found[&StatementKind::Bs].is_some());
    assert!(found[&StatementKind::Cf].is_none());
}
