//! Extraction of financial statement tables from DART report viewer pages.
//!
//! A filed page renders each statement as a `border="1"` data table preceded
//! by a title tag and a `class="nb"` header table that carries the reporting
//! periods and the "(단위: ...)" scale marker. Discovery walks backwards from
//! each candidate data table through its previous siblings looking for a title
//! matching the statement being searched, then validates the nearest preceding
//! header table. The header rows are expanded into a rowspan/colspan-resolved
//! grid, mapped onto [`Column`]s, and the body rows are parsed into normalized
//! cells.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::matrix::{
    Cell, Column, ColumnKey, Lang, MetaColumn, Period, StatementKind, StatementMatrix,
};
use crate::parsing::dates::extract_dates;
use crate::parsing::numeric::{currency_of, parse_cell, unit_from_marker};

/// Data tables with fewer rows than this are decorative, not statements.
const MIN_ROW_NUMBER: usize = 4;
/// A statement title is short; longer matches are prose mentioning the title.
const MAX_TITLE_LENGTH: usize = 13;

static SEL_DATA_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"table[border="1"]"#).unwrap());
static SEL_HEADER_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table.nb").unwrap());
static SEL_TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static SEL_THEAD_TR: Lazy<Selector> = Lazy::new(|| Selector::parse("thead tr").unwrap());
static SEL_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());
static SEL_TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());

static RE_TITLE_ROW: Lazy<Regex> = Lazy::new(|| loose_any(&["과목", "주석"]));
static RE_SUBJECT: Lazy<Regex> = Lazy::new(|| loose_any(&["과목"]));
static RE_NOTE: Lazy<Regex> = Lazy::new(|| loose_any(&["주석"]));
static RE_THREE_MONTH: Lazy<Regex> = Lazy::new(|| loose_any(&["3개월"]));
static RE_AMOUNT_PASS: Lazy<Regex> = Lazy::new(|| loose_any(&["누적", "금액"]));

/// Compiles words into a whitespace-tolerant alternation, so "과 목" and
/// "과목" match the same pattern.
fn loose_any(words: &[&str]) -> Regex {
    let alternation = words
        .iter()
        .map(|word| {
            word.chars()
                .map(|c| regex::escape(&c.to_string()))
                .collect::<Vec<_>>()
                .join(r"\s*")
        })
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).unwrap()
}

/// Title query for one statement search: every `includes` pattern must match
/// and no `excludes` pattern may match.
struct TitleQuery {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl TitleQuery {
    fn for_kind(kind: StatementKind, separate: bool) -> TitleQuery {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        match kind {
            StatementKind::Bs => includes.push(loose_any(&["재무상태표", "대차대조표"])),
            StatementKind::Is => {
                includes.push(loose_any(&["손익계산서"]));
                // 포괄손익계산서 belongs to the cis search
                excludes.push(loose_any(&["포괄"]));
            }
            StatementKind::Cis => includes.push(loose_any(&["포괄손익계산서"])),
            StatementKind::Cf => includes.push(loose_any(&["현금흐름표"])),
        }
        if separate {
            excludes.push(loose_any(&["연결"]));
        } else {
            includes.push(loose_any(&["연결"]));
        }
        TitleQuery { includes, excludes }
    }

    fn matches(&self, text: &str) -> bool {
        self.includes.iter().all(|re| re.is_match(text))
    }

    fn excluded(&self, text: &str) -> bool {
        self.excludes.iter().any(|re| re.is_match(text))
    }
}

/// Extracts the requested statements from one report viewer page.
///
/// Statements are searched in the order given; a statement whose table cannot
/// be found (or whose header is malformed) maps to `None` rather than failing
/// the whole page.
pub fn extract_statements(
    html: &str,
    kinds: &[StatementKind],
    separate: bool,
    lang: Lang,
) -> HashMap<StatementKind, Option<StatementMatrix>> {
    let document = Html::parse_document(html);
    let tables: Vec<ElementRef> = document.select(&SEL_DATA_TABLE).collect();
    let headers: Vec<ElementRef> = document.select(&SEL_HEADER_TABLE).collect();

    // Document-order positions, for "nearest preceding header" lookups.
    let mut order = HashMap::new();
    for (position, node) in document.root_element().descendants().enumerate() {
        order.insert(node.id(), position);
    }
    let position = |el: &ElementRef| order.get(&el.id()).copied().unwrap_or(usize::MAX);

    let mut rejected_titles: HashSet<usize> = HashSet::new();
    let mut found = HashMap::new();
    for kind in kinds {
        let query = TitleQuery::for_kind(*kind, separate);
        let matrix = seek_table(&tables, &headers, &position, &mut rejected_titles, &query)
            .and_then(|(table, header)| convert_table(*kind, table, header, separate, lang));
        found.insert(*kind, matrix);
    }
    found
}

/// Finds the data table whose preceding title matches `query`, together with
/// its nearest valid `class="nb"` header table.
fn seek_table<'a>(
    tables: &[ElementRef<'a>],
    headers: &[ElementRef<'a>],
    position: &dyn Fn(&ElementRef<'a>) -> usize,
    rejected_titles: &mut HashSet<usize>,
    query: &TitleQuery,
) -> Option<(ElementRef<'a>, ElementRef<'a>)> {
    for table in tables {
        if table.select(&SEL_TR).count() < MIN_ROW_NUMBER {
            continue;
        }
        for node in table.prev_siblings() {
            let Some(sibling) = ElementRef::wrap(node) else {
                continue;
            };
            // Another data table ends this statement's section.
            if tables.iter().any(|t| t.id() == sibling.id()) {
                break;
            }
            let sibling_position = position(&sibling);
            for line in visible_text(sibling).split('\n') {
                let title = strip_whitespace(line);
                if title.is_empty() || !query.matches(&title) {
                    continue;
                }
                if query.excluded(&title) || title.chars().count() > MAX_TITLE_LENGTH {
                    rejected_titles.insert(sibling_position);
                    continue;
                }
                let table_position = position(table);
                let mut candidates: Vec<ElementRef> = headers
                    .iter()
                    .copied()
                    .filter(|h| position(h) < table_position)
                    .collect();
                candidates.sort_by_key(|h| std::cmp::Reverse(position(h)));
                for header in candidates {
                    if rejected_titles.contains(&position(&header)) {
                        continue;
                    }
                    let rows: Vec<ElementRef> = header.select(&SEL_TR).collect();
                    if rows.len() < 2 {
                        continue;
                    }
                    let dated = rows
                        .iter()
                        .filter(|tr| extract_dates(&visible_text(**tr)).is_some())
                        .count();
                    if dated == 0 {
                        continue;
                    }
                    return Some((*table, header));
                }
            }
        }
    }
    None
}

/// Converts a discovered table and its header into a [`StatementMatrix`].
fn convert_table(
    kind: StatementKind,
    table: ElementRef,
    header: ElementRef,
    separate: bool,
    lang: Lang,
) -> Option<StatementMatrix> {
    // Reporting periods and unit scale live in the nb header table.
    let mut date_groups: VecDeque<String> = VecDeque::new();
    for tr in header.select(&SEL_TR) {
        for line in visible_text(tr).split('\n') {
            if let Some(dates) = extract_dates(line) {
                let joined = dates
                    .iter()
                    .map(|d| d.format("%Y%m%d").to_string())
                    .collect::<Vec<_>>()
                    .join("-");
                date_groups.push_back(joined);
            }
        }
    }
    let (unit_text, unit) = unit_from_marker(&visible_text(header)).unwrap_or(("원", 1.0));

    let title = match currency_of(unit_text) {
        Some(currency) => format!("{}(Unit: {})", kind.english_title(), currency),
        None => kind.english_title().to_string(),
    };

    // Column headers come from the data table's own thead; tables without one
    // use their first row as the header.
    let mut header_rows: Vec<ElementRef> = table.select(&SEL_THEAD_TR).collect();
    if header_rows.is_empty() {
        header_rows = table.select(&SEL_TR).take(1).collect();
    }
    let first_row = header_rows.first()?;
    let col_length: usize = first_row
        .select(&SEL_CELL)
        .map(|cell| parse_span(cell, "colspan"))
        .sum();
    if col_length == 0 {
        return None;
    }
    let row_length = header_rows.len().max(2);

    let grid = fill_header_grid(&header_rows, row_length, col_length, &title, &mut date_groups)?;

    // More than one 과목 column means the header structure was misread.
    let subject_count = grid[1]
        .iter()
        .flatten()
        .filter(|text| RE_SUBJECT.is_match(text))
        .count();
    if subject_count > 1 {
        tracing::warn!("Multiple subject columns in header; table rejected");
        return None;
    }

    let assembled = assemble_columns(&grid, row_length, col_length, separate, lang);
    if !assembled.iter().any(|(c, _)| matches!(c, Column::Data(_))) {
        return None;
    }

    let columns: Vec<Column> = assembled.iter().map(|(c, _)| c.clone()).collect();
    let mut matrix = StatementMatrix::new(title, columns);

    let header_ids: Vec<_> = header_rows.iter().map(|tr| tr.id()).collect();
    for tr in table.select(&SEL_TR) {
        if header_ids.contains(&tr.id()) {
            continue;
        }
        let cells: Vec<String> = tr.select(&SEL_TD).map(first_line).collect();
        if cells.is_empty() {
            continue;
        }
        let row = assembled
            .iter()
            .map(|(column, indices)| match column {
                Column::Meta(_) => indices
                    .iter()
                    .filter_map(|&i| cells.get(i))
                    .find(|t| !t.is_empty())
                    .map(|t| Cell::Text(t.clone()))
                    .unwrap_or_else(|| Cell::Text(String::new())),
                Column::Data(_) => indices
                    .iter()
                    .filter_map(|&i| cells.get(i))
                    .map(|raw| parse_cell(raw, unit))
                    .find(|c| !c.is_empty())
                    .unwrap_or(Cell::Empty),
            })
            .collect();
        matrix.push_row(row);
    }

    Some(matrix)
}

/// Expands the header rows into a rowspan/colspan-resolved grid. Returns
/// `None` when the same header text appears twice, which makes the column
/// layout ambiguous.
fn fill_header_grid(
    header_rows: &[ElementRef],
    row_length: usize,
    col_length: usize,
    title: &str,
    date_groups: &mut VecDeque<String>,
) -> Option<Vec<Vec<Option<String>>>> {
    let mut grid: Vec<Vec<Option<String>>> = vec![vec![None; col_length]; row_length];
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, tr) in header_rows.iter().enumerate() {
        for (jdx, cell) in tr.select(&SEL_CELL).enumerate() {
            let mut row_span = parse_span(cell, "rowspan");
            let col_span = parse_span(cell, "colspan");
            let mut text = strip_whitespace(&visible_text(cell));
            if !text.is_empty() && !seen.insert(text.clone()) {
                tracing::warn!("Duplicate header cell '{}'; table rejected", text);
                return None;
            }

            if idx == 0 {
                if jdx == 0 {
                    text = "과목".to_string();
                } else if !RE_TITLE_ROW.is_match(&text) {
                    text = date_groups.pop_front().unwrap_or_else(|| {
                        tracing::warn!("Header date missing for column; using placeholder");
                        "19000101".to_string()
                    });
                }
            }
            let is_title_cell = idx == 0 && RE_TITLE_ROW.is_match(&text);
            if is_title_cell {
                row_span = row_span.max(2);
            }

            let Some(start) = grid[idx].iter().position(|c| c.is_none()) else {
                break;
            };
            for m in 0..row_span {
                let r = idx + m;
                if r >= row_length {
                    break;
                }
                for n in 0..col_span {
                    let c = start + n;
                    if c >= col_length {
                        break;
                    }
                    grid[r][c] = Some(if m == 0 && is_title_cell {
                        title.to_string()
                    } else {
                        text.clone()
                    });
                }
            }
        }
    }
    Some(grid)
}

/// Maps grid columns onto matrix [`Column`]s, deduplicating physical columns
/// that resolve to the same key.
fn assemble_columns(
    grid: &[Vec<Option<String>>],
    row_length: usize,
    col_length: usize,
    separate: bool,
    lang: Lang,
) -> Vec<(Column, Vec<usize>)> {
    let mut assembled: Vec<(Column, Vec<usize>)> = Vec::new();
    let mut push = |assembled: &mut Vec<(Column, Vec<usize>)>, column: Column, jdx: usize| {
        match assembled.iter_mut().find(|(c, _)| *c == column) {
            Some((_, indices)) => indices.push(jdx),
            None => assembled.push((column, vec![jdx])),
        }
    };

    for jdx in 0..col_length {
        let Some(top) = grid[0][jdx].clone() else {
            continue;
        };
        if let Some(second) = grid[1][jdx].as_deref() {
            if RE_SUBJECT.is_match(second) {
                push(&mut assembled, Column::Meta(MetaColumn::LabelKo), jdx);
                continue;
            }
            if RE_NOTE.is_match(second) {
                push(&mut assembled, Column::Meta(MetaColumn::Comment), jdx);
                continue;
            }
        }

        let mut period_text = top;
        let mut labels: Vec<String> = Vec::new();
        for idx in 1..row_length {
            let item = grid[idx][jdx].as_deref();
            if idx == 1 && item.map_or(true, |t| !RE_TITLE_ROW.is_match(t)) {
                labels.push(consolidation_label(lang, separate).to_string());
            }
            let Some(item) = item else {
                continue;
            };
            if item.trim().eq_ignore_ascii_case(period_text.trim()) {
                continue;
            }
            if RE_THREE_MONTH.is_match(item) {
                period_text = quarterly_period(&period_text);
                continue;
            }
            if RE_AMOUNT_PASS.is_match(item) {
                continue;
            }
            labels.push(item.to_string());
        }

        let Some(period) = Period::parse(&period_text) else {
            continue;
        };
        push(
            &mut assembled,
            Column::Data(ColumnKey::new(period, labels)),
            jdx,
        );
    }
    assembled
}

/// Rewrites a cumulative interval into the trailing three-month window that a
/// "3개월" header qualifier denotes.
fn quarterly_period(period_text: &str) -> String {
    match Period::parse(period_text) {
        Some(Period::Interval { end, .. }) => {
            let start = end
                .checked_sub_months(chrono::Months::new(3))
                .and_then(|d| d.with_day(1));
            match start {
                Some(start) => Period::Interval { start, end }.key(),
                None => period_text.to_string(),
            }
        }
        _ => period_text.to_string(),
    }
}

fn consolidation_label(lang: Lang, separate: bool) -> &'static str {
    match (lang, separate) {
        (Lang::Ko, false) => "연결재무제표",
        (Lang::Ko, true) => "별도재무제표",
        (Lang::En, false) => "Consolidated",
        (Lang::En, true) => "Separate",
    }
}

fn parse_span(cell: ElementRef, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(1)
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Collects the visible text of an element. `<br>` becomes a line break, and
/// white-on-white text (a common hiding trick in filed pages) is skipped.
fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() == "br" {
                out.push('\n');
                continue;
            }
            if is_white_text(child_el) {
                continue;
            }
            collect_text(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn is_white_text(el: ElementRef) -> bool {
    el.value().attr("style").is_some_and(|style| {
        let normalized = strip_whitespace(style).to_ascii_lowercase();
        normalized.contains("color:#ffffff") || normalized.contains("color:white")
    })
}

/// Body cell text: everything before the first line break, with whitespace
/// and filler '=' characters removed.
fn first_line(el: ElementRef) -> String {
    let text = visible_text(el);
    let line = text.split('\n').next().unwrap_or("");
    line.chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const BS_PAGE: &str = r#"<html><body>
        <p>연결재무상태표</p>
        <table class="nb">
            <tr><td>제 21 기 2018년 12월 31일 현재</td></tr>
            <tr><td>제 20 기 2017년 12월 31일 현재</td></tr>
            <tr><td>(단위: 천원)</td></tr>
        </table>
        <table border="1">
            <thead>
                <tr><th>과 목</th><th>제 21 기</th><th>제 20 기</th></tr>
            </thead>
            <tbody>
                <tr><td>자산총계</td><td>1,000</td><td>(900)</td></tr>
                <tr><td>부채총계</td><td>600</td><td>500</td></tr>
                <tr><td>자본총계</td><td>400</td><td>400</td></tr>
                <tr><td>주당순이익</td><td>-</td><td></td></tr>
            </tbody>
        </table>
    </body></html>"#;

    #[test]
    fn consolidated_balance_sheet_is_extracted() {
        let found = extract_statements(BS_PAGE, &[StatementKind::Bs], false, Lang::Ko);
        let matrix = found[&StatementKind::Bs].as_ref().unwrap();

        assert_eq!(matrix.title(), "Statement of financial position(Unit: KRW)");
        assert_eq!(matrix.columns()[0], Column::Meta(MetaColumn::LabelKo));
        let keys = matrix.data_keys();
        assert_eq!(
            keys[0],
            ColumnKey::new(
                Period::Instant(date(2018, 12, 31)),
                vec!["연결재무제표".to_string()]
            )
        );
        assert_eq!(
            keys[1],
            ColumnKey::new(
                Period::Instant(date(2017, 12, 31)),
                vec!["연결재무제표".to_string()]
            )
        );

        assert_eq!(matrix.n_rows(), 4);
        assert_eq!(matrix.meta_text(0, MetaColumn::LabelKo), "자산총계");
        // Values scaled by the (단위: 천원) marker
        assert_eq!(matrix.cell(0, 1), &Cell::Number(1_000_000.0));
        assert_eq!(matrix.cell(0, 2), &Cell::Number(-900_000.0));
        // "-" and blank cells stay the no-data sentinel
        assert_eq!(matrix.cell(3, 1), &Cell::Empty);
        assert_eq!(matrix.cell(3, 2), &Cell::Empty);
    }

    #[test]
    fn separate_search_skips_consolidated_title() {
        let found = extract_statements(BS_PAGE, &[StatementKind::Bs], true, Lang::Ko);
        assert!(found[&StatementKind::Bs].is_none());
    }

    #[test]
    fn income_statement_with_interval_header() {
        let page = r#"<html><body>
            <p>연결손익계산서</p>
            <table class="nb">
                <tr><td>제 21 (당) 기 2018년 01월 01일부터 12월 31일 까지</td></tr>
                <tr><td>(단위: 원)</td></tr>
            </table>
            <table border="1">
                <tr><th>과목</th><th>제 21 기</th></tr>
                <tr><td>수익</td><td>5,000</td></tr>
                <tr><td>영업이익</td><td>1,500</td></tr>
                <tr><td>당기순이익</td><td>1,200</td></tr>
            </table>
        </body></html>"#;
        let found = extract_statements(page, &[StatementKind::Is], false, Lang::Ko);
        let matrix = found[&StatementKind::Is].as_ref().unwrap();

        // No thead: the first row serves as the header and is not a data row
        assert_eq!(matrix.n_rows(), 3);
        assert_eq!(
            matrix.data_keys()[0].period,
            Period::Interval {
                start: date(2018, 1, 1),
                end: date(2018, 12, 31),
            }
        );
        assert_eq!(matrix.cell(0, 1), &Cell::Number(5000.0));
    }

    #[test]
    fn consolidated_income_statement_excludes_comprehensive() {
        let page = r#"<html><body>
            <p>연결포괄손익계산서</p>
            <table class="nb">
                <tr><td>제 21 기 2018년 01월 01일부터 12월 31일 까지</td></tr>
                <tr><td>(단위: 원)</td></tr>
            </table>
            <table border="1">
                <tr><th>과목</th><th>제 21 기</th></tr>
                <tr><td>당기순이익</td><td>100</td></tr>
                <tr><td>기타포괄손익</td><td>10</td></tr>
                <tr><td>총포괄손익</td><td>110</td></tr>
            </table>
        </body></html>"#;
        let found = extract_statements(
            page,
            &[StatementKind::Is, StatementKind::Cis],
            false,
            Lang::Ko,
        );
        // The 손익계산서 query must not claim the 포괄손익계산서 table
        assert!(found[&StatementKind::Is].is_none());
        assert!(found[&StatementKind::Cis].is_some());
    }

    #[test]
    fn duplicate_header_cells_reject_the_table() {
        let page = r#"<html><body>
            <p>연결재무상태표</p>
            <table class="nb">
                <tr><td>제 21 기 2018년 12월 31일 현재</td></tr>
                <tr><td>(단위: 원)</td></tr>
            </table>
            <table border="1">
                <thead>
                    <tr><th>과목</th><th>제 21 기</th><th>제 21 기</th></tr>
                </thead>
                <tbody>
                    <tr><td>자산총계</td><td>100</td><td>100</td></tr>
                    <tr><td>부채총계</td><td>60</td><td>60</td></tr>
                    <tr><td>자본총계</td><td>40</td><td>40</td></tr>
                </tbody>
            </table>
        </body></html>"#;
        let found = extract_statements(page, &[StatementKind::Bs], false, Lang::Ko);
        assert!(found[&StatementKind::Bs].is_none());
    }

    #[test]
    fn quarterly_qualifier_rewrites_the_window() {
        // end − 3 months, snapped to the first of the month
        assert_eq!(quarterly_period("20180101-20180630"), "20180301-20180630");
        assert_eq!(quarterly_period("20181231"), "20181231");
    }

    #[test]
    fn white_text_is_invisible() {
        let html = Html::parse_fragment(
            r#"<td>1,000<span style="color: #FFFFFF">숨김</span></td>"#,
        );
        let root = html.root_element();
        assert_eq!(first_line(root), "1,000");
    }
}
