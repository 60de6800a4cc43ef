use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::matrix::{Cell, Lang, Period, StatementKind};
use crate::parsing::numeric::{currency_of, unit_from_marker};

static RE_ROLE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]").unwrap());
static RE_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").unwrap());
// Company-extension concepts ("entity00126380_...") are matched
// case-insensitively; standard taxonomy ids are matched exactly.
static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^entity\d+_").unwrap());

/// A reporting context's period, with dates exactly as filed. XBRL instants
/// and duration ends name the midnight after the period, so one day is
/// subtracted when contexts are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPeriod {
    Instant(NaiveDate),
    Duration { start: NaiveDate, end: NaiveDate },
}

/// One dimension qualifying a context: the axis qname plus the member's
/// labels in both languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub axis: String,
    pub label_ko: String,
    pub label_en: String,
}

/// A reported value for one concept within a context.
#[derive(Debug, Clone, PartialEq)]
pub struct XbrlFact {
    pub concept_id: String,
    pub value: String,
    pub decimals: Option<f64>,
}

/// A reporting context together with the facts reported against it.
#[derive(Debug, Clone, PartialEq)]
pub struct XbrlContext {
    pub id: String,
    pub period: ContextPeriod,
    pub dimensions: Vec<Dimension>,
    pub facts: Vec<XbrlFact>,
}

/// One node of a role's presentation tree. Children are kept in presentation
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelNode {
    pub concept_id: String,
    pub label_ko: String,
    pub label_en: String,
    pub is_abstract: bool,
    pub children: Vec<LabelNode>,
}

impl LabelNode {
    pub fn label(&self, lang: Lang) -> &str {
        match lang {
            Lang::Ko => &self.label_ko,
            Lang::En => &self.label_en,
        }
    }
}

/// A context classified for presentation: the filed period shifted back one
/// day, with dimension labels bracket-stripped and ordered by axis qname
/// descending so equal contexts classify identically.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub context_id: String,
    pub period: Period,
    pub labels: Vec<Dimension>,
}

impl Classification {
    /// The matrix column key this classification maps to.
    pub fn column_key(&self, lang: Lang) -> crate::matrix::ColumnKey {
        let labels = self
            .labels
            .iter()
            .map(|d| match lang {
                Lang::Ko => d.label_ko.clone(),
                Lang::En => d.label_en.clone(),
            })
            .collect();
        crate::matrix::ColumnKey::new(self.period, labels)
    }

    /// True when any dimension label (either language) contains `query`,
    /// case-insensitively.
    pub fn label_contains(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.labels.iter().any(|d| {
            d.label_ko.to_lowercase().contains(&query)
                || d.label_en.to_lowercase().contains(&query)
        })
    }
}

/// One role table of a filing: its contexts, facts, and presentation tree.
#[derive(Debug, Clone, PartialEq)]
pub struct XbrlTable {
    code: Option<String>,
    definition: String,
    uri: String,
    contexts: Vec<XbrlContext>,
    roots: Vec<LabelNode>,
}

impl XbrlTable {
    /// Builds a table, deriving the role code from the bracketed prefix of
    /// the definition ("[D210000] 재무상태표, ...").
    pub fn new(
        definition: impl Into<String>,
        uri: impl Into<String>,
        contexts: Vec<XbrlContext>,
        roots: Vec<LabelNode>,
    ) -> Self {
        let definition = definition.into();
        let code = RE_ROLE_CODE
            .captures(&definition)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        XbrlTable {
            code,
            definition,
            uri: uri.into(),
            contexts,
            roots,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn contexts(&self) -> &[XbrlContext] {
        &self.contexts
    }

    pub fn roots(&self) -> &[LabelNode] {
        &self.roots
    }

    /// Classifies every context that carries at least one fact, newest first.
    pub fn classifications(&self) -> Vec<Classification> {
        let mut cls: Vec<Classification> = self
            .contexts
            .iter()
            .filter(|context| !context.facts.is_empty())
            .map(|context| {
                let period = match context.period {
                    ContextPeriod::Instant(date) => {
                        Period::Instant(date.pred_opt().unwrap_or(date))
                    }
                    ContextPeriod::Duration { start, end } => Period::Interval {
                        start,
                        end: end.pred_opt().unwrap_or(end),
                    },
                };
                let mut labels = context.dimensions.clone();
                labels.sort_by(|a, b| b.axis.cmp(&a.axis));
                for dim in &mut labels {
                    dim.label_ko = RE_BRACKET.replace_all(&dim.label_ko, "").trim().to_string();
                    dim.label_en = RE_BRACKET.replace_all(&dim.label_en, "").trim().to_string();
                }
                Classification {
                    context_id: context.id.clone(),
                    period,
                    labels,
                }
            })
            .collect();
        cls.sort_by(|a, b| b.period.sort_date().cmp(&a.period.sort_date()));
        cls
    }

    /// Looks up the value a context reports for `concept_id`.
    ///
    /// Numeric values come back as numbers, everything else as text. When the
    /// concept's Korean label carries a "(단위: ...)" marker the fact is a
    /// per-share figure whose filed value must be rescaled by its `decimals`
    /// attribute and the marked unit.
    pub(crate) fn fact_value(&self, context_id: &str, concept_id: &str, label_ko: &str) -> Cell {
        let Some(context) = self.contexts.iter().find(|c| c.id == context_id) else {
            return Cell::Empty;
        };
        let per_share_unit = unit_from_marker(label_ko)
            .filter(|(name, _)| currency_of(name).is_some())
            .map(|(_, mult)| mult);

        for fact in &context.facts {
            if !concept_eq(&fact.concept_id, concept_id) {
                continue;
            }
            return match fact.value.parse::<f64>() {
                Ok(mut value) => {
                    if let Some(unit) = per_share_unit {
                        let decimals = fact.decimals.filter(|d| d.is_finite()).unwrap_or(0.0);
                        value = value * 10f64.powf(decimals) * unit;
                    }
                    Cell::Number(value)
                }
                Err(_) if fact.value.is_empty() => Cell::Empty,
                Err(_) => Cell::Text(fact.value.clone()),
            };
        }
        Cell::Empty
    }
}

/// A loaded XBRL filing: the full set of role tables.
#[derive(Debug, Clone, PartialEq)]
pub struct XbrlDocument {
    filename: String,
    tables: Vec<XbrlTable>,
}

impl XbrlDocument {
    pub fn new(filename: impl Into<String>, tables: Vec<XbrlTable>) -> Self {
        XbrlDocument {
            filename: filename.into(),
            tables,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn tables(&self) -> &[XbrlTable] {
        &self.tables
    }

    pub fn table_by_code(&self, code: &str) -> Option<&XbrlTable> {
        self.tables
            .iter()
            .find(|t| t.code().is_some_and(|c| c.eq_ignore_ascii_case(code)))
    }

    /// The entity's reporting currency (ISO code) from the entity
    /// information role, used in materialized table titles.
    pub fn reporting_currency(&self) -> Option<String> {
        let table = self.table_by_code("d999004")?;
        for context in table.contexts() {
            for fact in &context.facts {
                if concept_eq(&fact.concept_id, "dart-gcd_EntityReportingCurrencyISOCode")
                    && !fact.value.is_empty()
                {
                    return Some(fact.value.clone());
                }
            }
        }
        None
    }

    /// True when the filing carries consolidated statements.
    pub fn exist_consolidated(&self) -> bool {
        self.table_by_code("d999007").is_some_and(|table| {
            table.classifications().iter().any(|cls| {
                cls.labels
                    .iter()
                    .any(|d| d.label_en.to_lowercase().contains("consolidated"))
            })
        })
    }

    /// Resolves the filed statement code ("D1001", ...) for a statement
    /// concept from the financial statement information role.
    fn statement_code(&self, concept_id: &str, separate: bool) -> Option<String> {
        let info = self.table_by_code("d999007")?;
        let target = if separate { "separate" } else { "consolidated" };
        for cls in info.classifications() {
            if !cls
                .labels
                .iter()
                .any(|d| d.label_en.to_lowercase().contains(target))
            {
                continue;
            }
            if let Cell::Text(code) = info.fact_value(&cls.context_id, concept_id, "") {
                return Some(code);
            }
        }
        None
    }

    /// The role tables carrying a statement, in role-number order. A code can
    /// map to two roles (an income statement split from its comprehensive
    /// part).
    pub fn statement_tables(
        &self,
        kind: StatementKind,
        separate: bool,
    ) -> Option<Vec<&XbrlTable>> {
        let concept = match kind {
            StatementKind::Bs => "dart-gcd_StatementOfFinancialPosition",
            StatementKind::Is | StatementKind::Cis => "dart-gcd_StatementOfComprehensiveIncome",
            StatementKind::Cf => "dart-gcd_StatementOfCashFlows",
        };
        let code = self.statement_code(concept, separate)?;
        let roles = role_numbers(&code, separate)?;
        Some(
            roles
                .iter()
                .filter_map(|role| self.table_by_code(role))
                .collect(),
        )
    }

    /// The single role table to materialize for a statement kind.
    ///
    /// When the income statement was filed as one combined comprehensive
    /// statement, `is` resolves to nothing and `cis` takes the combined
    /// table; when filed split, `is` takes the first role and `cis` the
    /// second.
    pub fn statement_table(&self, kind: StatementKind, separate: bool) -> Option<&XbrlTable> {
        let tables = self.statement_tables(kind, separate)?;
        match kind {
            StatementKind::Bs | StatementKind::Cf => tables.first().copied(),
            StatementKind::Is => {
                if tables.len() > 1 {
                    tables.first().copied()
                } else {
                    None
                }
            }
            StatementKind::Cis => {
                if tables.len() > 1 {
                    tables.get(1).copied()
                } else {
                    tables.first().copied()
                }
            }
        }
    }
}

/// Maps a filed statement code to its role numbers. Separate-statement roles
/// are the consolidated role number with the trailing digit set to 5.
fn role_numbers(code: &str, separate: bool) -> Option<Vec<String>> {
    let consolidated: &[&str] = match code {
        "D1001" => &["D210000"],
        "D1002" => &["D220000"],
        "D2001" => &["D431410"],
        "D2002" => &["D431420"],
        "D2003" => &["D432410"],
        "D2004" => &["D432420"],
        "D2005" => &["D310000", "D410000"],
        "D2006" => &["D310000", "D420000"],
        "D2007" => &["D320000", "D410000"],
        "D2008" => &["D320000", "D420000"],
        "D2009" => &["D310000"],
        "D2010" => &["D320000"],
        "D3001" => &["D610000"],
        "D4001" => &["D510000"],
        "D4002" => &["D520000"],
        _ => return None,
    };
    Some(
        consolidated
            .iter()
            .map(|role| {
                if separate {
                    format!("{}5", &role[..role.len() - 1])
                } else {
                    role.to_string()
                }
            })
            .collect(),
    )
}

pub(crate) fn concept_eq(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    (RE_EXTENSION.is_match(a) || RE_EXTENSION.is_match(b)) && a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn consolidated_dim() -> Dimension {
        Dimension {
            axis: "dart:ConsolidatedAndSeparateFinancialStatementsAxis".to_string(),
            label_ko: "연결 [Member]".to_string(),
            label_en: "Consolidated [Member]".to_string(),
        }
    }

    #[test]
    fn role_code_is_derived_from_definition() {
        let table = XbrlTable::new(
            "[D210000] Statement of financial position, current/non-current - Consolidated",
            "http://example.com/role/D210000",
            vec![],
            vec![],
        );
        assert_eq!(table.code(), Some("D210000"));
    }

    #[test]
    fn classification_shifts_instants_back_one_day() {
        let table = XbrlTable::new(
            "[D210000] test",
            "uri",
            vec![XbrlContext {
                id: "c1".to_string(),
                period: ContextPeriod::Instant(date(2019, 1, 1)),
                dimensions: vec![consolidated_dim()],
                facts: vec![XbrlFact {
                    concept_id: "ifrs-full_Equity".to_string(),
                    value: "100".to_string(),
                    decimals: None,
                }],
            }],
            vec![],
        );
        let cls = table.classifications();
        assert_eq!(cls.len(), 1);
        assert_eq!(cls[0].period, Period::Instant(date(2018, 12, 31)));
        // Bracketed member qualifiers are stripped from the labels
        assert_eq!(cls[0].labels[0].label_en, "Consolidated");
    }

    #[test]
    fn contexts_without_facts_are_not_classified() {
        let table = XbrlTable::new(
            "[D210000] test",
            "uri",
            vec![XbrlContext {
                id: "c1".to_string(),
                period: ContextPeriod::Instant(date(2019, 1, 1)),
                dimensions: vec![],
                facts: vec![],
            }],
            vec![],
        );
        assert!(table.classifications().is_empty());
    }

    #[test]
    fn dimensions_sort_by_axis_descending() {
        let table = XbrlTable::new(
            "[D210000] test",
            "uri",
            vec![XbrlContext {
                id: "c1".to_string(),
                period: ContextPeriod::Instant(date(2019, 1, 1)),
                dimensions: vec![
                    Dimension {
                        axis: "a:First".to_string(),
                        label_ko: "가".to_string(),
                        label_en: "A".to_string(),
                    },
                    Dimension {
                        axis: "z:Last".to_string(),
                        label_ko: "나".to_string(),
                        label_en: "Z".to_string(),
                    },
                ],
                facts: vec![XbrlFact {
                    concept_id: "x".to_string(),
                    value: "1".to_string(),
                    decimals: None,
                }],
            }],
            vec![],
        );
        let cls = table.classifications();
        assert_eq!(cls[0].labels[0].label_en, "Z");
        assert_eq!(cls[0].labels[1].label_en, "A");
    }

    #[test]
    fn concept_matching_is_exact_except_extensions() {
        assert!(concept_eq("ifrs-full_Equity", "ifrs-full_Equity"));
        assert!(!concept_eq("ifrs-full_Equity", "ifrs-full_equity"));
        assert!(concept_eq(
            "entity00126380_udf_BS_201812",
            "Entity00126380_udf_bs_201812"
        ));
    }

    #[test]
    fn separate_roles_end_in_five() {
        assert_eq!(role_numbers("D1001", false), Some(vec!["D210000".to_string()]));
        assert_eq!(role_numbers("D1001", true), Some(vec!["D210005".to_string()]));
        assert_eq!(
            role_numbers("D2005", false),
            Some(vec!["D310000".to_string(), "D410000".to_string()])
        );
        assert_eq!(role_numbers("D9999", false), None);
    }

    #[test]
    fn per_share_values_are_rescaled() {
        let table = XbrlTable::new(
            "[D310000] test",
            "uri",
            vec![XbrlContext {
                id: "c1".to_string(),
                period: ContextPeriod::Duration {
                    start: date(2018, 1, 1),
                    end: date(2019, 1, 1),
                },
                dimensions: vec![],
                facts: vec![XbrlFact {
                    concept_id: "ifrs-full_BasicEarningsLossPerShare".to_string(),
                    value: "2.5".to_string(),
                    decimals: Some(2.0),
                }],
            }],
            vec![],
        );
        // Label carries a unit marker: value × 10^decimals × unit
        let value = table.fact_value(
            "c1",
            "ifrs-full_BasicEarningsLossPerShare",
            "기본주당이익 (단위: 원)",
        );
        assert_eq!(value, Cell::Number(250.0));

        // Without the marker the filed value is taken as-is
        let value = table.fact_value("c1", "ifrs-full_BasicEarningsLossPerShare", "기본주당이익");
        assert_eq!(value, Cell::Number(2.5));
    }
}
