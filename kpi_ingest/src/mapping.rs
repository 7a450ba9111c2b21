//! Column → KPI mappings and the mapping suggester.
//!
//! A mapping says "values in spreadsheet column X are KPI `code` under
//! dimension `data_type`". The suggester only *proposes* codes from header
//! similarity; it never picks a dimension. Storing the chosen mapping on a
//! connection is what applies it.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    cell::CellValue,
    coerce::parse_numeric_value,
    kpi::{DataType, KpiDefinition},
};

/// One applied column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub column_name: String,
    pub kpi_code: String,
    pub data_type: DataType,
}

impl ColumnMapping {
    pub fn new(column_name: impl Into<String>, kpi_code: impl Into<String>, data_type: DataType) -> Self {
        Self {
            column_name: column_name.into(),
            kpi_code: kpi_code.into(),
            data_type,
        }
    }
}

/// A candidate mapping as edited in the connection wizard, with its on/off toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSelection {
    #[serde(flatten)]
    pub mapping: ColumnMapping,
    pub include: bool,
}

impl MappingSelection {
    pub fn included(mapping: ColumnMapping) -> Self {
        Self { mapping, include: true }
    }

    pub fn excluded(mapping: ColumnMapping) -> Self {
        Self { mapping, include: false }
    }
}

/// Enforce unique `column_name`: the last entry for a column wins, keeping
/// the position where that column first appeared.
pub fn dedupe_mappings<I>(mappings: I) -> Vec<ColumnMapping>
where
    I: IntoIterator<Item = ColumnMapping>,
{
    let mut by_column: IndexMap<String, ColumnMapping> = IndexMap::new();
    for m in mappings {
        by_column.insert(m.column_name.clone(), m);
    }
    by_column.into_values().collect()
}

/// Keep the selections toggled on, then dedupe.
pub fn selected_mappings(selections: &[MappingSelection]) -> Vec<ColumnMapping> {
    dedupe_mappings(
        selections
            .iter()
            .filter(|s| s.include)
            .map(|s| s.mapping.clone()),
    )
}

/// Why a suggestion was (or was not) made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    ExactCode,
    ExactName,
    Synonym,
    Substring,
    TokenOverlap,
    /// The column carries the period (`Date`, `Period`, ...), not a KPI.
    PeriodColumn,
    /// Sample values are mostly non-numeric.
    NonNumericSamples,
    NoMatch,
}

/// Proposed mapping for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedMapping {
    pub column_name: String,
    pub kpi_code: Option<String>,
    pub kpi_name: Option<String>,
    /// 0.0 (no match) ..= 1.0 (exact).
    pub confidence: f64,
    pub reason: MatchReason,
    /// Default toggle for the wizard: on iff a code was suggested.
    pub include: bool,
}

impl SuggestedMapping {
    fn none(column: &str, reason: MatchReason) -> Self {
        Self {
            column_name: column.to_string(),
            kpi_code: None,
            kpi_name: None,
            confidence: 0.0,
            reason,
            include: false,
        }
    }
}

/// Header tokens that carry the dimension rather than the KPI identity.
const DIMENSION_TOKENS: &[&str] = &["actual", "actuals", "forecast", "fcst", "budget", "bud", "plan"];

/// Normalized headers that hold the period.
const PERIOD_HEADERS: &[&str] = &["date", "period", "month", "period date", "period end", "as of"];

/// Normalized header phrase → KPI code.
const SYNONYMS: &[(&str, &str)] = &[
    ("revenue", "total_revenue"),
    ("gross revenue", "total_revenue"),
    ("total income", "total_revenue"),
    ("effective gross income", "total_revenue"),
    ("egi", "total_revenue"),
    ("opex", "operating_expenses"),
    ("expenses", "operating_expenses"),
    ("total expenses", "operating_expenses"),
    ("operating costs", "operating_expenses"),
    ("noi", "net_operating_income"),
    ("net income", "net_operating_income"),
    ("noi margin", "noi_margin"),
    ("noi percent", "noi_margin"),
    ("occupancy", "physical_occupancy"),
    ("occupancy rate", "physical_occupancy"),
    ("occ", "physical_occupancy"),
    ("economic occupancy", "economic_occupancy"),
    ("cap rate", "cap_rate"),
    ("capitalization rate", "cap_rate"),
    ("debt service coverage", "dscr"),
    ("debt service coverage ratio", "dscr"),
    ("dscr", "dscr"),
    ("loan to value", "ltv"),
    ("ltv", "ltv"),
    ("debt service", "debt_service"),
    ("property value", "property_value"),
    ("valuation", "property_value"),
    ("average rent", "avg_rent"),
    ("avg rent", "avg_rent"),
    ("rent per unit", "avg_rent"),
];

const CONF_EXACT: f64 = 1.0;
const CONF_SYNONYM: f64 = 0.9;
const CONF_SUBSTRING: f64 = 0.75;
const MIN_JACCARD: f64 = 0.5;

/// Propose a KPI code for each column, in input order.
///
/// Matching, first hit wins: period header → none; exact code / display name;
/// synonym; substring containment (longest target wins); token overlap
/// (Jaccard ≥ 0.5). Ties go to the definition listed first. When
/// `sample_values` holds values for a column and fewer than half of its
/// non-blank samples are numeric, the suggestion is withdrawn.
pub fn suggest_mappings(
    column_names: &[String],
    kpi_definitions: &[KpiDefinition],
    sample_values: Option<&IndexMap<String, Vec<CellValue>>>,
) -> Vec<SuggestedMapping> {
    let targets: Vec<Target<'_>> = kpi_definitions.iter().map(Target::new).collect();

    column_names
        .iter()
        .map(|col| {
            let norm = normalize_header(col);
            if PERIOD_HEADERS.contains(&norm.as_str()) {
                return SuggestedMapping::none(col, MatchReason::PeriodColumn);
            }
            let Some((def, confidence, reason)) = best_match(&norm, &targets) else {
                return SuggestedMapping::none(col, MatchReason::NoMatch);
            };
            if let Some(samples) = sample_values.and_then(|s| s.get(col)) {
                if mostly_non_numeric(samples) {
                    return SuggestedMapping::none(col, MatchReason::NonNumericSamples);
                }
            }
            SuggestedMapping {
                column_name: col.clone(),
                kpi_code: Some(def.code.clone()),
                kpi_name: Some(def.name.clone()),
                confidence,
                reason,
                include: true,
            }
        })
        .collect()
}

struct Target<'a> {
    def: &'a KpiDefinition,
    code: String,
    name: String,
}

impl<'a> Target<'a> {
    fn new(def: &'a KpiDefinition) -> Self {
        Self {
            def,
            code: normalize_header(&def.code),
            name: normalize_header(&def.name),
        }
    }
}

fn best_match<'a>(norm: &str, targets: &[Target<'a>]) -> Option<(&'a KpiDefinition, f64, MatchReason)> {
    if norm.is_empty() {
        return None;
    }

    if let Some(t) = targets.iter().find(|t| t.code == norm) {
        return Some((t.def, CONF_EXACT, MatchReason::ExactCode));
    }
    if let Some(t) = targets.iter().find(|t| t.name == norm) {
        return Some((t.def, CONF_EXACT, MatchReason::ExactName));
    }

    if let Some((_, code)) = SYNONYMS.iter().find(|(phrase, _)| *phrase == norm) {
        if let Some(t) = targets.iter().find(|t| t.def.code == *code) {
            return Some((t.def, CONF_SYNONYM, MatchReason::Synonym));
        }
    }

    let mut best_sub: Option<(&Target<'a>, usize)> = None;
    for t in targets {
        let hit = [&t.name, &t.code]
            .into_iter()
            .filter(|target| target.len() >= 3 && norm.len() >= 3 && (norm.contains(target.as_str()) || target.contains(norm)))
            .map(|target| target.len().min(norm.len()))
            .max();
        if let Some(len) = hit {
            if best_sub.is_none_or(|(_, best)| len > best) {
                best_sub = Some((t, len));
            }
        }
    }
    if let Some((t, _)) = best_sub {
        return Some((t.def, CONF_SUBSTRING, MatchReason::Substring));
    }

    let col_tokens: HashSet<&str> = norm.split(' ').collect();
    let mut best_overlap: Option<(&Target<'a>, f64)> = None;
    for t in targets {
        let score = jaccard(&col_tokens, &t.name).max(jaccard(&col_tokens, &t.code));
        if score >= MIN_JACCARD && best_overlap.is_none_or(|(_, best)| score > best) {
            best_overlap = Some((t, score));
        }
    }
    best_overlap.map(|(t, score)| (t.def, 0.25 + 0.5 * score, MatchReason::TokenOverlap))
}

fn jaccard(a: &HashSet<&str>, phrase: &str) -> f64 {
    let b: HashSet<&str> = phrase.split(' ').filter(|s| !s.is_empty()).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    inter / union
}

fn mostly_non_numeric(samples: &[CellValue]) -> bool {
    let non_blank: Vec<&CellValue> = samples.iter().filter(|v| !v.is_blank()).collect();
    if non_blank.is_empty() {
        return false;
    }
    let numeric = non_blank
        .iter()
        .filter(|v| parse_numeric_value(v).is_some())
        .count();
    numeric * 2 < non_blank.len()
}

/// Lowercase, punctuation → space, dimension words dropped, single-spaced.
pub fn normalize_header(raw: &str) -> String {
    let lowered: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    lowered
        .split_whitespace()
        .filter(|tok| !DIMENSION_TOKENS.contains(tok))
        .collect::<Vec<_>>()
        .join(" ")
}
