use serde::{Deserialize, Serialize};

use super::labels::BaseCounter;
use crate::models::{CellValue, Row};

pub const DERIVED_METRIC_COLUMNS: [&str; 5] = ["ctr", "cpc", "cvr", "cpa", "roas"];

const RATIO_TOKENS: &[&str] = &["ctr", "cpc", "cvr", "cpa", "roas", "rate"];

/// Ratio metrics computed from base counters. A field is `None` whenever an
/// operand is missing or its denominator is not strictly positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetricSet {
    pub ctr: Option<f64>,
    pub cpc: Option<f64>,
    pub cvr: Option<f64>,
    pub cpa: Option<f64>,
    pub roas: Option<f64>,
}

impl DerivedMetricSet {
    #[must_use]
    pub fn compute(row: &Row) -> Self {
        let impressions = base_value(row, BaseCounter::Impressions);
        let clicks = base_value(row, BaseCounter::Clicks);
        let cost = base_value(row, BaseCounter::Cost);
        let conversions = base_value(row, BaseCounter::Conversions);
        let conversion_value = base_value(row, BaseCounter::ConversionValue);

        Self {
            ctr: ratio(clicks, impressions),
            cpc: ratio(cost, clicks),
            cvr: ratio(conversions, clicks),
            cpa: ratio(cost, conversions),
            roas: ratio(conversion_value, cost),
        }
    }

    #[must_use]
    pub fn entries(&self) -> [(&'static str, Option<f64>); 5] {
        [
            ("ctr", self.ctr),
            ("cpc", self.cpc),
            ("cvr", self.cvr),
            ("cpa", self.cpa),
            ("roas", self.roas),
        ]
    }
}

fn base_value(row: &Row, counter: BaseCounter) -> Option<f64> {
    row.columns()
        .find(|(name, _)| BaseCounter::from_column(name) == Some(counter))
        .and_then(|(_, value)| value.as_number())
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(numerator), Some(denominator)) if denominator > 0.0 => {
            Some(numerator / denominator)
        }
        _ => None,
    }
}

/// Returns a new row with every computable derived metric appended. Columns
/// the query already produced under a derived name are left untouched.
#[must_use]
pub fn with_derived_metrics(row: &Row) -> Row {
    let derived = DerivedMetricSet::compute(row);
    derived
        .entries()
        .into_iter()
        .filter(|(name, _)| !has_column_ignore_case(row, name))
        .fold(row.clone(), |acc, (name, value)| match value {
            Some(value) => acc.with_column(name, CellValue::Number(value)),
            None => acc,
        })
}

#[must_use]
pub fn derive_rows(rows: &[Row]) -> Vec<Row> {
    rows.iter().map(with_derived_metrics).collect()
}

/// Rates, ratios and averages must never be summed.
#[must_use]
pub fn is_ratio_metric(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower.starts_with("avg_")
        || lower.starts_with("average_")
        || RATIO_TOKENS.iter().any(|token| lower.contains(token))
}

fn has_column_ignore_case(row: &Row, name: &str) -> bool {
    row.column_names()
        .any(|column| column.eq_ignore_ascii_case(name))
}
