use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::Date;

use super::derived::is_ratio_metric;
use super::labels::{BaseCounter, metric_label};
use crate::models::Row;
use crate::report::format::format_signed;
use crate::utils::time::{format_calendar_date, parse_leading_date};

pub const MIN_DATED_ROWS: usize = 4;
pub const MIN_UNIQUE_DATES: usize = 3;
pub const COMPARED_METRICS: usize = 5;

const HEADLINE_ORDER: [BaseCounter; 5] = [
    BaseCounter::Cost,
    BaseCounter::Conversions,
    BaseCounter::Clicks,
    BaseCounter::Impressions,
    BaseCounter::ConversionValue,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodRange {
    pub start: String,
    pub end: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodMetricChange {
    pub metric: String,
    pub label: String,
    pub previous_sum: f64,
    pub current_sum: f64,
    pub change: f64,
    /// Omitted when the previous half sums to zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
}

impl PeriodMetricChange {
    /// `Cost +12.5%`, or `Cost +1.20K` when no percentage exists.
    #[must_use]
    pub fn headline(&self) -> String {
        match self.change_pct {
            Some(pct) => format!("{} {pct:+.1}%", self.label),
            None => format!("{} {}", self.label, format_signed(self.change)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodComparison {
    pub date_column: String,
    pub previous: PeriodRange,
    pub current: PeriodRange,
    pub metrics: Vec<PeriodMetricChange>,
    pub summary: String,
}

fn is_date_name(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower == "date" || lower == "day" || lower.ends_with("_date")
}

fn cell_date(row: &Row, column: &str) -> Option<Date> {
    row.get(column)
        .and_then(|cell| cell.as_text())
        .and_then(parse_leading_date)
}

/// The dimension when it holds dates, otherwise the first column that is
/// named like a date or whose sample value is one.
#[must_use]
pub fn find_date_column(sample: &Row, dimension: Option<&str>) -> Option<String> {
    if let Some(dimension) = dimension.filter(|column| cell_date(sample, column).is_some()) {
        return Some(dimension.to_string());
    }

    sample
        .column_names()
        .find(|column| is_date_name(column) || cell_date(sample, column).is_some())
        .map(ToString::to_string)
}

/// Splits date-grouped rows into an earlier and a later half and compares the
/// additive metrics. Returns `None` unless the rows are dense enough in dates
/// for the date to be the grouping axis.
#[must_use]
pub fn compare_periods(
    rows: &[Row],
    dimension: Option<&str>,
    metrics: &[String],
) -> Option<PeriodComparison> {
    let date_column = find_date_column(rows.first()?, dimension)?;

    let mut dated = rows
        .iter()
        .filter_map(|row| cell_date(row, &date_column).map(|date| (date, row)))
        .collect::<Vec<_>>();
    if dated.len() < MIN_DATED_ROWS {
        return None;
    }

    let mut unique_dates = dated.iter().map(|(date, _)| *date).collect::<Vec<_>>();
    unique_dates.sort_unstable();
    unique_dates.dedup();
    // Unique dates must reach max(3, rows / 3) without rounding the third down.
    if unique_dates.len() < MIN_UNIQUE_DATES || unique_dates.len() * 3 < rows.len() {
        return None;
    }

    dated.sort_by_key(|(date, _)| *date);
    let (previous, current) = dated.split_at(dated.len() / 2);

    let metrics = metrics
        .iter()
        .filter(|metric| !is_ratio_metric(metric) && **metric != date_column)
        .take(COMPARED_METRICS)
        .map(|metric| metric_change(metric, previous, current))
        .collect::<Vec<_>>();
    if metrics.is_empty() {
        return None;
    }

    Some(PeriodComparison {
        date_column,
        previous: period_range(previous)?,
        current: period_range(current)?,
        summary: summarize(&metrics),
        metrics,
    })
}

fn period_range(half: &[(Date, &Row)]) -> Option<PeriodRange> {
    let (start, _) = half.first()?;
    let (end, _) = half.last()?;
    Some(PeriodRange {
        start: format_calendar_date(*start)?,
        end: format_calendar_date(*end)?,
        rows: half.len(),
    })
}

fn half_sum(half: &[(Date, &Row)], metric: &str) -> f64 {
    half.iter().filter_map(|(_, row)| row.number(metric)).sum()
}

fn metric_change(
    metric: &str,
    previous: &[(Date, &Row)],
    current: &[(Date, &Row)],
) -> PeriodMetricChange {
    let previous_sum = half_sum(previous, metric);
    let current_sum = half_sum(current, metric);
    let change = current_sum - previous_sum;
    PeriodMetricChange {
        metric: metric.to_string(),
        label: metric_label(metric),
        previous_sum,
        current_sum,
        change,
        change_pct: (previous_sum != 0.0).then(|| change / previous_sum.abs() * 100.0),
    }
}

fn summarize(changes: &[PeriodMetricChange]) -> String {
    HEADLINE_ORDER
        .iter()
        .filter_map(|counter| {
            changes
                .iter()
                .find(|change| BaseCounter::from_column(&change.metric) == Some(*counter))
        })
        .map(PeriodMetricChange::headline)
        .collect::<Vec<_>>()
        .join(", ")
}
