use serde::{Deserialize, Serialize};

use crate::models::{CellValue, Row};
use crate::utils::time::parse_calendar_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Dimension,
    Metric,
    Ignored,
}

/// Outcome of the rule table for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnVerdict {
    Ignored,
    /// Known dimension name; lower rank wins.
    NamedDimension(usize),
    /// Categorical value without a known name; used only when no named
    /// dimension exists.
    FallbackDimension,
    Metric,
}

#[derive(Debug, Clone, Copy)]
enum DimensionHint {
    Exact(&'static str),
    Contains(&'static str),
}

impl DimensionHint {
    fn matches(self, lower_name: &str) -> bool {
        match self {
            Self::Exact(name) => lower_name == name,
            Self::Contains(fragment) => lower_name.contains(fragment),
        }
    }
}

// Dates rank last so a per-day breakdown does not crowd out a named entity.
const DIMENSION_PRIORITY: &[DimensionHint] = &[
    DimensionHint::Exact("campaign_name"),
    DimensionHint::Exact("ad_group_name"),
    DimensionHint::Exact("service_name"),
    DimensionHint::Exact("account_name"),
    DimensionHint::Exact("keyword_text"),
    DimensionHint::Exact("query_text"),
    DimensionHint::Contains("name"),
    DimensionHint::Exact("campaign_type"),
    DimensionHint::Exact("ad_type"),
    DimensionHint::Exact("match_type"),
    DimensionHint::Exact("status"),
    DimensionHint::Exact("date"),
];

const METRIC_IMPORTANCE: &[&str] = &[
    "cpa",
    "roas",
    "cpc",
    "cvr",
    "ctr",
    "cost",
    "conversions",
    "clicks",
    "impressions",
    "conversion_value",
];

struct ColumnRule {
    check: fn(&str, &CellValue) -> Option<ColumnVerdict>,
}

fn column_rule_table() -> &'static [ColumnRule] {
    &[
        ColumnRule {
            check: identifier_rule,
        },
        ColumnRule {
            check: named_dimension_rule,
        },
        ColumnRule {
            check: calendar_date_rule,
        },
        ColumnRule {
            check: numeric_rule,
        },
        ColumnRule { check: null_rule },
        ColumnRule {
            check: |_, _| Some(ColumnVerdict::FallbackDimension),
        },
    ]
}

fn identifier_rule(lower_name: &str, _value: &CellValue) -> Option<ColumnVerdict> {
    (lower_name == "id" || lower_name.ends_with("_id")).then_some(ColumnVerdict::Ignored)
}

fn named_dimension_rule(lower_name: &str, _value: &CellValue) -> Option<ColumnVerdict> {
    DIMENSION_PRIORITY
        .iter()
        .position(|hint| hint.matches(lower_name))
        .map(ColumnVerdict::NamedDimension)
}

fn calendar_date_rule(_lower_name: &str, value: &CellValue) -> Option<ColumnVerdict> {
    value
        .as_text()
        .and_then(|text| parse_calendar_date(text.trim()))
        .map(|_| ColumnVerdict::FallbackDimension)
}

fn numeric_rule(_lower_name: &str, value: &CellValue) -> Option<ColumnVerdict> {
    value.as_number().map(|_| ColumnVerdict::Metric)
}

// A null sample says nothing about the column.
fn null_rule(_lower_name: &str, value: &CellValue) -> Option<ColumnVerdict> {
    value.is_null().then_some(ColumnVerdict::Ignored)
}

#[must_use]
pub fn classify_column(name: &str, value: &CellValue) -> ColumnVerdict {
    let lower_name = name.to_ascii_lowercase();
    column_rule_table()
        .iter()
        .find_map(|rule| (rule.check)(&lower_name, value))
        .unwrap_or(ColumnVerdict::FallbackDimension)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnRoles {
    pub dimension: Option<String>,
    pub metrics: Vec<String>,
    pub roles: Vec<(String, ColumnRole)>,
}

impl ColumnRoles {
    #[must_use]
    pub fn role_of(&self, column: &str) -> Option<ColumnRole> {
        self.roles
            .iter()
            .find_map(|(name, role)| (name == column).then_some(*role))
    }

    #[must_use]
    pub fn primary_metric(&self) -> Option<&str> {
        self.metrics.first().map(String::as_str)
    }

    /// Appends metric columns not seen on the sample row after the sample's
    /// own metrics, so the primary metric always comes from the sample.
    pub fn append_metrics<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut appended = Vec::new();
        for column in columns {
            let column = column.into();
            if self.role_of(&column).is_some() {
                continue;
            }
            self.roles.push((column.clone(), ColumnRole::Metric));
            appended.push(column);
        }
        sort_metrics(&mut appended);
        self.metrics.extend(appended);
    }
}

/// Labels each column of a representative row and picks the dimension and
/// the ordered metric list.
#[must_use]
pub fn classify_columns(row: &Row) -> ColumnRoles {
    let mut named: Option<(usize, &str)> = None;
    let mut fallback: Option<&str> = None;
    let mut metrics = Vec::new();
    let mut verdicts = Vec::new();

    for (name, value) in row.columns() {
        let verdict = classify_column(name, value);
        match verdict {
            ColumnVerdict::NamedDimension(rank) => {
                if named.is_none_or(|(best, _)| rank < best) {
                    named = Some((rank, name));
                }
            }
            ColumnVerdict::FallbackDimension => {
                fallback.get_or_insert(name);
            }
            ColumnVerdict::Metric => metrics.push(name.to_string()),
            ColumnVerdict::Ignored => {}
        }
        verdicts.push((name, verdict));
    }

    let dimension = named.map(|(_, name)| name).or(fallback);
    let roles = verdicts
        .into_iter()
        .map(|(name, verdict)| {
            let role = match verdict {
                ColumnVerdict::Metric => ColumnRole::Metric,
                ColumnVerdict::Ignored => ColumnRole::Ignored,
                ColumnVerdict::NamedDimension(_) | ColumnVerdict::FallbackDimension => {
                    ColumnRole::Dimension
                }
            };
            (name.to_string(), role)
        })
        .collect();

    sort_metrics(&mut metrics);
    ColumnRoles {
        dimension: dimension.map(ToString::to_string),
        metrics,
        roles,
    }
}

/// Position in the importance list of the first token the name contains;
/// unmatched columns sort last.
#[must_use]
pub fn metric_priority(column: &str) -> usize {
    let lower = column.to_ascii_lowercase();
    METRIC_IMPORTANCE
        .iter()
        .position(|token| lower.contains(token))
        .unwrap_or(METRIC_IMPORTANCE.len())
}

pub fn sort_metrics(metrics: &mut [String]) {
    metrics.sort_by_key(|metric| metric_priority(metric));
}
