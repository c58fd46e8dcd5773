use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::derived::is_ratio_metric;
use super::labels::metric_label;
use crate::models::Row;

pub const AGGREGATED_METRICS: usize = 7;
pub const DISPERSION_METRICS: usize = 4;
pub const RANKING_SIZE: usize = 5;

const UNKNOWN_NAME: &str = "unknown";
const LOWER_IS_BETTER_TOKENS: &[&str] = &["cost", "cpc", "cpa"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationRecord {
    pub metric: String,
    pub label: String,
    /// Absent for ratio-type metrics; summing a rate is meaningless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispersionLevel {
    VeryHigh,
    High,
    Moderate,
    Low,
}

impl DispersionLevel {
    #[must_use]
    pub fn from_coefficient(cv_percent: f64) -> Self {
        if cv_percent > 50.0 {
            Self::VeryHigh
        } else if cv_percent > 30.0 {
            Self::High
        } else if cv_percent > 15.0 {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryHigh => "very high",
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DispersionFinding {
    pub metric: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_min_ratio: Option<f64>,
    /// Population standard deviation over mean, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coefficient_of_variation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<DispersionLevel>,
}

impl DispersionFinding {
    #[must_use]
    pub fn narratives(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(ratio) = self.max_min_ratio {
            lines.push(format!("{} max is {ratio:.1}x the min", self.label));
        }
        if let (Some(cv), Some(level)) = (self.coefficient_of_variation, self.level) {
            lines.push(format!(
                "{} dispersion is {} (coefficient of variation {cv:.1}%)",
                self.label,
                level.as_str()
            ));
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankingEntry {
    pub rank: usize,
    pub name: String,
    /// Label of the ranked metric.
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShareAnalysis {
    /// Label of the metric the shares are taken over.
    pub metric: String,
    pub top_name: String,
    pub top_share: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top3_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryStanding {
    pub name: String,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryShortfall {
    pub name: String,
    pub avg: f64,
    /// Highest category mean over lowest; absent when the lowest is not
    /// positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryAnalysis {
    pub metric: String,
    pub label: String,
    pub best: CategoryStanding,
    pub worst: CategoryShortfall,
}

#[must_use]
pub fn numeric_values(rows: &[Row], metric: &str) -> Vec<f64> {
    rows.iter().filter_map(|row| row.number(metric)).collect()
}

/// `(dimension value, metric value)` for every row with a usable metric.
fn named_values(rows: &[Row], dimension: &str, metric: &str) -> Vec<(String, f64)> {
    rows.iter()
        .filter_map(|row| {
            let value = row.number(metric)?;
            let name = row
                .get(dimension)
                .and_then(|cell| cell.label())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            Some((name, value))
        })
        .collect()
}

fn sorted_descending(mut values: Vec<(String, f64)>) -> Vec<(String, f64)> {
    values.sort_by(|left, right| right.1.total_cmp(&left.1));
    values
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn extremes(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(*value), max.max(*value))
        })
}

#[must_use]
pub fn aggregate(rows: &[Row], metrics: &[String]) -> Vec<AggregationRecord> {
    metrics
        .iter()
        .take(AGGREGATED_METRICS)
        .filter_map(|metric| {
            let values = numeric_values(rows, metric);
            if values.is_empty() {
                return None;
            }
            let (min, max) = extremes(&values);
            let sum = values.iter().sum::<f64>();
            Some(AggregationRecord {
                metric: metric.clone(),
                label: metric_label(metric),
                sum: (!is_ratio_metric(metric)).then_some(sum),
                mean: sum / values.len() as f64,
                max,
                min,
                count: values.len(),
            })
        })
        .collect()
}

#[must_use]
pub fn dispersion(rows: &[Row], metrics: &[String]) -> Vec<DispersionFinding> {
    metrics
        .iter()
        .take(DISPERSION_METRICS)
        .filter_map(|metric| {
            let values = numeric_values(rows, metric);
            if values.len() < 2 {
                return None;
            }
            let (min, max) = extremes(&values);
            let mean = mean(&values);

            let max_min_ratio = (min > 0.0).then(|| max / min);
            let coefficient_of_variation = (mean > 0.0).then(|| {
                let variance = values
                    .iter()
                    .map(|value| (value - mean).powi(2))
                    .sum::<f64>()
                    / values.len() as f64;
                variance.sqrt() / mean * 100.0
            });
            if max_min_ratio.is_none() && coefficient_of_variation.is_none() {
                return None;
            }

            Some(DispersionFinding {
                metric: metric.clone(),
                label: metric_label(metric),
                max_min_ratio,
                coefficient_of_variation,
                level: coefficient_of_variation.map(DispersionLevel::from_coefficient),
            })
        })
        .collect()
}

#[must_use]
pub fn rank(rows: &[Row], dimension: &str, metric: &str) -> Vec<RankingEntry> {
    let label = metric_label(metric);
    sorted_descending(named_values(rows, dimension, metric))
        .into_iter()
        .take(RANKING_SIZE)
        .enumerate()
        .map(|(index, (name, value))| RankingEntry {
            rank: index + 1,
            name,
            metric: label.clone(),
            value,
        })
        .collect()
}

#[must_use]
pub fn share(rows: &[Row], dimension: &str, metric: &str) -> Option<ShareAnalysis> {
    let values = sorted_descending(named_values(rows, dimension, metric));
    let total = values.iter().map(|(_, value)| value).sum::<f64>();
    if total <= 0.0 {
        return None;
    }

    let (top_name, top_value) = values.first()?.clone();
    let top3_share = (values.len() >= 3).then(|| {
        values.iter().take(3).map(|(_, value)| value).sum::<f64>() / total * 100.0
    });

    Some(ShareAnalysis {
        metric: metric_label(metric),
        top_name,
        top_share: top_value / total * 100.0,
        top3_share,
    })
}

/// Category key of a dimension value: the text before the first underscore.
#[must_use]
pub fn category_key(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

#[must_use]
pub fn is_lower_better(metric: &str) -> bool {
    let lower = metric.to_ascii_lowercase();
    LOWER_IS_BETTER_TOKENS
        .iter()
        .any(|token| lower.contains(token))
}

#[must_use]
pub fn categorize(rows: &[Row], dimension: &str, metric: &str) -> Option<CategoryAnalysis> {
    let mut categories: Vec<(String, Vec<f64>)> = Vec::new();
    for row in rows {
        let Some(value) = row.number(metric) else {
            continue;
        };
        let Some(name) = row.get(dimension).and_then(|cell| cell.label()) else {
            continue;
        };
        let key = category_key(&name);
        if key.is_empty() {
            continue;
        }
        match categories.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, values)) => values.push(value),
            None => categories.push((key.to_string(), vec![value])),
        }
    }
    if categories.len() < 2 {
        return None;
    }

    let mut means = categories
        .into_iter()
        .map(|(key, values)| (key, mean(&values)))
        .collect::<Vec<_>>();
    means.sort_by(|left, right| left.1.total_cmp(&right.1));

    let (lowest_name, lowest_avg) = means.first()?.clone();
    let (highest_name, highest_avg) = means.last()?.clone();
    let ratio = (lowest_avg > 0.0).then(|| highest_avg / lowest_avg);

    let ((best_name, best_avg), (worst_name, worst_avg)) = if is_lower_better(metric) {
        ((lowest_name, lowest_avg), (highest_name, highest_avg))
    } else {
        ((highest_name, highest_avg), (lowest_name, lowest_avg))
    };

    Some(CategoryAnalysis {
        metric: metric.to_string(),
        label: metric_label(metric),
        best: CategoryStanding {
            name: best_name,
            avg: best_avg,
        },
        worst: CategoryShortfall {
            name: worst_name,
            avg: worst_avg,
            ratio,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::{
        DispersionLevel, aggregate, categorize, category_key, dispersion, rank, share,
    };
    use crate::models::{CellValue, Row};

    fn campaign_rows() -> Vec<Row> {
        vec![
            Row::from_pairs([
                ("name", CellValue::text("EC_Search")),
                ("cost", CellValue::Number(100.0)),
                ("clicks", CellValue::Number(10.0)),
            ]),
            Row::from_pairs([
                ("name", CellValue::text("EC_Display")),
                ("cost", CellValue::Number(300.0)),
                ("clicks", CellValue::Number(30.0)),
            ]),
        ]
    }

    fn metrics(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn aggregates_sum_mean_and_extremes() {
        let records = aggregate(&campaign_rows(), &metrics(&["cost"]));

        assert_eq!(records.len(), 1);
        let cost = &records[0];
        assert_eq!(cost.label, "Cost");
        assert_eq!(cost.sum, Some(400.0));
        assert_eq!(cost.mean, 200.0);
        assert_eq!(cost.max, 300.0);
        assert_eq!(cost.min, 100.0);
        assert_eq!(cost.count, 2);
    }

    #[test]
    fn ratio_metrics_never_carry_sum() {
        let rows = vec![
            Row::from_pairs([("cpa", 10.0), ("avg_cost", 4.0)]),
            Row::from_pairs([("cpa", 30.0), ("avg_cost", 6.0)]),
        ];
        let records = aggregate(&rows, &metrics(&["cpa", "avg_cost"]));

        assert!(records.iter().all(|record| record.sum.is_none()));
        assert_eq!(records[0].mean, 20.0);
    }

    #[test]
    fn aggregation_covers_at_most_seven_metrics() {
        let names = ["m1", "m2", "m3", "m4", "m5", "m6", "m7", "m8"];
        let row = Row::from_pairs(names.iter().map(|name| (*name, 1.0)));
        let records = aggregate(&[row], &metrics(&names));

        assert_eq!(records.len(), 7);
        assert_eq!(records[6].metric, "m7");
    }

    #[test]
    fn dispersion_reports_ratio_and_bucketed_cv() {
        let findings = dispersion(&campaign_rows(), &metrics(&["cost"]));

        assert_eq!(findings.len(), 1);
        let cost = &findings[0];
        assert_eq!(cost.max_min_ratio, Some(3.0));
        assert_eq!(cost.coefficient_of_variation, Some(50.0));
        assert_eq!(cost.level, Some(DispersionLevel::High));
        assert_eq!(
            cost.narratives(),
            vec![
                "Cost max is 3.0x the min".to_string(),
                "Cost dispersion is high (coefficient of variation 50.0%)".to_string(),
            ]
        );
    }

    #[test]
    fn all_zero_metric_produces_no_dispersion() {
        let rows = vec![
            Row::from_pairs([("conversions", 0.0)]),
            Row::from_pairs([("conversions", 0.0)]),
        ];

        assert!(dispersion(&rows, &metrics(&["conversions"])).is_empty());
    }

    #[test]
    fn dispersion_needs_two_values() {
        let rows = vec![
            Row::from_pairs([("cost", CellValue::Number(5.0))]),
            Row::from_pairs([("cost", CellValue::Null)]),
        ];

        assert!(dispersion(&rows, &metrics(&["cost"])).is_empty());
    }

    #[test]
    fn cv_buckets_are_strict() {
        assert_eq!(DispersionLevel::from_coefficient(50.0), DispersionLevel::High);
        assert_eq!(DispersionLevel::from_coefficient(50.1), DispersionLevel::VeryHigh);
        assert_eq!(DispersionLevel::from_coefficient(30.0), DispersionLevel::Moderate);
        assert_eq!(DispersionLevel::from_coefficient(15.0), DispersionLevel::Low);
    }

    #[test]
    fn ranking_is_stable_descending_and_capped() {
        let rows = (0..7)
            .map(|index| {
                Row::from_pairs([
                    ("name", CellValue::text(format!("c{index}"))),
                    ("cost", CellValue::Number(if index < 2 { 50.0 } else { index as f64 })),
                ])
            })
            .collect::<Vec<_>>();
        let ranking = rank(&rows, "name", "cost");

        assert_eq!(ranking.len(), 5);
        assert_eq!(ranking[0].name, "c0");
        assert_eq!(ranking[1].name, "c1");
        assert_eq!(ranking[2].name, "c6");
        assert_eq!(
            ranking.iter().map(|entry| entry.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(ranking.iter().all(|entry| entry.metric == "Cost"));
    }

    #[test]
    fn ranking_names_missing_dimension_values_unknown() {
        let rows = vec![Row::from_pairs([("cost", 10.0)])];
        let ranking = rank(&rows, "name", "cost");

        assert_eq!(ranking[0].name, "unknown");
    }

    #[test]
    fn share_uses_top_entry_and_top_three() {
        let two = share(&campaign_rows(), "name", "cost").expect("positive total");
        assert_eq!(two.top_name, "EC_Display");
        assert_eq!(two.top_share, 75.0);
        assert_eq!(two.top3_share, None);

        let mut rows = campaign_rows();
        rows.push(Row::from_pairs([
            ("name", CellValue::text("Brand")),
            ("cost", CellValue::Number(600.0)),
        ]));
        rows.push(Row::from_pairs([
            ("name", CellValue::text("Other")),
            ("cost", CellValue::Number(0.0)),
        ]));
        let four = share(&rows, "name", "cost").expect("positive total");
        assert_eq!(four.top_name, "Brand");
        assert_eq!(four.top_share, 60.0);
        assert_eq!(four.top3_share, Some(100.0));
    }

    #[test]
    fn share_requires_positive_total() {
        let rows = vec![
            Row::from_pairs([("name", CellValue::text("a")), ("cost", CellValue::Number(0.0))]),
            Row::from_pairs([("name", CellValue::text("b")), ("cost", CellValue::Number(0.0))]),
        ];

        assert!(share(&rows, "name", "cost").is_none());
    }

    #[test]
    fn category_polarity_for_cost_like_metrics() {
        let rows = [("A_1", 8.0), ("A_2", 12.0), ("B_1", 25.0), ("B_2", 35.0)]
            .into_iter()
            .map(|(name, cpa)| {
                Row::from_pairs([("name", CellValue::text(name)), ("cpa", CellValue::Number(cpa))])
            })
            .collect::<Vec<_>>();

        let analysis = categorize(&rows, "name", "cpa").expect("two categories");
        assert_eq!(analysis.best.name, "A");
        assert_eq!(analysis.best.avg, 10.0);
        assert_eq!(analysis.worst.name, "B");
        assert_eq!(analysis.worst.avg, 30.0);
        assert_eq!(analysis.worst.ratio, Some(3.0));

        let swapped = rows
            .iter()
            .map(|row| Row::from_pairs([
                ("name", row.get("name").cloned().unwrap_or(CellValue::Null)),
                ("conversions", row.get("cpa").cloned().unwrap_or(CellValue::Null)),
            ]))
            .collect::<Vec<_>>();
        let analysis = categorize(&swapped, "name", "conversions").expect("two categories");
        assert_eq!(analysis.best.name, "B");
        assert_eq!(analysis.worst.name, "A");
        assert_eq!(analysis.worst.ratio, Some(3.0));
    }

    #[test]
    fn category_ratio_absent_for_non_positive_lowest_mean() {
        let rows = vec![
            Row::from_pairs([("name", CellValue::text("A_x")), ("cost", CellValue::Number(0.0))]),
            Row::from_pairs([("name", CellValue::text("B_x")), ("cost", CellValue::Number(9.0))]),
        ];
        let analysis = categorize(&rows, "name", "cost").expect("two categories");

        assert_eq!(analysis.best.name, "A");
        assert_eq!(analysis.worst.ratio, None);
    }

    #[test]
    fn category_keys_split_on_first_underscore() {
        assert_eq!(category_key("EC_Search_Brand"), "EC");
        assert_eq!(category_key("Brand"), "Brand");
        assert_eq!(category_key("_leading"), "");

        let rows = vec![
            Row::from_pairs([("name", CellValue::text("_x")), ("cost", CellValue::Number(1.0))]),
            Row::from_pairs([("name", CellValue::text("EC_y")), ("cost", CellValue::Number(2.0))]),
        ];
        assert!(categorize(&rows, "name", "cost").is_none(), "empty keys are skipped");
    }
}
