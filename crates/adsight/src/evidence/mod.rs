pub mod columns;
pub mod derived;
pub mod labels;
pub mod period;
pub mod stats;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CellValue, Row};

pub use columns::{ColumnRole, ColumnRoles, classify_columns};
pub use derived::{DERIVED_METRIC_COLUMNS, DerivedMetricSet, derive_rows, is_ratio_metric};
pub use labels::metric_label;
pub use period::{PeriodComparison, PeriodMetricChange, PeriodRange, compare_periods};
pub use stats::{
    AggregationRecord, CategoryAnalysis, CategoryShortfall, CategoryStanding, DispersionFinding,
    DispersionLevel, RankingEntry, ShareAnalysis,
};

pub const PREVIEW_ROWS: usize = 5;

/// Everything the reporting side needs to answer a question from one result
/// set. Built once per query and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evidence {
    pub question: String,
    pub sql: String,
    pub row_count: usize,
    /// First rows exactly as the query returned them.
    #[schemars(with = "Vec<BTreeMap<String, CellValue>>")]
    pub preview: Vec<Row>,
    pub dimension: Option<String>,
    pub metrics: Vec<String>,
    pub aggregations: Vec<AggregationRecord>,
    pub dispersion: Vec<DispersionFinding>,
    pub analysis: Vec<String>,
    pub rankings: Vec<RankingEntry>,
    pub share_analysis: Option<ShareAnalysis>,
    pub category_analysis: Option<CategoryAnalysis>,
    pub period_comparison: Option<PeriodComparison>,
}

impl Evidence {
    #[must_use]
    pub fn empty(question: &str, executed_sql: &str) -> Self {
        Self {
            question: question.to_string(),
            sql: executed_sql.to_string(),
            row_count: 0,
            preview: Vec::new(),
            dimension: None,
            metrics: Vec::new(),
            aggregations: Vec::new(),
            dispersion: Vec::new(),
            analysis: Vec::new(),
            rankings: Vec::new(),
            share_analysis: None,
            category_analysis: None,
            period_comparison: None,
        }
    }

    pub fn to_structured(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_structured(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    #[must_use]
    pub fn primary_metric(&self) -> Option<&str> {
        self.metrics.first().map(String::as_str)
    }
}

/// Runs the full pipeline over one result set: column roles from the first
/// row as returned, derived metrics, then every sub-analysis. Never fails; an empty row set yields
/// [`Evidence::empty`].
#[must_use]
pub fn build_evidence(rows: &[Row], question: &str, executed_sql: &str) -> Evidence {
    let Some(first) = rows.first() else {
        return Evidence::empty(question, executed_sql);
    };

    let mut roles = classify_columns(first);
    let derived = derive_rows(rows);
    roles.append_metrics(
        DERIVED_METRIC_COLUMNS
            .iter()
            .filter(|column| derived.iter().any(|row| row.contains(column)))
            .copied(),
    );

    let dimension = roles.dimension.as_deref();
    let primary = roles.primary_metric();
    let multi_row = derived.len() >= 2;

    let aggregations = stats::aggregate(&derived, &roles.metrics);
    let dispersion = if multi_row {
        stats::dispersion(&derived, &roles.metrics)
    } else {
        Vec::new()
    };
    let analysis = dispersion
        .iter()
        .flat_map(DispersionFinding::narratives)
        .collect();

    let (rankings, share_analysis, category_analysis) = match (dimension, primary) {
        (Some(dimension), Some(metric)) => (
            stats::rank(&derived, dimension, metric),
            multi_row
                .then(|| stats::share(&derived, dimension, metric))
                .flatten(),
            multi_row
                .then(|| stats::categorize(&derived, dimension, metric))
                .flatten(),
        ),
        _ => (Vec::new(), None, None),
    };

    Evidence {
        question: question.to_string(),
        sql: executed_sql.to_string(),
        row_count: rows.len(),
        preview: rows.iter().take(PREVIEW_ROWS).cloned().collect(),
        period_comparison: compare_periods(&derived, dimension, &roles.metrics),
        dimension: roles.dimension.clone(),
        metrics: roles.metrics.clone(),
        aggregations,
        dispersion,
        analysis,
        rankings,
        share_analysis,
        category_analysis,
    }
}

pub fn json_schema() -> serde_json::Result<Value> {
    serde_json::to_value(schemars::schema_for!(Evidence))
}

#[cfg(test)]
mod tests {
    use super::{Evidence, build_evidence, json_schema};
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

    #[test]
    fn empty_rows_yield_empty_evidence() {
        let evidence = build_evidence(&[], "how much?", "SELECT 1 FROM campaigns LIMIT 100");

        assert_eq!(evidence, Evidence::empty("how much?", "SELECT 1 FROM campaigns LIMIT 100"));
        let structured = evidence.to_structured().expect("evidence should serialize");
        assert_eq!(structured["aggregations"], serde_json::json!([]));
        assert!(structured["share_analysis"].is_null());
    }

    #[test]
    fn derived_metrics_follow_the_query_metrics() {
        let evidence = build_evidence(&campaign_rows(), "q", "sql");

        assert_eq!(evidence.dimension.as_deref(), Some("name"));
        assert_eq!(evidence.metrics, vec!["cost", "clicks", "cpc"]);
        assert_eq!(evidence.primary_metric(), Some("cost"));
        assert_eq!(evidence.rankings[0].metric, "Cost");
        assert!(evidence.preview.iter().all(|row| !row.contains("cpc")));
    }

    #[test]
    fn single_row_skips_multi_row_analyses() {
        let rows = &campaign_rows()[..1];
        let evidence = build_evidence(rows, "q", "sql");

        assert_eq!(evidence.aggregations.len(), 3);
        assert!(evidence.dispersion.is_empty());
        assert!(evidence.share_analysis.is_none());
        assert_eq!(evidence.rankings.len(), 1);
    }

    #[test]
    fn schema_describes_evidence_fields() {
        let schema = json_schema().expect("schema should serialize");
        let properties = schema["properties"]
            .as_object()
            .expect("schema should list properties");

        assert!(properties.contains_key("aggregations"));
        assert!(properties.contains_key("period_comparison"));
    }
}
