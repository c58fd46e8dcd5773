pub mod format;

use crate::evidence::{
    AggregationRecord, CategoryAnalysis, Evidence, PeriodComparison, RankingEntry, ShareAnalysis,
};

use self::format::{format_cell, format_number, format_signed};

/// Renders the evidence as sectioned markdown-ish text for a downstream
/// reader. Every number shown here comes from a field of [`Evidence`];
/// sections with nothing to say are left out.
#[must_use]
pub fn render_evidence_text(evidence: &Evidence) -> String {
    let mut sections = vec![
        format!("## Question\n{}", evidence.question),
        format!("## SQL\n```sql\n{}\n```", evidence.sql),
        format!("## Row count\n{}", evidence.row_count),
    ];

    let mut push_section = |title: &str, lines: Vec<String>| {
        if !lines.is_empty() {
            sections.push(format!("### {title}\n{}", lines.join("\n")));
        }
    };

    push_section(
        "Aggregations",
        evidence.aggregations.iter().map(aggregation_line).collect(),
    );
    push_section(
        "Analysis",
        evidence
            .analysis
            .iter()
            .map(|item| format!("- {item}"))
            .collect(),
    );
    push_section(
        "Share",
        evidence
            .share_analysis
            .as_ref()
            .map(share_lines)
            .unwrap_or_default(),
    );
    push_section(
        "Category",
        evidence
            .category_analysis
            .as_ref()
            .map(category_lines)
            .unwrap_or_default(),
    );
    push_section(
        "Ranking",
        evidence.rankings.iter().map(ranking_line).collect(),
    );
    push_section(
        "Period comparison",
        evidence
            .period_comparison
            .as_ref()
            .map(period_lines)
            .unwrap_or_default(),
    );
    push_section(
        "Data preview",
        evidence
            .preview
            .iter()
            .map(|row| {
                let cells = row
                    .columns()
                    .map(|(name, value)| format!("{name}={}", format_cell(value)))
                    .collect::<Vec<_>>();
                format!("- {}", cells.join(", "))
            })
            .collect(),
    );

    sections.join("\n\n")
}

fn aggregation_line(record: &AggregationRecord) -> String {
    let mut parts = Vec::with_capacity(4);
    if let Some(sum) = record.sum {
        parts.push(format!("sum {}", format_number(sum)));
    }
    parts.push(format!("mean {}", format_number(record.mean)));
    parts.push(format!("max {}", format_number(record.max)));
    parts.push(format!("min {}", format_number(record.min)));
    format!(
        "- {}: {} ({} values)",
        record.label,
        parts.join(", "),
        record.count
    )
}

fn share_lines(share: &ShareAnalysis) -> Vec<String> {
    let mut lines = vec![format!(
        "- Top \"{}\" accounts for {:.1}% of {}",
        share.top_name, share.top_share, share.metric
    )];
    if let Some(top3) = share.top3_share {
        lines.push(format!("- Top 3 account for {top3:.1}% of {}", share.metric));
    }
    lines
}

fn category_lines(category: &CategoryAnalysis) -> Vec<String> {
    let best = format!(
        "- Best {} category: \"{}\" (avg {})",
        category.label,
        category.best.name,
        format_number(category.best.avg)
    );
    let worst = match category.worst.ratio {
        Some(ratio) => format!(
            "- Room to improve: \"{}\" (avg {}, {ratio:.1}x)",
            category.worst.name,
            format_number(category.worst.avg)
        ),
        None => format!(
            "- Room to improve: \"{}\" (avg {})",
            category.worst.name,
            format_number(category.worst.avg)
        ),
    };
    vec![best, worst]
}

fn ranking_line(entry: &RankingEntry) -> String {
    format!(
        "- #{} {} ({} = {})",
        entry.rank,
        entry.name,
        entry.metric,
        format_number(entry.value)
    )
}

fn period_lines(period: &PeriodComparison) -> Vec<String> {
    let mut lines = vec![
        format!("- Date column: {}", period.date_column),
        format!(
            "- Previous: {} to {} ({} rows)",
            period.previous.start, period.previous.end, period.previous.rows
        ),
        format!(
            "- Current: {} to {} ({} rows)",
            period.current.start, period.current.end, period.current.rows
        ),
    ];
    lines.extend(period.metrics.iter().map(|change| {
        let pct = change
            .change_pct
            .map(|pct| format!(", {pct:+.1}%"))
            .unwrap_or_default();
        format!(
            "- {}: {} -> {} ({}{pct})",
            change.label,
            format_number(change.previous_sum),
            format_number(change.current_sum),
            format_signed(change.change)
        )
    }));
    if !period.summary.is_empty() {
        lines.push(format!("- Summary: {}", period.summary));
    }
    lines
}
