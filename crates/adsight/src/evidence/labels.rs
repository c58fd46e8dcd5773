/// The raw counters reported by the ad platform; every derived ratio is built
/// from two of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseCounter {
    Impressions,
    Clicks,
    Cost,
    Conversions,
    ConversionValue,
}

impl BaseCounter {
    pub const ALL: [Self; 5] = [
        Self::Impressions,
        Self::Clicks,
        Self::Cost,
        Self::Conversions,
        Self::ConversionValue,
    ];

    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Cost => "cost",
            Self::Conversions => "conversions",
            Self::ConversionValue => "conversion_value",
        }
    }

    /// Resolves `cost`, `total_cost` and `sum_cost` style column names.
    #[must_use]
    pub fn from_column(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let bare = ["total_", "sum_"]
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix))
            .unwrap_or(&lower);
        Self::ALL.into_iter().find(|counter| counter.column() == bare)
    }
}

const EXACT_LABELS: &[(&str, &str)] = &[
    ("impressions", "Impressions"),
    ("clicks", "Clicks"),
    ("cost", "Cost"),
    ("conversions", "Conversions"),
    ("conversion_value", "Conversion Value"),
    ("ctr", "CTR"),
    ("cpc", "CPC"),
    ("cvr", "CVR"),
    ("cpa", "CPA"),
    ("roas", "ROAS"),
];

// Longest pattern first so `conversion` wins over `cost`-like fragments.
const PATTERN_LABELS: &[(&str, &str)] = &[
    ("impression", "Impressions"),
    ("conversion", "Conversions"),
    ("click", "Clicks"),
    ("spend", "Cost"),
    ("cost", "Cost"),
    ("roas", "ROAS"),
    ("cpa", "CPA"),
    ("cpc", "CPC"),
    ("ctr", "CTR"),
    ("cvr", "CVR"),
];

const PREFIX_LABELS: &[(&str, &str)] = &[
    ("total", "Total"),
    ("sum", "Sum"),
    ("average", "Avg"),
    ("avg", "Avg"),
    ("max", "Max"),
    ("min", "Min"),
];

/// Human-readable label for a metric column (`total_cost` → `Total Cost`).
#[must_use]
pub fn metric_label(column: &str) -> String {
    let lower = column.to_ascii_lowercase();
    if let Some(label) = exact_label(&lower) {
        return label.to_string();
    }

    let (prefix, remaining) = PREFIX_LABELS
        .iter()
        .find_map(|(prefix, label)| {
            lower
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| (Some(*label), rest))
        })
        .unwrap_or((None, lower.as_str()));

    let base = exact_label(remaining)
        .or_else(|| {
            PATTERN_LABELS
                .iter()
                .find_map(|(pattern, label)| remaining.contains(pattern).then_some(*label))
        })
        .map(ToString::to_string);

    match (prefix, base) {
        (Some(prefix), Some(base)) => format!("{prefix} {base}"),
        (None, Some(base)) => base,
        (Some(prefix), None) => format!("{prefix} {}", title_case(remaining)),
        (None, None) => title_case(column),
    }
}

fn exact_label(lower: &str) -> Option<&'static str> {
    EXACT_LABELS
        .iter()
        .find_map(|(column, label)| (*column == lower).then_some(*label))
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
