use crate::models::CellValue;

pub const NOT_AVAILABLE: &str = "N/A";

/// Compact rendering used everywhere a metric value is shown to a reader:
/// `1.23M`, `4.50K`, `0.0525`, `12.00`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    // Normalizes -0.0 so it never renders as "-0.00".
    let value = if value == 0.0 { 0.0 } else { value };
    let magnitude = value.abs();

    if magnitude >= 1_000_000.0 {
        format!("{}M", group_thousands(&format!("{:.2}", value / 1_000_000.0)))
    } else if magnitude >= 1_000.0 {
        format!("{}K", group_thousands(&format!("{:.2}", value / 1_000.0)))
    } else if magnitude < 1.0 && magnitude > 0.0 {
        format!("{value:.4}")
    } else {
        group_thousands(&format!("{value:.2}"))
    }
}

/// Explicitly signed variant for changes: `+1.20K`, `-300.00`.
#[must_use]
pub fn format_signed(value: f64) -> String {
    if !value.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    let sign = if value < 0.0 { '-' } else { '+' };
    format!("{sign}{}", format_number(value.abs()))
}

/// Preview cells: text is shown verbatim, numbers through [`format_number`].
#[must_use]
pub fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Null => NOT_AVAILABLE.to_string(),
        CellValue::Number(number) => format_number(*number),
        CellValue::Text(text) => text.clone(),
    }
}

fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}
