use anyhow::{Context, Result, bail};

use crate::models::Row;

/// Decodes the JSON array of row objects embedded in a result payload such as
/// `"rows: 2\n[{...},{...}]"`. The array spans from the first `[` to the last
/// `]`.
pub fn try_extract_rows(payload: &str) -> Result<Vec<Row>> {
    let Some(start) = payload.find('[') else {
        bail!("result payload does not contain a JSON array");
    };
    let Some(end) = payload.rfind(']') else {
        bail!("result payload JSON array is not terminated");
    };
    if end < start {
        bail!("result payload JSON array is not terminated");
    }

    serde_json::from_str::<Vec<Row>>(&payload[start..=end])
        .context("result payload array must contain JSON row objects")
}

/// Lenient variant: malformed payloads yield an empty row set.
#[must_use]
pub fn extract_rows(payload: &str) -> Vec<Row> {
    try_extract_rows(payload).unwrap_or_default()
}
