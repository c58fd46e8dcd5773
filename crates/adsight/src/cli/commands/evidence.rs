use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Value, json};

use crate::evidence::{Evidence, build_evidence};
use crate::models::{EnvelopeCommand, QueryEnvelope};
use crate::report::render_evidence_text;
use crate::utils::payload::try_extract_rows;

#[derive(Debug, Clone, Args)]
pub struct EvidenceArgs {
    /// The analytics question the rows answer.
    #[arg(long)]
    pub question: String,

    /// The SQL that produced the rows, recorded verbatim.
    #[arg(long, value_name = "SQL")]
    pub sql: String,

    /// Result payload file; read from stdin when omitted or `-`.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Print the structured evidence as a JSON envelope.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn run(args: &EvidenceArgs) -> Result<()> {
    let (payload, source) = read_payload(args.input.as_ref())?;
    let (rows, decode_error) = match try_extract_rows(&payload) {
        Ok(rows) => (rows, None),
        Err(error) => {
            eprintln!(
                "evidence: warning payload_unreadable source={source} error={error:#} next=empty_rows"
            );
            (Vec::new(), Some(format!("{error:#}")))
        }
    };
    println!("evidence: start rows={} source={source}", rows.len());

    let evidence = build_evidence(&rows, &args.question, &args.sql);
    let mut envelope = QueryEnvelope::ok(EnvelopeCommand::EvidenceBuild, Value::Null)
        .with_meta("source", json!(source));
    if let Some(error) = decode_error {
        envelope = envelope
            .with_warning("payload_unreadable", "result payload held no decodable row array")
            .with_warning_details(json!({ "error": error }));
    }
    emit_evidence("evidence", &evidence, args.json, envelope)
}

fn read_payload(input: Option<&PathBuf>) -> Result<(String, String)> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            let payload = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read result payload: {}", path.display()))?;
            Ok((payload, path.display().to_string()))
        }
        _ => {
            let mut payload = String::new();
            std::io::stdin()
                .read_to_string(&mut payload)
                .context("failed to read result payload from stdin")?;
            Ok((payload, "stdin".to_string()))
        }
    }
}

/// Prints the evidence either as rendered text or inside `envelope` as its
/// data, after logging a one-line summary.
pub(crate) fn emit_evidence(
    prefix: &str,
    evidence: &Evidence,
    json_output: bool,
    envelope: QueryEnvelope,
) -> Result<()> {
    println!(
        "{prefix}: built dimension={} metrics={} aggregations={} rankings={} period_comparison={}",
        evidence.dimension.as_deref().unwrap_or("none"),
        evidence.metrics.len(),
        evidence.aggregations.len(),
        evidence.rankings.len(),
        evidence.period_comparison.is_some()
    );

    if json_output {
        let structured = evidence
            .to_structured()
            .context("failed to encode structured evidence")?;
        let envelope = envelope
            .with_data(structured)
            .with_meta("row_count", json!(evidence.row_count));
        println!(
            "{}",
            envelope
                .to_json_line()
                .context("failed to encode evidence response")?
        );
    } else {
        println!("{}", render_evidence_text(evidence));
    }

    Ok(())
}
