use std::path::PathBuf;

use anyhow::{Context, Error, Result, bail};
use clap::Args;
use serde_json::{Value, json};

use super::check::{log_accepted, rejection_failure};
use super::evidence::emit_evidence;
use crate::config::PolicyConfig;
use crate::evidence::build_evidence;
use crate::guardrail::validate;
use crate::models::{EnvelopeCommand, QueryEnvelope, QueryEnvelopeCommandFailure};
use crate::sqlite::{DEFAULT_ROW_CAP, QueryParam, execute_read_only};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(value_name = "SQL")]
    pub sql: String,

    #[arg(long, value_name = "PATH")]
    pub db: PathBuf,

    #[arg(long)]
    pub question: String,

    /// Named placeholder value, e.g. `--param service_id=3`. Repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_query_param)]
    pub params: Vec<QueryParam>,

    #[arg(long, default_value_t = DEFAULT_ROW_CAP)]
    pub row_cap: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

fn parse_query_param(raw: &str) -> Result<QueryParam, String> {
    QueryParam::parse(raw).map_err(|error| error.to_string())
}

pub fn run(args: &RunArgs, policy: &PolicyConfig) -> Result<()> {
    if args.row_cap == 0 {
        bail!("row_cap must be greater than zero");
    }
    println!(
        "run: start db={} params={} row_cap={}",
        args.db.display(),
        args.params.len(),
        args.row_cap
    );

    let accepted = match validate(&args.sql, policy) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            return Err(rejection_failure(
                "run",
                EnvelopeCommand::QueryRun,
                rejection,
                args.json,
            ));
        }
    };
    log_accepted("run", &accepted);

    let started = std::time::Instant::now();
    let result = execute_read_only(&args.db, &accepted, &args.params, args.row_cap)
        .with_context(|| format!("failed to run accepted query against {}", args.db.display()))
        .map_err(|error| {
            if !args.json {
                return error;
            }
            Error::new(QueryEnvelopeCommandFailure::new(
                QueryEnvelope::error(
                    EnvelopeCommand::QueryRun,
                    "query_execution_failed",
                    "query execution failed",
                )
                .with_meta("guardrail_checked", json!(true))
                .with_meta("row_cap", json!(args.row_cap))
                .with_error_details(json!({
                    "db": args.db.display().to_string(),
                    "cause": format!("{error:#}")
                })),
            ))
        })?;
    let duration_ms = started.elapsed().as_millis() as u64;
    println!(
        "run: executed rows={} truncated={} duration_ms={duration_ms}",
        result.row_count(),
        result.truncated
    );
    if result.truncated {
        eprintln!(
            "run: warning rows truncated to row_cap={} next=tighten_limit",
            args.row_cap
        );
    }

    let evidence = build_evidence(&result.rows, &args.question, &accepted.sql);
    let mut envelope = QueryEnvelope::ok(EnvelopeCommand::QueryRun, Value::Null)
        .with_meta("guardrail_checked", json!(true))
        .with_meta("tables", json!(accepted.tables))
        .with_meta("limit", json!(accepted.limit))
        .with_meta("truncated", json!(result.truncated))
        .with_meta("row_cap", json!(args.row_cap))
        .with_meta("duration_ms", json!(duration_ms));
    if result.truncated {
        envelope = envelope
            .with_warning("result_truncated", "rows truncated to row_cap")
            .with_warning_details(json!({ "row_cap": args.row_cap }));
    }

    emit_evidence("run", &evidence, args.json, envelope)
}
