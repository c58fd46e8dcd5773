use anyhow::{Context, Error, Result};
use clap::Args;
use serde_json::json;

use crate::config::PolicyConfig;
use crate::guardrail::{AcceptedQuery, LimitAction, QueryRejection, validate};
use crate::models::{EnvelopeCommand, QueryEnvelope};

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    #[arg(value_name = "SQL")]
    pub sql: String,

    /// Print the result as a JSON envelope.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// The query was rejected by the guardrail. Mapped to the validation exit
/// code by the binary.
#[derive(Debug)]
pub struct QueryRejectedFailure {
    pub rejection: QueryRejection,
}

impl std::fmt::Display for QueryRejectedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query rejected. {}", self.rejection)
    }
}

impl std::error::Error for QueryRejectedFailure {}

pub fn run(args: &CheckArgs, policy: &PolicyConfig) -> Result<()> {
    println!(
        "check: start allowed_tables={} default_limit={} max_limit={} subqueries={}",
        policy.allowed_tables.len(),
        policy.default_limit,
        policy.max_limit,
        policy.allow_subqueries
    );

    let accepted = match validate(&args.sql, policy) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            return Err(rejection_failure(
                "check",
                EnvelopeCommand::SqlCheck,
                rejection,
                args.json,
            ));
        }
    };
    log_accepted("check", &accepted);

    if args.json {
        let envelope = QueryEnvelope::ok(
            EnvelopeCommand::SqlCheck,
            serde_json::to_value(&accepted).context("failed to encode accepted query")?,
        )
        .with_meta("guardrail_checked", json!(true));
        println!(
            "{}",
            envelope
                .to_json_line()
                .context("failed to encode check response")?
        );
    } else {
        println!("{}", accepted.sql);
    }

    Ok(())
}

pub(crate) fn log_accepted(prefix: &str, accepted: &AcceptedQuery) {
    println!(
        "{prefix}: accepted tables={} limit={}",
        accepted.tables.join(","),
        limit_action_key(accepted.limit)
    );
}

/// Logs the rejection, prints the error envelope when JSON output was asked
/// for, and wraps the rejection for exit-code mapping.
pub(crate) fn rejection_failure(
    prefix: &str,
    command: EnvelopeCommand,
    rejection: QueryRejection,
    json_output: bool,
) -> Error {
    eprintln!(
        "{prefix}: rejected kind={} reason={}",
        rejection.kind.as_str(),
        rejection.reason().unwrap_or("unknown")
    );
    if json_output {
        match QueryEnvelope::rejected(command, &rejection).to_json_line() {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("{prefix}: envelope encode failed error={error}"),
        }
    }
    Error::new(QueryRejectedFailure { rejection })
}

#[must_use]
pub fn limit_action_key(action: LimitAction) -> String {
    match action {
        LimitAction::Kept { limit } => format!("kept:{limit}"),
        LimitAction::Appended { limit } => format!("appended:{limit}"),
        LimitAction::Clamped {
            requested: Some(requested),
            limit,
        } => format!("clamped:{requested}->{limit}"),
        LimitAction::Clamped {
            requested: None,
            limit,
        } => format!("clamped:overflow->{limit}"),
    }
}
