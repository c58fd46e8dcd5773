use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use super::commands::{
    check::CheckArgs, evidence::EvidenceArgs, run::RunArgs, schema::SchemaArgs,
};
use crate::config::{PolicyConfig, PolicyOverrides, resolve_policy};

#[derive(Debug, Parser)]
#[command(
    name = "adsight",
    version,
    about = "SQL policy guardrail and evidence engine for ad analytics questions"
)]
pub struct Cli {
    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    /// JSON policy file; built-in ad schema defaults when omitted.
    #[arg(long = "policy", global = true, value_name = "PATH")]
    pub policy_file: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    pub allow_subqueries: bool,

    #[arg(long, global = true, value_name = "ROWS")]
    pub default_limit: Option<u64>,

    #[arg(long, global = true, value_name = "ROWS")]
    pub max_limit: Option<u64>,
}

impl PolicyArgs {
    #[must_use]
    pub fn overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            allow_subqueries: self.allow_subqueries,
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn resolve(&self) -> Result<PolicyConfig> {
        resolve_policy(self.policy_file.as_deref(), self.overrides())
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate one SQL statement against the policy.
    Check(CheckArgs),
    /// Build evidence from a result payload holding a JSON row array.
    Evidence(EvidenceArgs),
    /// Validate, execute read-only against SQLite, and build evidence.
    Run(RunArgs),
    /// Print the JSON schema of the structured evidence.
    Schema(SchemaArgs),
}
