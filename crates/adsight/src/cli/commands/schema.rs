use anyhow::{Context, Result};
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    /// Single-line output instead of pretty-printed JSON.
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

pub fn run(args: &SchemaArgs) -> Result<()> {
    let schema = crate::evidence::json_schema().context("failed to generate evidence schema")?;
    let encoded = if args.compact {
        serde_json::to_string(&schema)
    } else {
        serde_json::to_string_pretty(&schema)
    }
    .context("failed to encode evidence schema")?;
    println!("{encoded}");
    Ok(())
}
