#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod evidence;
pub mod guardrail;
pub mod models;
pub mod report;
pub mod sqlite;
pub mod utils;

pub use cli::app::{Cli, Command};
pub use config::PolicyConfig;
pub use evidence::{Evidence, build_evidence};
pub use guardrail::{AcceptedQuery, QueryRejection, RejectionKind, validate};
pub use report::render_evidence_text;
