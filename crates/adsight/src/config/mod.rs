use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROW_LIMIT: u64 = 100;
pub const MAX_ROW_LIMIT: u64 = 1_000;

pub const DEFAULT_ALLOWED_TABLES: &[&str] = &[
    "services",
    "ad_accounts",
    "campaigns",
    "ad_groups",
    "keywords",
    "ads",
    "targeting_settings",
    "search_queries",
    "search_query_keyword_ad_daily_stats",
    "display_ad_daily_stats",
    "campaign_daily_stats",
];

/// Mandatory predicate for a scoped table: the query must filter with
/// `<column> = :<parameter>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeRule {
    pub column: String,
    pub parameter: String,
}

impl ScopeRule {
    #[must_use]
    pub fn new(column: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            parameter: parameter.into(),
        }
    }

    #[must_use]
    pub fn service_scope() -> Self {
        Self::new("service_id", "service_id")
    }
}

/// Validator policy. Always passed explicitly into
/// [`crate::guardrail::validate`]; nothing reads it from process state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub allowed_tables: BTreeSet<String>,
    pub default_limit: u64,
    pub max_limit: u64,
    pub allow_subqueries: bool,
    pub scope_rules: BTreeMap<String, ScopeRule>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_tables: DEFAULT_ALLOWED_TABLES
                .iter()
                .map(ToString::to_string)
                .collect(),
            default_limit: DEFAULT_ROW_LIMIT,
            max_limit: MAX_ROW_LIMIT,
            allow_subqueries: false,
            scope_rules: BTreeMap::new(),
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn with_allowed_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_limits(mut self, default_limit: u64, max_limit: u64) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    #[must_use]
    pub fn with_subqueries(mut self, allow_subqueries: bool) -> Self {
        self.allow_subqueries = allow_subqueries;
        self
    }

    #[must_use]
    pub fn with_scope_rule(mut self, table: impl Into<String>, rule: ScopeRule) -> Self {
        self.scope_rules.insert(table.into(), rule);
        self
    }

    #[must_use]
    pub fn is_table_allowed(&self, table: &str) -> bool {
        self.allowed_tables
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(table))
    }

    #[must_use]
    pub fn scope_rule_for(&self, table: &str) -> Option<&ScopeRule> {
        self.scope_rules
            .iter()
            .find_map(|(scoped, rule)| scoped.eq_ignore_ascii_case(table).then_some(rule))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid policy file: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let policy =
            serde_json::from_str::<Self>(raw).context("policy must be a JSON object")?;
        policy.check()?;
        Ok(policy)
    }

    pub fn check(&self) -> Result<()> {
        if self.max_limit == 0 {
            bail!("max_limit must be greater than zero");
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            bail!(
                "default_limit must be between 1 and max_limit ({}), got {}",
                self.max_limit,
                self.default_limit
            );
        }
        for table in &self.allowed_tables {
            ensure_identifier("allowed table", table)?;
        }
        for (table, rule) in &self.scope_rules {
            ensure_identifier("scoped table", table)?;
            ensure_identifier("scope column", &rule.column)?;
            ensure_identifier("scope parameter", &rule.parameter)?;
        }
        Ok(())
    }
}

/// Command-line values layered over the policy file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub allow_subqueries: bool,
    pub default_limit: Option<u64>,
    pub max_limit: Option<u64>,
}

/// Loads the policy file when given (defaults otherwise) and applies the
/// overrides. Limits set by overrides are not re-checked here: an
/// inconsistent pair surfaces as a validator rejection.
pub fn resolve_policy(path: Option<&Path>, overrides: PolicyOverrides) -> Result<PolicyConfig> {
    let mut policy = match path {
        Some(path) => PolicyConfig::load(path)?,
        None => PolicyConfig::default(),
    };
    if overrides.allow_subqueries {
        policy.allow_subqueries = true;
    }
    if let Some(default_limit) = overrides.default_limit {
        policy.default_limit = default_limit;
    }
    if let Some(max_limit) = overrides.max_limit {
        policy.max_limit = max_limit;
    }
    Ok(policy)
}

fn ensure_identifier(kind: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        bail!("{kind} must be a plain SQL identifier: `{value}`");
    }
    Ok(())
}
