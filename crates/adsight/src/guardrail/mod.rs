//! Lexical SQL policy guardrail.
//!
//! Classifies LLM-drafted SQL as accepted or rejected without a SQL grammar.
//! The checks are ordered regular-expression rules; unusual escaping can slip
//! past them and that is an accepted limitation of the lexical approach.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::{Captures, NoExpand, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::{PolicyConfig, ScopeRule};

pub const GUARDRAIL_NAME: &str = "select_only_allow_listed_tables";

const ALIAS_STOP_WORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "outer", "cross", "natural", "on", "using",
    "group", "order", "limit", "having", "window",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Syntax,
    Policy,
    TableNotAllowed,
    ScopeRequired,
    LimitExceeded,
}

impl RejectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Policy => "policy",
            Self::TableNotAllowed => "table_not_allowed",
            Self::ScopeRequired => "scope_required",
            Self::LimitExceeded => "limit_exceeded",
        }
    }
}

/// A rejected query, returned as data so callers can feed the message back to
/// the SQL drafter and retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRejection {
    pub kind: RejectionKind,
    pub message: String,
    pub details: Value,
}

impl QueryRejection {
    fn new(kind: RejectionKind, message: impl Into<String>, violation: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            details: json!({
                "guardrail": GUARDRAIL_NAME,
                "violation": violation,
            }),
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.details
            .pointer("/violation/reason")
            .and_then(Value::as_str)
    }
}

impl Display for QueryRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} violation: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for QueryRejection {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LimitAction {
    Kept { limit: u64 },
    Appended { limit: u64 },
    Clamped { requested: Option<u64>, limit: u64 },
}

impl LimitAction {
    #[must_use]
    pub const fn limit(self) -> u64 {
        match self {
            Self::Kept { limit } | Self::Appended { limit } | Self::Clamped { limit, .. } => limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedQuery {
    pub sql: String,
    pub tables: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub limit: LimitAction,
}

struct ConstructRule {
    reason: &'static str,
    regex: fn() -> &'static Regex,
    applies: fn(&PolicyConfig) -> bool,
    message: fn(&Captures<'_>) -> String,
    detail: fn(&Captures<'_>) -> Value,
}

pub fn validate(raw_sql: &str, policy: &PolicyConfig) -> Result<AcceptedQuery, QueryRejection> {
    check_policy_limits(policy)?;

    let trimmed = raw_sql.trim();
    if trimmed.is_empty() {
        return Err(QueryRejection::new(
            RejectionKind::Syntax,
            "SQL query is empty; provide a single SELECT statement",
            json!({"reason": "empty_statement"}),
        ));
    }

    let separators = trimmed.matches(';').count();
    if separators > 1 || (separators == 1 && !trimmed.ends_with(';')) {
        return Err(QueryRejection::new(
            RejectionKind::Syntax,
            "Multi-statement SQL is not allowed; submit exactly one SELECT statement",
            json!({"reason": "multi_statement", "separator_count": separators}),
        ));
    }
    let query = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    if !leading_select_regex().is_match(query) {
        return Err(QueryRejection::new(
            RejectionKind::Syntax,
            "Only SELECT statements are allowed",
            json!({"reason": "unsupported_statement", "leading_keyword": leading_keyword(query)}),
        ));
    }

    for rule in construct_rule_catalog() {
        if !(rule.applies)(policy) {
            continue;
        }
        if let Some(captures) = (rule.regex)().captures(query) {
            let mut violation = json!({"reason": rule.reason});
            if let (Some(target), Value::Object(extra)) =
                (violation.as_object_mut(), (rule.detail)(&captures))
            {
                target.extend(extra);
            }
            return Err(QueryRejection::new(
                RejectionKind::Policy,
                (rule.message)(&captures),
                violation,
            ));
        }
    }

    let (tables, aliases) = extract_tables(query);
    if tables.is_empty() {
        return Err(QueryRejection::new(
            RejectionKind::Syntax,
            "Could not identify any table reference after FROM/JOIN",
            json!({"reason": "no_table_reference"}),
        ));
    }

    let disallowed = tables
        .iter()
        .filter(|table| !policy.is_table_allowed(table))
        .cloned()
        .collect::<Vec<_>>();
    if !disallowed.is_empty() {
        return Err(QueryRejection::new(
            RejectionKind::TableNotAllowed,
            format!("Access to table(s) not allowed: {}", disallowed.join(", ")),
            json!({"reason": "table_not_allowed", "tables": disallowed}),
        ));
    }

    for table in &tables {
        if let Some(rule) = policy.scope_rule_for(table) {
            check_scope(query, table, rule)?;
        }
    }

    let (sql, limit) = apply_limit(query, policy)?;

    Ok(AcceptedQuery {
        sql,
        tables: tables.into_iter().collect(),
        aliases,
        limit,
    })
}

fn check_policy_limits(policy: &PolicyConfig) -> Result<(), QueryRejection> {
    if policy.max_limit == 0 || policy.default_limit > policy.max_limit {
        return Err(QueryRejection::new(
            RejectionKind::LimitExceeded,
            format!(
                "Policy default limit {} exceeds maximum limit {}",
                policy.default_limit, policy.max_limit
            ),
            json!({
                "reason": "inconsistent_policy_limits",
                "default_limit": policy.default_limit,
                "max_limit": policy.max_limit,
            }),
        ));
    }
    Ok(())
}

fn leading_keyword(query: &str) -> String {
    query
        .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .find(|token| !token.is_empty())
        .unwrap_or("unknown")
        .to_ascii_lowercase()
}

/// Extracts referenced tables (quotes stripped, lower-cased) and an
/// alias → table map from every `FROM`/`JOIN` clause.
#[must_use]
pub fn extract_tables(query: &str) -> (BTreeSet<String>, BTreeMap<String, String>) {
    let mut tables = BTreeSet::new();
    let mut aliases = BTreeMap::new();

    for regex in [from_table_regex(), join_table_regex()] {
        for captures in regex.captures_iter(query) {
            let table = normalize_identifier(&captures[1]);
            if let Some(alias) = captures.get(2) {
                let alias = alias.as_str().to_ascii_lowercase();
                if !ALIAS_STOP_WORDS.contains(&alias.as_str()) {
                    aliases.insert(alias, table.clone());
                }
            }
            tables.insert(table);
        }
    }

    (tables, aliases)
}

fn normalize_identifier(raw: &str) -> String {
    raw.trim_start_matches(['`', '"', '['])
        .trim_end_matches(['`', '"', ']'])
        .to_lowercase()
}

fn check_scope(query: &str, table: &str, rule: &ScopeRule) -> Result<(), QueryRejection> {
    let column = regex::escape(&rule.column);
    let parameter = regex::escape(&rule.parameter);
    let compile = |pattern: String| {
        Regex::new(&pattern).map_err(|error| {
            QueryRejection::new(
                RejectionKind::Policy,
                format!("Scope rule for table {table} is invalid"),
                json!({"reason": "invalid_scope_rule", "error": error.to_string()}),
            )
        })
    };

    let numeric = compile(format!(r"(?i)\b(?:\w+\.)?{column}\s*=\s*\d+\b"))?;
    let in_list = compile(format!(r"(?i)\b(?:\w+\.)?{column}\s+IN\s*\("))?;
    if numeric.is_match(query) || in_list.is_match(query) {
        return Err(QueryRejection::new(
            RejectionKind::ScopeRequired,
            format!(
                "Use the :{} placeholder for {}; literal values are not allowed",
                rule.parameter, rule.column
            ),
            json!({
                "reason": "scope_bypass",
                "table": table,
                "column": rule.column,
                "parameter": rule.parameter,
            }),
        ));
    }

    let placeholder = compile(format!(r"(?i)\b(?:\w+\.)?{column}\s*=\s*:{parameter}\b"))?;
    if !placeholder.is_match(query) {
        return Err(QueryRejection::new(
            RejectionKind::ScopeRequired,
            format!(
                "Access to table {table} requires the condition {} = :{}",
                rule.column, rule.parameter
            ),
            json!({
                "reason": "scope_missing",
                "table": table,
                "column": rule.column,
                "parameter": rule.parameter,
            }),
        ));
    }

    Ok(())
}

fn apply_limit(
    query: &str,
    policy: &PolicyConfig,
) -> Result<(String, LimitAction), QueryRejection> {
    let Some(captures) = trailing_limit_regex().captures(query) else {
        if has_top_level_limit(query) {
            return Err(QueryRejection::new(
                RejectionKind::Syntax,
                "LIMIT must be the last clause of the query",
                json!({"reason": "misplaced_limit"}),
            ));
        }
        return Ok((
            format!("{query} LIMIT {}", policy.default_limit),
            LimitAction::Appended {
                limit: policy.default_limit,
            },
        ));
    };

    let requested = captures[1].parse::<u64>().ok();
    match requested {
        Some(limit) if limit <= policy.max_limit => {
            Ok((query.to_string(), LimitAction::Kept { limit }))
        }
        _ => {
            let offset = captures.get(2).map_or("", |offset| offset.as_str());
            let replacement = format!("LIMIT {}{offset}", policy.max_limit);
            let rewritten = trailing_limit_regex()
                .replace(query, NoExpand(&replacement))
                .into_owned();
            Ok((
                rewritten,
                LimitAction::Clamped {
                    requested,
                    limit: policy.max_limit,
                },
            ))
        }
    }
}

/// A `LIMIT` outside parentheses and string literals that is not the final
/// clause. Appending another one would produce invalid SQL.
fn has_top_level_limit(query: &str) -> bool {
    let mut depth = 0usize;
    let mut quoted = false;
    let top_level = query
        .chars()
        .map(|ch| match ch {
            '\'' => {
                quoted = !quoted;
                ' '
            }
            _ if quoted => ' ',
            '(' => {
                depth += 1;
                ' '
            }
            ')' => {
                depth = depth.saturating_sub(1);
                ' '
            }
            _ if depth > 0 => ' ',
            _ => ch,
        })
        .collect::<String>();
    limit_keyword_regex().is_match(&top_level)
}

fn construct_rule_catalog() -> &'static [ConstructRule] {
    static CATALOG: OnceLock<Vec<ConstructRule>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            ConstructRule {
                reason: "mutating_statement",
                regex: mutating_keyword_regex,
                applies: always,
                message: |captures| {
                    format!(
                        "DML/DDL keyword `{}` is not allowed",
                        captures[1].to_ascii_lowercase()
                    )
                },
                detail: |captures| json!({"detected_keyword": captures[1].to_ascii_lowercase()}),
            },
            ConstructRule {
                reason: "comment_or_separator",
                regex: comment_marker_regex,
                applies: always,
                message: |_| "SQL comments and embedded statement separators are not allowed".to_string(),
                detail: |captures| json!({"marker": captures[1].trim()}),
            },
            ConstructRule {
                reason: "compound_query",
                regex: compound_query_regex,
                applies: always,
                message: |_| "WITH (CTE), UNION, INTERSECT and EXCEPT are not allowed".to_string(),
                detail: |captures| {
                    json!({"construct": captures[1].split_whitespace().next().unwrap_or_default().to_ascii_lowercase()})
                },
            },
            ConstructRule {
                reason: "subquery",
                regex: subquery_regex,
                applies: |policy| !policy.allow_subqueries,
                message: |_| "Subqueries are not allowed".to_string(),
                detail: |_| json!({}),
            },
        ]
    })
}

fn always(_policy: &PolicyConfig) -> bool {
    true
}

fn leading_select_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)^SELECT\b").expect("leading select regex should compile"))
}

fn mutating_keyword_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(INSERT|UPDATE|DELETE|ALTER|DROP|CREATE|REPLACE|TRUNCATE|GRANT|REVOKE)\b")
            .expect("mutating keyword regex should compile")
    })
}

fn comment_marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(--|#|/\*|\*/|;\s*\w)").expect("comment marker regex should compile")
    })
}

fn compound_query_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(WITH\s+\w+\s+AS|UNION|INTERSECT|EXCEPT)\b")
            .expect("compound query regex should compile")
    })
}

fn subquery_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)\(\s*SELECT\b").expect("subquery regex should compile"))
}

fn from_table_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\bFROM\s+([`"\[]?\w+[`"\]]?)(?:\s+(?:AS\s+)?(\w+))?"#)
            .expect("from table regex should compile")
    })
}

fn join_table_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\bJOIN\s+([`"\[]?\w+[`"\]]?)(?:\s+(?:AS\s+)?(\w+))?"#)
            .expect("join table regex should compile")
    })
}

fn trailing_limit_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)\bLIMIT\s+(\d+)(?:\s*,\s*\d+|(\s+OFFSET\s+\d+))?\s*;?\s*$")
            .expect("trailing limit regex should compile")
    })
}

fn limit_keyword_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)\bLIMIT\b").expect("limit keyword regex should compile"))
}
