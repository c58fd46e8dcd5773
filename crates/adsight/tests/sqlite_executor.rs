use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use adsight::config::{PolicyConfig, ScopeRule};
use adsight::evidence::build_evidence;
use adsight::guardrail::validate;
use adsight::models::CellValue;
use adsight::sqlite::{QueryParam, execute_read_only, open_read_only};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

fn seed_campaigns(path: &Path) {
    let connection = Connection::open(path).expect("sqlite db should be creatable");
    connection
        .execute_batch(
            "CREATE TABLE campaigns (
                id INTEGER PRIMARY KEY,
                service_id INTEGER NOT NULL,
                campaign_name TEXT NOT NULL,
                cost REAL,
                clicks INTEGER
            );
            INSERT INTO campaigns (service_id, campaign_name, cost, clicks) VALUES
                (1, 'EC_Search', 100.0, 10),
                (1, 'EC_Display', 300.0, 30),
                (1, 'Brand_Search', 50.0, NULL),
                (2, 'Other_Search', 999.0, 99);",
        )
        .expect("campaign fixtures should insert");
}

fn seeded_db(prefix: &str) -> PathBuf {
    let temp = unique_temp_dir(prefix);
    std::fs::create_dir_all(&temp).expect("temp dir should be creatable");
    let path = temp.join("ads.sqlite");
    seed_campaigns(&path);
    path
}

fn scoped_policy() -> PolicyConfig {
    PolicyConfig::default().with_scope_rule("campaigns", ScopeRule::service_scope())
}

#[test]
fn accepted_query_runs_with_bound_scope_parameter() {
    let db = seeded_db("adsight-sqlite-scoped");
    let accepted = validate(
        "SELECT campaign_name, cost, clicks FROM campaigns WHERE service_id = :service_id ORDER BY cost DESC",
        &scoped_policy(),
    )
    .expect("scoped query should pass");
    let params = [QueryParam::new("service_id", SqlValue::Integer(1))];

    let result = execute_read_only(&db, &accepted, &params, 1_000).expect("query should run");

    assert_eq!(result.columns, vec!["campaign_name", "cost", "clicks"]);
    assert_eq!(result.row_count(), 3);
    assert!(!result.truncated);
    assert_eq!(
        result.rows[0].get("campaign_name"),
        Some(&CellValue::text("EC_Display"))
    );
    assert_eq!(result.rows[2].get("clicks"), Some(&CellValue::Null));

    let evidence = build_evidence(&result.rows, "Which campaign spends most?", &accepted.sql);
    assert_eq!(evidence.dimension.as_deref(), Some("campaign_name"));
    assert_eq!(evidence.rankings[0].name, "EC_Display");
}

#[test]
fn rows_beyond_the_cap_are_dropped_and_flagged() {
    let db = seeded_db("adsight-sqlite-cap");
    let accepted =
        validate("SELECT campaign_name FROM campaigns", &PolicyConfig::default()).expect("valid");

    let result = execute_read_only(&db, &accepted, &[], 2).expect("query should run");

    assert_eq!(result.row_count(), 2);
    assert!(result.truncated);
}

#[test]
fn missing_and_unused_parameters_are_errors() {
    let db = seeded_db("adsight-sqlite-params");
    let accepted = validate(
        "SELECT campaign_name FROM campaigns WHERE service_id = :service_id",
        &scoped_policy(),
    )
    .expect("scoped query should pass");

    let err = execute_read_only(&db, &accepted, &[], 10).expect_err("missing param must fail");
    assert!(
        err.to_string().contains("missing value for query parameter :service_id"),
        "unexpected error: {err}"
    );

    let params = [
        QueryParam::new("service_id", SqlValue::Integer(1)),
        QueryParam::new("account_id", SqlValue::Integer(9)),
    ];
    let err = execute_read_only(&db, &accepted, &params, 10).expect_err("unused param must fail");
    assert!(
        err.to_string().contains("does not use parameter :account_id"),
        "unexpected error: {err}"
    );
}

#[test]
fn connections_are_opened_read_only() {
    let db = seeded_db("adsight-sqlite-readonly");
    let connection = open_read_only(&db).expect("db should open");

    let result = connection.execute("DELETE FROM campaigns", []);
    assert!(result.is_err(), "read-only connection must refuse writes");
}

#[test]
fn missing_database_file_is_an_error() {
    let missing = unique_temp_dir("adsight-sqlite-missing").join("absent.sqlite");
    let accepted =
        validate("SELECT campaign_name FROM campaigns", &PolicyConfig::default()).expect("valid");

    let err = execute_read_only(&missing, &accepted, &[], 10).expect_err("missing db must fail");
    assert!(
        err.to_string().contains("does not exist"),
        "unexpected error: {err}"
    );
}
