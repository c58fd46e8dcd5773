use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use serde_json::{Value, json};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn write_campaign_db(path: &Path) {
    let connection = Connection::open(path).expect("sqlite db should be creatable");
    connection
        .execute_batch(
            "CREATE TABLE campaigns (service_id INTEGER, campaign_name TEXT, cost REAL);
             INSERT INTO campaigns VALUES (3, 'EC_Search', 100.0), (3, 'EC_Display', 300.0);",
        )
        .expect("campaign fixtures should insert");
}

fn envelope_line(stdout: &[u8]) -> Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("stdout should contain a JSON envelope line");
    serde_json::from_str(line).expect("envelope line should be JSON")
}

#[test]
fn missing_required_args_exits_with_usage_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .arg("check")
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn accepted_query_exits_with_success_code() {
    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["check", "SELECT campaign_name FROM campaigns"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("SELECT campaign_name FROM campaigns LIMIT 100"),
        "unexpected stdout: {stdout}"
    );
}

#[test]
fn rejected_query_exits_with_validation_code_and_error_envelope() {
    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["check", "SELECT * FROM users", "--json"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_VALIDATION_FAILURE));
    let envelope = envelope_line(&output.stdout);
    assert_eq!(envelope["ok"], json!(false));
    assert_eq!(envelope["command"], json!("sql.check"));
    assert_eq!(envelope["error"]["code"], json!("sql_table_not_allowed"));
}

#[test]
fn inconsistent_limit_overrides_exit_with_validation_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args([
            "--default-limit",
            "500",
            "--max-limit",
            "100",
            "check",
            "SELECT * FROM ads",
        ])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_VALIDATION_FAILURE));
}

#[test]
fn missing_database_exits_with_runtime_code() {
    let temp = unique_temp_dir("adsight-exit-missing-db");

    let status = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["run", "SELECT campaign_name FROM campaigns", "--question", "q"])
        .arg("--db")
        .arg(temp.join("absent.sqlite"))
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}

#[test]
fn unreadable_policy_file_exits_with_runtime_code() {
    let temp = unique_temp_dir("adsight-exit-policy");
    let policy = temp.join("policy.json");
    std::fs::write(&policy, "{\"default_limit\": 0}").expect("policy should be writable");

    let status = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .arg("--policy")
        .arg(&policy)
        .args(["check", "SELECT * FROM ads"])
        .status()
        .expect("command should execute");

    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}

#[test]
fn scoped_run_emits_evidence_envelope() {
    let temp = unique_temp_dir("adsight-exit-run");
    let db = temp.join("ads.sqlite");
    write_campaign_db(&db);
    let policy = temp.join("policy.json");
    std::fs::write(
        &policy,
        r#"{"scope_rules": {"campaigns": {"column": "service_id", "parameter": "service_id"}}}"#,
    )
    .expect("policy should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .arg("--policy")
        .arg(&policy)
        .args([
            "run",
            "SELECT campaign_name, cost FROM campaigns WHERE service_id = :service_id",
            "--question",
            "Which campaign spends most?",
            "--param",
            "service_id=3",
            "--json",
        ])
        .arg("--db")
        .arg(&db)
        .output()
        .expect("command should execute");

    assert_eq!(
        output.status.code(),
        Some(EXIT_SUCCESS),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let envelope = envelope_line(&output.stdout);
    assert_eq!(envelope["command"], json!("query.run"));
    assert_eq!(envelope["meta"]["row_count"], json!(2));
    assert_eq!(envelope["data"]["rankings"][0]["name"], json!("EC_Display"));
}

#[test]
fn evidence_from_file_exits_with_success_code() {
    let temp = unique_temp_dir("adsight-exit-evidence");
    let input = temp.join("rows.txt");
    std::fs::write(
        &input,
        "rows: 2\n[{\"name\":\"EC_Search\",\"cost\":100},{\"name\":\"EC_Display\",\"cost\":300}]",
    )
    .expect("payload should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["evidence", "--question", "q", "--sql", "SELECT 1"])
        .arg("--input")
        .arg(&input)
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("## Question"), "unexpected stdout: {stdout}");
    assert!(stdout.contains("EC_Display"), "unexpected stdout: {stdout}");
}

#[test]
fn schema_command_prints_json_schema() {
    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["schema", "--compact"])
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let schema = envelope_line(&output.stdout);
    assert!(schema["properties"]["period_comparison"].is_object());
}

#[test]
fn malformed_payload_builds_empty_evidence_with_warning() {
    let temp = unique_temp_dir("adsight-exit-malformed");
    let input = temp.join("rows.txt");
    std::fs::write(&input, "upstream error: connection reset").expect("payload should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_adsight"))
        .args(["evidence", "--question", "q", "--sql", "SELECT 1", "--json"])
        .arg("--input")
        .arg(&input)
        .output()
        .expect("command should execute");

    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let envelope = envelope_line(&output.stdout);
    assert_eq!(envelope["ok"], json!(true));
    assert_eq!(envelope["meta"]["row_count"], json!(0));
    assert_eq!(envelope["warnings"][0]["code"], json!("payload_unreadable"));
    assert_eq!(envelope["data"]["aggregations"], json!([]));
}
