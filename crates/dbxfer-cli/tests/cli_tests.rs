//! CLI integration tests for dbxfer.
//!
//! These tests verify command-line argument parsing, help output,
//! command results and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Get a command for the dbxfer binary.
fn cmd() -> Command {
    Command::cargo_bin("dbxfer").unwrap()
}

const MISC_MODEL: &str = r#"
name: misc
tables:
  - name: misc
    columns:
      - name: id
        type: integer
        is_primary_key: true
        is_nullable: false
      - name: parent
        type: integer
    foreign_keys:
      - foreign_table: misc
        references:
          - local: parent
            foreign: id
"#;

const HARD_CYCLE_MODEL: &str = r#"
name: hard
tables:
  - name: a
    columns:
      - { name: id, type: integer, is_primary_key: true, is_nullable: false }
      - { name: b_id, type: integer, is_nullable: false }
    foreign_keys:
      - foreign_table: b
        references: [{ local: b_id, foreign: id }]
  - name: b
    columns:
      - { name: id, type: integer, is_primary_key: true, is_nullable: false }
      - { name: a_id, type: integer, is_nullable: false }
    foreign_keys:
      - foreign_table: a
        references: [{ local: a_id, foreign: id }]
"#;

fn temp_file(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("table-order"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_normalize_subcommand_help() {
    cmd()
        .args(["normalize", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--model"))
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dbxfer"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: warn]"));
}

#[test]
fn test_unknown_log_format_is_config_error() {
    let model = temp_file(MISC_MODEL, ".yaml");
    cmd()
        .args(["--log-format", "xml", "table-order", "--model"])
        .arg(model.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown log format"));
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_missing_subcommand() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_model_file() {
    cmd()
        .args(["table-order", "--model", "/nonexistent/model.yaml"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_model_yaml() {
    let model = temp_file("tables: [this is not a table", ".yaml");
    cmd()
        .args(["table-order", "--model"])
        .arg(model.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("YAML error"));
}

#[test]
fn test_invalid_session_config() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file("<data/>", ".xml");
    let config = temp_file("encoding: no-such-charset\n", ".yaml");
    cmd()
        .arg("--config")
        .arg(config.path())
        .args(["plan", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_malformed_transfer_file() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file("<data><misc id=\"1\"></data>", ".xml");
    cmd()
        .args(["plan", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .assert()
        .code(2);
}

#[test]
fn test_hard_cycle_exit_code() {
    let model = temp_file(HARD_CYCLE_MODEL, ".yaml");
    let input = temp_file(r#"<data><a id="1" b_id="1"/><b id="1" a_id="1"/></data>"#, ".xml");
    cmd()
        .args(["check", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Cyclic constraint violation between tables [a, b]"));
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_table_order_marks_cycles() {
    let model = temp_file(MISC_MODEL, ".yaml");
    cmd()
        .args(["table-order", "--model"])
        .arg(model.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1. misc (cyclic)"));
}

#[test]
fn test_table_order_json() {
    let model = temp_file(HARD_CYCLE_MODEL, ".yaml");
    let output = cmd()
        .args(["--output-json", "table-order", "--model"])
        .arg(model.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let groups: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(groups[0]["tables"], serde_json::json!(["a", "b"]));
    assert_eq!(groups[0]["cyclic"], serde_json::json!(true));
}

#[test]
fn test_plan_reorders_forward_references() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file(
        r#"<data><misc id="2" parent="4"/><misc id="4" parent="1"/><misc id="1"/></data>"#,
        ".xml",
    );
    let output = cmd()
        .args(["--output-json", "plan", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        report["order"],
        serde_json::json!(["misc(id=1)", "misc(id=4)", "misc(id=2)"])
    );
    assert_eq!(report["fixups"], serde_json::json!([]));
}

#[test]
fn test_plan_lists_deferred_references() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file(r#"<data><misc id="1" parent="1"/></data>"#, ".xml");
    cmd()
        .args(["plan", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 deferred references"))
        .stdout(predicate::str::contains("misc(id=1) [parent] -> misc(id=1)"));
}

#[test]
fn test_normalize_to_file() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file(
        r#"<dump><table table-name="misc"><id>7</id></table></dump>"#,
        ".xml",
    );
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("normalized.xml");
    cmd()
        .args(["normalize", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains(r#"<misc id="7"/>"#), "{written}");
}

#[test]
fn test_check_loads_self_reference() {
    let model = temp_file(MISC_MODEL, ".yaml");
    let input = temp_file(
        r#"<data><misc id="1" parent="1"/><misc id="2" parent="1"/></data>"#,
        ".xml",
    );
    let output = cmd()
        .args(["--output-json", "check", "--model"])
        .arg(model.path())
        .arg("--input")
        .arg(input.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["load"]["rows_inserted"], serde_json::json!(2));
    assert_eq!(result["load"]["fixups_issued"], serde_json::json!(1));
}
