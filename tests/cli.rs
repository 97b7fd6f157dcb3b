mod common;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::prelude::*;
use predicates::str::contains;

fn tabload(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("tabload").expect("binary exists");
    cmd.current_dir(workspace.path()).env_remove("RUST_LOG");
    cmd
}

fn users_workspace() -> TestWorkspace {
    let workspace = TestWorkspace::new();
    workspace.copy_fixture("USERS_20250101.csv", "data/USERS_20250101.csv");
    workspace
}

#[test]
fn config_init_writes_a_valid_file() {
    let workspace = TestWorkspace::new();
    tabload(&workspace)
        .args(["config", "init", "--output", "conf/tabload.yaml"])
        .assert()
        .success();
    let written = std::fs::read_to_string(workspace.path().join("conf/tabload.yaml")).unwrap();
    assert!(written.contains("batch_size: 1000"));

    tabload(&workspace)
        .args(["config", "validate", "conf/tabload.yaml"])
        .assert()
        .success()
        .stdout(contains("is valid"));

    tabload(&workspace)
        .args(["config", "init", "--output", "conf/tabload.yaml"])
        .assert()
        .failure()
        .stderr(contains("already exists"));
}

#[test]
fn config_validate_lists_problems() {
    let workspace = TestWorkspace::new();
    workspace.write(
        "bad.yaml",
        "import_settings:\n  batch_size: 0\ndata_types:\n  number_precision: 50\n",
    );
    tabload(&workspace)
        .args(["config", "validate", "bad.yaml"])
        .assert()
        .failure()
        .stderr(contains("batch_size"))
        .stderr(contains("number_precision"));
}

#[test]
fn scan_reports_derived_table_names() {
    let workspace = users_workspace();
    workspace.write("data/~$locked.xlsx", "");
    tabload(&workspace)
        .args(["scan", "data", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"table\": \"USERS\""))
        .stdout(contains("locked").not());

    tabload(&workspace)
        .args(["scan", "data", "--keep-date-suffix"])
        .assert()
        .success()
        .stdout(contains("USERS_20250101"));
}

#[test]
fn import_loads_rows_and_writes_report() {
    let workspace = users_workspace();
    tabload(&workspace)
        .args([
            "import",
            "data",
            "--create-tables",
            "--database",
            "users.db",
            "--report",
            "run.json",
        ])
        .assert()
        .success()
        .stdout(contains("Rows:  3 attempted, 3 succeeded, 0 failed"));

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.path().join("run.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["files_succeeded"], 1);
    assert_eq!(report["files"][0]["table"], "USERS");
}

#[test]
fn import_fails_when_table_is_missing() {
    let workspace = users_workspace();
    tabload(&workspace)
        .args(["import", "data", "--database", "users.db"])
        .assert()
        .failure()
        .stderr(contains("failed to import"));
}

#[test]
fn dry_run_with_sql_scripts_leaves_database_alone() {
    let workspace = users_workspace();
    workspace.write(
        "tabload.yaml",
        "output:\n  directory: scripts\ndatabase:\n  path: never.db\n",
    );
    tabload(&workspace)
        .args(["import", "data", "--dry-run", "--create-sql"])
        .assert()
        .success();
    assert!(workspace.path().join("scripts/USERS_insert.sql").exists());
    assert!(!workspace.path().join("never.db").exists());
}

#[test]
fn preview_prints_rows() {
    let workspace = users_workspace();
    tabload(&workspace)
        .args(["preview", "data/USERS_20250101.csv", "--rows", "2"])
        .assert()
        .success()
        .stdout(contains("Alice"))
        .stdout(contains("Carol").not());
}

#[test]
fn infer_prints_definition_and_ddl() {
    let workspace = users_workspace();
    tabload(&workspace)
        .args(["infer", "data/USERS_20250101.csv"])
        .assert()
        .success()
        .stdout(contains("name: USERS"))
        .stdout(contains("number(10,0)"))
        .stdout(contains("CREATE TABLE USERS ("))
        .stdout(contains("CREATE_TIMESTAMP TIMESTAMP(6) DEFAULT SYSTIMESTAMP"));
}

#[test]
fn test_db_pings_configured_database() {
    let workspace = TestWorkspace::new();
    workspace.write("custom.yaml", "database:\n  path: ping.db\n");
    tabload(&workspace)
        .args(["-c", "custom.yaml", "test-db"])
        .assert()
        .success()
        .stdout(contains("Database connection OK"));
}
