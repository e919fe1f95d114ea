use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::tempdir;

const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testng-results skipped="1" failed="0" total="3" passed="2">
  <suite name="S">
    <test name="GroupA">
      <class name="pkg.Cls">
        <test-method status="PASS" name="dataTest" duration-ms="1000" started-at="2016-01-01T00:00:00Z" data-provider="dp">
          <params><param index="0"><value><![CDATA[1]]></value></param></params>
        </test-method>
        <test-method status="PASS" name="dataTest" duration-ms="1000" started-at="2016-01-01T00:00:02Z" data-provider="dp">
          <params><param index="0"><value><![CDATA[2]]></value></param></params>
        </test-method>
        <test-method status="SKIP" name="blocked" duration-ms="0" started-at="2016-01-01T00:00:04Z"/>
      </class>
    </test>
  </suite>
</testng-results>
"#;

#[test]
fn test_dry_run_export() {
    let temp_dir = tempdir().unwrap();
    let report_path = temp_dir.path().join("testng-results.xml");
    fs::write(&report_path, REPORT).unwrap();

    Command::cargo_bin("polarion-sync")
        .unwrap()
        .arg("--dry-run")
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("export")
        .arg("--project-id")
        .arg("RHEL6")
        .arg("--result-path")
        .arg(&report_path)
        .arg("--template")
        .arg("tmpl")
        .assert()
        .success()
        .stdout(predicate::str::contains("Export summary"))
        .stdout(predicate::str::contains("S 1"))
        .stdout(predicate::str::contains("Skipped"));
}

#[test]
fn test_export_reads_config_file() {
    let temp_dir = tempdir().unwrap();
    let report_path = temp_dir.path().join("testng-results.xml");
    fs::write(&report_path, REPORT).unwrap();

    let config_path = temp_dir.path().join("polarion-sync.toml");
    fs::write(
        &config_path,
        format!(
            "generate_only = true\n\n[polarion]\nproject_id = \"RHEL6\"\n\n[report]\nresult_path = {:?}\n",
            report_path.display().to_string()
        ),
    )
    .unwrap();

    Command::cargo_bin("polarion-sync")
        .unwrap()
        .arg("--dry-run")
        .arg("-c")
        .arg(&config_path)
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate only"));
}

#[test]
fn test_validate_reports_missing_settings() {
    let temp_dir = tempdir().unwrap();

    Command::cargo_bin("polarion-sync")
        .unwrap()
        .arg("-c")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("polarion.project_id must be set"));
}

#[test]
fn test_export_without_connector_fails() {
    let temp_dir = tempdir().unwrap();
    let report_path = temp_dir.path().join("testng-results.xml");
    fs::write(&report_path, REPORT).unwrap();

    Command::cargo_bin("polarion-sync")
        .unwrap()
        .arg("-c")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("export")
        .arg("--project-id")
        .arg("RHEL6")
        .arg("--result-path")
        .arg(&report_path)
        .arg("--template")
        .arg("tmpl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("connector"));
}

#[test]
fn test_query_testcase_dry_run() {
    let temp_dir = tempdir().unwrap();

    Command::cargo_bin("polarion-sync")
        .unwrap()
        .arg("--dry-run")
        .arg("-c")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("query-testcase")
        .arg("title:\"pkg.Cls*\"")
        .assert()
        .success()
        .stdout(predicate::str::contains("No test cases match"));
}
