use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use httptest::matchers::request;
use httptest::responders::status_code;
use httptest::{Expectation, Server};
use predicates::str::contains;
use tempfile::tempdir;

const HEADER: &str = "Timestamp,City,\"State, Region or Province\",Country,Organization Name ( Optional: Add if you want displayed )\n";

fn registry_sync_cmd(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("registry-sync"));
    cmd.current_dir(data_dir)
        .env("RUST_LOG", "debug")
        .env("HISTORY_ENABLED", "false")
        .env_remove("RADARIO_API_KEY");
    cmd
}

#[test]
fn json_report_is_the_only_thing_on_stdout() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/export"))
            .respond_with(status_code(200).body(HEADER)),
    );
    let dir = tempdir().expect("data dir");

    let output = registry_sync_cmd(dir.path())
        .args(["--sheet-url", &server.url("/export").to_string()])
        .arg("--data-dir")
        .arg(dir.path())
        .args(["--dry-run", "--format", "json"])
        .output()
        .expect("run registry-sync");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON report");
    assert_eq!(report["remote_rows"], 0);
    assert_eq!(report["dry_run"], true);
    assert!(String::from_utf8_lossy(&output.stderr).contains("fetched registry sheet"));
}

#[test]
fn failed_run_exits_non_zero_with_logs_on_stderr() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/export"))
            .respond_with(status_code(500)),
    );
    let dir = tempdir().expect("data dir");

    registry_sync_cmd(dir.path())
        .args(["--sheet-url", &server.url("/export").to_string()])
        .arg("--data-dir")
        .arg(dir.path())
        .args(["--format", "json"])
        .assert()
        .failure()
        .stdout("")
        .stderr(contains("registry sync failed"));
}
