//! CLI command contract tests.
//!
//! Validates exit codes and output for the `inspect` and `mint`
//! helpers, plus the `run` command's failure paths. The happy `run`
//! path that launches a real browser is exercised manually, not here.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn xsprobe() -> Command {
    Command::cargo_bin("xsprobe").expect("binary builds")
}

fn write_identities(dir: &TempDir) -> String {
    let path = dir.path().join("identities.json");
    std::fs::write(
        &path,
        r#"[
            {"user_id":"AB12CD34EF","username":"mallory","role":"member"},
            {"user_id":"SYS0000001","username":"auditor","role":"verifier"}
        ]"#,
    )
    .expect("write identities");
    path.to_string_lossy().to_string()
}

#[test]
fn no_subcommand_prints_usage() {
    xsprobe()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn inspect_benign_fragment_exits_zero() {
    xsprobe()
        .args(["inspect", "<b>thanks for the transfer!</b>"])
        .assert()
        .success()
        .stdout(predicate::str::contains("benign"));
}

#[test]
fn inspect_suspicious_fragment_exits_one() {
    xsprobe()
        .args(["inspect", "<script>document.location='//evil'</script>"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("suspicious"));
}

#[test]
fn inspect_reads_stdin_when_no_argument() {
    xsprobe()
        .arg("inspect")
        .write_stdin("<img src=x onerror=alert(1)>")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("suspicious"));
}

#[test]
fn mint_prints_a_three_segment_token() {
    xsprobe()
        .args([
            "mint",
            "--user-id",
            "AB12CD34EF",
            "--username",
            "mallory",
            "--secret",
            "s3cret",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\n$").unwrap());
}

#[test]
fn mint_requires_a_secret() {
    xsprobe()
        .args(["mint", "--user-id", "AB12CD34EF", "--username", "mallory"])
        .env_remove("XSPROBE_ASSERTION_SECRET")
        .assert()
        .failure();
}

#[test]
fn run_rejects_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let identities = write_identities(&dir);
    xsprobe()
        .args([
            "run",
            "--config",
            "/nonexistent/xsprobe.toml",
            "--identities",
            &identities,
            "--secret",
            "s3cret",
        ])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading config"));
}

#[test]
fn run_rejects_invalid_config_values() {
    let dir = TempDir::new().unwrap();
    let identities = write_identities(&dir);
    let config = dir.path().join("xsprobe.toml");
    std::fs::write(&config, "[pool]\nmax_concurrency = 0\n").unwrap();
    xsprobe()
        .args([
            "run",
            "--config",
            &config.to_string_lossy(),
            "--identities",
            &identities,
            "--secret",
            "s3cret",
        ])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrency"));
}

#[test]
fn run_rejects_missing_identities_file() {
    xsprobe()
        .args([
            "run",
            "--identities",
            "/nonexistent/identities.json",
            "--secret",
            "s3cret",
        ])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("identities"));
}

#[test]
fn run_requires_a_secret() {
    let dir = TempDir::new().unwrap();
    let identities = write_identities(&dir);
    xsprobe()
        .args(["run", "--identities", &identities])
        .env_remove("XSPROBE_ASSERTION_SECRET")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("signing secret"));
}
