//! Smoke tests -- verify the binary runs and key subcommands load.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("incidentd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains(
            "Automated incident-response orchestrator",
        ));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("incidentd")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("incidentd"));
}

#[test]
fn test_serve_subcommand_exists() {
    Command::cargo_bin("incidentd")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success();
}

#[test]
fn test_stats_subcommand_exists() {
    Command::cargo_bin("incidentd")
        .unwrap()
        .args(["stats", "--help"])
        .assert()
        .success();
}
