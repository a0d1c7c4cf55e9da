//! Integration tests for the `fleetkey` CLI binary.
//!
//! Everything here runs against a throwaway working tree; no vault,
//! firmware tool, or device is ever reached.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const EXPOSED_OTA: &str = "5929ccc1f08289c79aca50ebe0a9b7eb";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fleetkey` binary with env isolation.
///
/// Clears `FLEETKEY_*` and `OP_ACCOUNT`, points config directories at a
/// nonexistent path, and names a vault program that cannot exist.
fn fleetkey_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetkey");
    cmd.env("HOME", "/tmp/fleetkey-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fleetkey-cli-test-nonexistent")
        .env_remove("OP_ACCOUNT")
        .env_remove("NO_COLOR")
        .env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("FLEETKEY_") {
            cmd.env_remove(key);
        }
    }
    cmd.env("FLEETKEY_VAULT__PROGRAM", "/nonexistent/fleetkey-test-op")
        .args(["--color", "never"]);
    cmd
}

/// Same as [`fleetkey_cmd`], run inside `dir`.
fn fleetkey_in(dir: &Path) -> assert_cmd::Command {
    let mut cmd = fleetkey_cmd();
    cmd.arg("--dir").arg(dir);
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn secrets(ota: &str) -> String {
    format!(
        "api_key: \"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\"\n\
         ota_password: \"{ota}\"\n\
         fallback_password: \"Abcdefghijk1\"\n\
         wifi_ssid: \"HomeNet\"\n\
         wifi_password: \"supersecret1\"\n"
    )
}

/// A working tree with two devices and a valid secrets file.
fn fleet() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "secrets.yaml", &secrets("0123456789abcdef0123456789abcdef"));
    write(dir.path(), "attic.yaml", "esphome:\n  name: attic\napi:\n  encryption:\n    key: !secret api_key\n");
    write(dir.path(), "porch-minimal.yaml", "esphome:\n  name: porch\n");
    write(dir.path(), "porch-full.yaml", "esphome:\n  name: porch\nota:\n  password: !secret ota_password\n");
    dir
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fleetkey_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fleetkey_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("ESPHome")
            .and(predicate::str::contains("rotate"))
            .and(predicate::str::contains("validate-secrets"))
            .and(predicate::str::contains("track-rotation")),
    );
}

#[test]
fn test_version_flag() {
    fleetkey_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetkey"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    fleetkey_cmd().arg("frobnicate").assert().code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    fleetkey_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetkey"));
}

#[test]
fn test_completions_zsh() {
    fleetkey_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── generate ────────────────────────────────────────────────────────

#[test]
fn test_generate_ota_password_is_32_hex() {
    let output = fleetkey_cmd()
        .args(["generate", "ota-password"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value = String::from_utf8(output.stdout).unwrap();
    let value = value.trim();
    assert_eq!(value.len(), 32, "got {value:?}");
    assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_generate_api_key_is_padded_base64() {
    let output = fleetkey_cmd().args(["generate", "api-key"]).output().unwrap();
    assert!(output.status.success());
    let value = String::from_utf8(output.stdout).unwrap();
    let value = value.trim();
    assert_eq!(value.len(), 44, "got {value:?}");
    assert!(value.ends_with('='));
}

// ── devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_lists_discovered_names() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .args(["-o", "plain", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::diff("attic\nporch\n"));
}

#[test]
fn test_devices_table_shows_variants() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .arg("devices")
        .assert()
        .success()
        .stdout(predicate::str::contains("porch").and(predicate::str::contains("attic")));
}

#[test]
fn test_missing_dir_is_rejected() {
    let output = fleetkey_cmd()
        .args(["--dir", "/nonexistent/fleetkey-tree", "devices"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("--dir"));
}

// ── scan ────────────────────────────────────────────────────────────

#[test]
fn test_scan_clean_tree_succeeds() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .arg("scan")
        .assert()
        .success()
        .stderr(predicate::str::contains("No exposed credentials"));
}

#[test]
fn test_scan_ignores_secrets_file() {
    let dir = fleet();
    write(dir.path(), "secrets.yaml", &secrets(EXPOSED_OTA));
    fleetkey_in(dir.path()).arg("scan").assert().success();
}

#[test]
fn test_scan_file_with_exposed_value_fails() {
    let dir = fleet();
    write(
        dir.path(),
        "garage.yaml",
        &format!("ota:\n  password: \"{EXPOSED_OTA}\"\n"),
    );
    let output = fleetkey_in(dir.path())
        .args(["scan", "garage.yaml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let text = combined_output(&output);
    assert!(text.contains("garage.yaml"), "{text}");
    assert!(text.contains("Exposed credentials found"), "{text}");
}

// ── validate-secrets ────────────────────────────────────────────────

#[test]
fn test_validate_secrets_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = fleetkey_in(dir.path())
        .arg("validate-secrets")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("secrets.yaml"));
}

#[test]
fn test_validate_secrets_passes_without_vault() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .arg("validate-secrets")
        .assert()
        .success()
        .stderr(
            predicate::str::contains("not available")
                .and(predicate::str::contains("All validations passed")),
        );
}

#[test]
fn test_validate_secrets_rejects_exposed_value() {
    let dir = fleet();
    write(dir.path(), "secrets.yaml", &secrets(EXPOSED_OTA));
    let output = fleetkey_in(dir.path())
        .arg("validate-secrets")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("known exposed"));
}

#[test]
fn test_validate_secrets_transition_tolerates_exposed_value() {
    let dir = fleet();
    write(dir.path(), "secrets.yaml", &secrets(EXPOSED_OTA));
    fleetkey_in(dir.path())
        .args(["validate-secrets", "--transition"])
        .assert()
        .success()
        .stderr(predicate::str::contains("allowed in transition mode"));
}

#[test]
fn test_validate_secrets_reports_missing_wifi() {
    let dir = fleet();
    let trimmed: String = secrets("0123456789abcdef0123456789abcdef")
        .lines()
        .filter(|l| !l.starts_with("wifi_"))
        .map(|l| format!("{l}\n"))
        .collect();
    write(dir.path(), "secrets.yaml", &trimmed);
    let output = fleetkey_in(dir.path())
        .arg("validate-secrets")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("WiFi SSID not found"));
}

// ── backup ──────────────────────────────────────────────────────────

#[test]
fn test_backup_create_list_verify() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["-o", "plain", "backup", "create", "--label", "pre-rotation"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let id = String::from_utf8(output.stdout).unwrap().trim().to_owned();
    assert!(id.starts_with("backup_pre-rotation_"), "got {id:?}");

    fleetkey_in(dir.path())
        .args(["-o", "plain", "backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    fleetkey_in(dir.path())
        .args(["backup", "verify", &id])
        .assert()
        .success()
        .stderr(predicate::str::contains("verified"));
}

#[test]
fn test_backup_verify_unknown_id_fails() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["backup", "verify", "backup_19700101_000000"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("not found"));
}

#[test]
fn test_backup_restore_refuses_to_overwrite_without_force() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["-o", "plain", "backup", "create"])
        .output()
        .unwrap();
    let id = String::from_utf8(output.stdout).unwrap().trim().to_owned();

    write(dir.path(), "secrets.yaml", "changed: \"yes\"\n");
    let output = fleetkey_in(dir.path())
        .args(["backup", "restore", &id])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("use --force"));
    assert_eq!(
        fs::read_to_string(dir.path().join("secrets.yaml")).unwrap(),
        "changed: \"yes\"\n"
    );
}

#[test]
fn test_backup_restore_force_requires_confirmation() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["backup", "restore", "whatever", "--force"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("requires confirmation"));
}

// ── track-rotation ──────────────────────────────────────────────────

#[test]
fn test_track_due_without_history() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .args(["track-rotation", "due"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rotation due: true"));
}

#[test]
fn test_track_add_then_stats() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .args([
            "track-rotation",
            "add",
            "--type",
            "manual",
            "--reason",
            "contractor left",
            "--credentials",
            "api-key,ota-password",
        ])
        .assert()
        .success();
    assert!(dir.path().join("CREDENTIAL_ROTATION_LOG.json").is_file());

    let output = fleetkey_in(dir.path())
        .args(["-o", "json", "track-rotation", "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total_rotations"], 1);
    assert_eq!(stats["rotations_by_type"]["manual"], 1);

    fleetkey_in(dir.path())
        .args(["track-rotation", "due", "--max-age-days", "90"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rotation due: false"));
}

#[test]
fn test_track_add_without_flags_needs_terminal() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["track-rotation", "add"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("--type"));
}

#[test]
fn test_track_mark_without_history_fails() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["track-rotation", "mark", "passed"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("No rotation history"));
}

#[test]
fn test_track_report_writes_markdown() {
    let dir = fleet();
    fleetkey_in(dir.path())
        .args(["track-rotation", "add", "--type", "scheduled", "--reason", "quarterly"])
        .assert()
        .success();
    fleetkey_in(dir.path())
        .args(["track-rotation", "report"])
        .assert()
        .success();
    let report = fs::read_to_string(dir.path().join("CREDENTIAL_ROTATION_LOG.md")).unwrap();
    assert!(report.contains("quarterly"));
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_then_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    fleetkey_in(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("fleetkey.toml"));
    assert!(dir.path().join("fleetkey.toml").is_file());

    let output = fleetkey_in(dir.path())
        .args(["config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("already exists"));
}

#[test]
fn test_config_path_marks_missing_files() {
    let dir = TempDir::new().unwrap();
    fleetkey_in(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetkey.toml").and(predicate::str::contains("(not found)")));
}

#[test]
fn test_config_show_reflects_project_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "fleetkey.toml", "[backup]\nkeep = 7\n");
    fleetkey_in(dir.path())
        .args(["-o", "json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"keep\": 7"));
}

#[test]
fn test_config_explicit_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    fleetkey_in(dir.path())
        .args(["--config", "/nonexistent/fleetkey.toml", "config", "show"])
        .assert()
        .code(1);
}

// ── deploy / rotate ─────────────────────────────────────────────────

#[test]
fn test_deploy_requires_target() {
    let dir = fleet();
    fleetkey_in(dir.path()).arg("deploy").assert().code(2);
}

#[test]
fn test_deploy_unknown_device_fails() {
    let dir = fleet();
    let output = fleetkey_in(dir.path())
        .args(["deploy", "--device", "cellar"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("cellar"));
}

#[test]
fn test_rotate_requires_confirmation_when_not_interactive() {
    let dir = fleet();
    let output = fleetkey_in(dir.path()).arg("rotate").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("requires confirmation"));
}

#[test]
fn test_rotate_stops_on_missing_prerequisites() {
    let dir = fleet();
    write(
        dir.path(),
        "fleetkey.toml",
        "[security]\nrequired_tools = [\"fleetkey-test-missing-tool\"]\n",
    );
    let before = fs::read_to_string(dir.path().join("secrets.yaml")).unwrap();

    let output = fleetkey_in(dir.path())
        .args(["--yes", "rotate"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Rotation failed"));
    assert_eq!(
        fs::read_to_string(dir.path().join("secrets.yaml")).unwrap(),
        before
    );
}
