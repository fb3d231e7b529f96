//! Integration tests for the `haier` CLI binary.
//!
//! Argument parsing, help output, completions and config handling run
//! without network access; the cloud-facing commands run against a local
//! mock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN: &str = "/oauthserver/account/v1/login";
const FAMILY_LIST: &str = "/api-gw/wisdomfamily/family/v4/family/list";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `haier` binary with env isolation.
///
/// Clears all `HAIER_*` env vars and points home and XDG directories at
/// `home` so tests never touch the user's real configuration.
fn haier_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("haier");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("HAIER_PROFILE")
        .env_remove("HAIER_OUTPUT")
        .env_remove("HAIER_STORAGE_DIR")
        .env_remove("HAIER_USERNAME")
        .env_remove("HAIER_PASSWORD");
    cmd
}

fn isolated() -> (TempDir, assert_cmd::Command) {
    let home = tempfile::tempdir().unwrap();
    let cmd = haier_cmd(home.path());
    (home, cmd)
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn config_file(home: &Path) -> std::path::PathBuf {
    home.join("config").join("haier-iot").join("config.toml")
}

fn write_profile(home: &Path, server_uri: &str) {
    let file = config_file(home);
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    let storage = home.join("store");
    std::fs::write(
        &file,
        format!(
            "default_profile = \"home\"\n\n\
             [profiles.home]\n\
             username = \"13800000000\"\n\
             password = \"secret\"\n\
             account_url = \"{server_uri}\"\n\
             uws_url = \"{server_uri}\"\n\
             storage_dir = \"{}\"\n",
            storage.display()
        ),
    )
    .unwrap();
}

fn ok(data: Value) -> Value {
    json!({ "retCode": "00000", "retInfo": "success", "data": data })
}

async fn mock_cloud() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "tokenInfo": {
                "accountToken": "account-token",
                "expiresIn": 86_400,
                "tokenType": "Bearer",
                "refreshToken": "refresh-token",
                "uhomeAccessToken": "uhome-token",
                "uhomeUserId": "10001",
                "uocUserId": "20002"
            }
        }))))
        .mount(&server)
        .await;
    server
}

/// Run the binary off the runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let (_home, mut cmd) = isolated();
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    let (_home, mut cmd) = isolated();
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("Haier")
            .and(predicate::str::contains("families"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("model"))
            .and(predicate::str::contains("send"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn version_flag() {
    let (_home, mut cmd) = isolated();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("haier"));
}

#[test]
fn completions_for_common_shells() {
    for (shell, marker) in [("bash", "_haier"), ("zsh", "#compdef"), ("fish", "haier")] {
        let (_home, mut cmd) = isolated();
        cmd.args(["completions", shell])
            .assert()
            .success()
            .stdout(predicate::str::contains(marker));
    }
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn invalid_subcommand() {
    let (_home, mut cmd) = isolated();
    let output = cmd.arg("foobar").output().unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn invalid_output_format() {
    let (_home, mut cmd) = isolated();
    let output = cmd.args(["--output", "xml", "families"]).output().unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("possible values"));
}

#[test]
fn send_rejects_malformed_assignment_before_loading_config() {
    let (_home, mut cmd) = isolated();
    cmd.args(["send", "DEV1", "targetTemperature"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NAME=VALUE"));
}

#[test]
fn send_requires_an_assignment() {
    let (_home, mut cmd) = isolated();
    cmd.args(["send", "DEV1"]).assert().failure();
}

#[test]
fn cloud_command_without_config_points_at_init() {
    let (_home, mut cmd) = isolated();
    cmd.arg("families")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn unknown_profile_lists_available_ones() {
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), "http://127.0.0.1:9");
    haier_cmd(home.path())
        .args(["--profile", "office", "families"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("office").and(predicate::str::contains("home")));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn config_path_follows_xdg() {
    let (home, mut cmd) = isolated();
    let expected = config_file(home.path());
    cmd.args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn config_show_without_file_succeeds() {
    let (_home, mut cmd) = isolated();
    cmd.args(["config", "show"]).assert().success();
}

#[test]
fn config_init_writes_profile_and_refuses_to_clobber() {
    let home = tempfile::tempdir().unwrap();

    haier_cmd(home.path())
        .args(["config", "init", "--name", "home", "--username", "13800000000"])
        .args(["--password-env", "HOME_PW"])
        .assert()
        .success();

    let written = std::fs::read_to_string(config_file(home.path())).unwrap();
    assert!(written.contains("13800000000"));
    assert!(written.contains("HOME_PW"));
    assert!(written.contains("default_profile = \"home\""));

    haier_cmd(home.path())
        .args(["config", "init", "--name", "home", "--username", "other"])
        .args(["--password-env", "HOME_PW"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));

    haier_cmd(home.path())
        .args(["config", "init", "--name", "home", "--username", "other", "--force"])
        .write_stdin("")
        .assert()
        .success();
    let written = std::fs::read_to_string(config_file(home.path())).unwrap();
    assert!(written.contains("other"));
}

#[test]
fn config_show_redacts_passwords() {
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), "http://127.0.0.1:9");

    let output = haier_cmd(home.path())
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["profiles"]["home"]["username"], "13800000000");
    assert_eq!(shown["profiles"]["home"]["password"], "********");
}

// ── Against a mock cloud ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn families_as_json() {
    let server = mock_cloud().await;
    Mock::given(method("POST"))
        .and(path(FAMILY_LIST))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "createfamilies": [{ "familyId": "f1", "familyName": "Home" }],
            "joinfamilies": [{ "familyId": "f2", "familyName": "Parents" }]
        }))))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &server.uri());
    let mut cmd = haier_cmd(home.path());
    cmd.args(["-o", "json", "families"]);

    let output = run(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let families: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(families[0]["familyId"], "f1");
    assert_eq!(families[1]["familyName"], "Parents");
}

#[tokio::test(flavor = "multi_thread")]
async fn login_never_prints_tokens() {
    let server = mock_cloud().await;
    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &server.uri());
    let mut cmd = haier_cmd(home.path());
    cmd.args(["-o", "json", "login"]);

    let output = run(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let text = combined_output(&output);
    assert!(text.contains("10001"));
    assert!(!text.contains("uhome-token"));
    assert!(!text.contains("refresh-token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn send_falls_back_to_rest() {
    let server = mock_cloud().await;
    Mock::given(method("POST"))
        .and(path("/stdudse/v1/sendbatchCmd/DEV1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &server.uri());
    let mut cmd = haier_cmd(home.path());
    cmd.args(["-o", "plain", "send", "DEV1", "targetTemperature=26"]);

    let output = run(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "rest");
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_command_exits_nonzero() {
    let server = mock_cloud().await;
    Mock::given(method("POST"))
        .and(path("/stdudse/v1/sendbatchCmd/DEV1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": "C0001",
            "retInfo": "device offline"
        })))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &server.uri());
    let mut cmd = haier_cmd(home.path());
    cmd.args(["send", "DEV1", "targetTemperature=26"]);

    let output = run(cmd).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("C0001"));
}

#[tokio::test(flavor = "multi_thread")]
async fn model_is_cached_across_invocations() {
    let server = mock_cloud().await;
    let model = json!({
        "alarms": [],
        "attributes": [{
            "name": "targetTemperature",
            "readable": true,
            "writable": true,
            "value": "20",
            "valueRange": {
                "type": "STEP",
                "dataStep": { "dataType": "Integer", "step": "1", "minValue": "16", "maxValue": "30" }
            }
        }]
    });
    Mock::given(method("POST"))
        .and(path("/shadow/v1/devdigitalmodels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "retCode": "00000",
            "retInfo": "success",
            "detailInfo": { "DEV1": model.to_string() }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_profile(home.path(), &server.uri());

    for _ in 0..2 {
        let mut cmd = haier_cmd(home.path());
        cmd.args(["-o", "plain", "model", "DEV1"]);
        let output = run(cmd).await;
        assert!(output.status.success(), "{}", combined_output(&output));
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "targetTemperature=20"
        );
    }

    assert!(home.path().join("store").join("digital-models").join("DEV1.json").exists());
    server.verify().await;
}
