//! `devx update` command surface, run as a subprocess.

use assert_cmd::Command;
use chrono::Utc;
use devx::constants::UPDATE_CACHE_FILE;
use devx::upgrade::UpdateCacheData;
use predicates::prelude::*;
use tempfile::TempDir;

/// `devx` with an isolated home and update checks switched off, so no test
/// ever reaches the network.
fn devx(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("devx").unwrap();
    cmd.env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .env("NO_COLOR", "1")
        .env("DEVX_DISABLE_UPDATE_CHECK", "1")
        .env_remove("DEVX_UPDATE_CHANNEL")
        .env_remove("DEVX_UPDATE_CHECK_INTERVAL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_cache(home: &TempDir, latest: &str) {
    let dir = home.path().join(".devx");
    std::fs::create_dir_all(&dir).unwrap();
    let record = UpdateCacheData {
        last_check: Utc::now(),
        current_version: env!("CARGO_PKG_VERSION").to_string(),
        latest_version: latest.to_string(),
        update_available: true,
        release_notes: "- Improvements".to_string(),
        release_url: format!("https://github.com/devx-tools/devx/releases/tag/{latest}"),
        check_interval: "1day".to_string(),
    };
    let json = serde_json::to_vec_pretty(&record).unwrap();
    std::fs::write(dir.join(UPDATE_CACHE_FILE), json).unwrap();
}

#[test]
fn test_help_lists_update() {
    let home = TempDir::new().unwrap();
    devx(&home).arg("--help").assert().success().stdout(predicate::str::contains("update"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    devx(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_check_when_disabled() {
    let home = TempDir::new().unwrap();
    devx(&home)
        .args(["update", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update checks are disabled"));
    assert!(!home.path().join(".devx").join(UPDATE_CACHE_FILE).exists());
}

#[test]
fn test_install_when_disabled() {
    let home = TempDir::new().unwrap();
    devx(&home)
        .args(["update", "install", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
}

#[test]
fn test_status_without_cache() {
    let home = TempDir::new().unwrap();
    devx(&home)
        .args(["update", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version:"))
        .stdout(predicate::str::contains("No recent update check"))
        .stdout(predicate::str::contains("Checks enabled:  no"));
}

#[test]
fn test_status_reads_cache() {
    let home = TempDir::new().unwrap();
    write_cache(&home, "v99.0.0");

    devx(&home)
        .args(["update", "status", "--channel", "beta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel:         beta"))
        .stdout(predicate::str::contains("v99.0.0 (update available)"));
}

#[test]
fn test_clear_cache() {
    let home = TempDir::new().unwrap();
    write_cache(&home, "v99.0.0");
    let cache = home.path().join(".devx").join(UPDATE_CACHE_FILE);
    assert!(cache.exists());

    devx(&home)
        .args(["update", "clear-cache"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update cache cleared"));
    assert!(!cache.exists());

    // clearing twice is fine
    devx(&home).args(["update", "clear-cache"]).assert().success();
}

#[test]
fn test_config_file_interval_is_used() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".devx");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[update]\ncheck_interval = \"12h\"\n").unwrap();

    devx(&home)
        .args(["update", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Check interval:  12h"));
}

#[test]
fn test_malformed_config_fails() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".devx");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[update\nchannel = ").unwrap();

    devx(&home)
        .args(["update", "status"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let home = TempDir::new().unwrap();
    devx(&home).args(["-v", "-q", "update", "status"]).assert().failure();
}

#[test]
fn test_invalid_timeout() {
    let home = TempDir::new().unwrap();
    devx(&home)
        .args(["update", "install", "--timeout", "eventually"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--timeout"));
}
