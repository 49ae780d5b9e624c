//! CLI smoke tests: init writes a valid sample config, validate accepts
//! and rejects appropriately.

use std::process::Command;

fn warden_binary() -> String {
    env!("CARGO_BIN_EXE_warden").to_string()
}

#[test]
fn init_then_validate_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("warden.yaml");

    let init = Command::new(warden_binary())
        .args(["init", "--output", config_path.to_str().unwrap()])
        .output()
        .expect("run warden init");
    assert!(
        init.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&init.stderr)
    );
    assert!(config_path.exists());

    let validate = Command::new(warden_binary())
        .args(["-c", config_path.to_str().unwrap(), "validate"])
        .output()
        .expect("run warden validate");
    assert!(
        validate.status.success(),
        "validate failed: {}",
        String::from_utf8_lossy(&validate.stderr)
    );
    let stdout = String::from_utf8_lossy(&validate.stdout);
    assert!(stdout.contains("is valid"), "got: {}", stdout);
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("warden.yaml");
    std::fs::write(&config_path, "services: []").unwrap();

    let init = Command::new(warden_binary())
        .args(["init", "--output", config_path.to_str().unwrap()])
        .output()
        .expect("run warden init");
    assert!(!init.status.success());
    assert!(String::from_utf8_lossy(&init.stderr).contains("already exists"));

    let forced = Command::new(warden_binary())
        .args(["init", "--output", config_path.to_str().unwrap(), "--force"])
        .output()
        .expect("run warden init --force");
    assert!(forced.status.success());
}

#[test]
fn validate_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("warden.yaml");

    // Duplicate ports
    std::fs::write(
        &config_path,
        r#"
services:
  - name: a
    command: "sleep 1"
    port: 3000
    healthcheck: "http://localhost:3000/health"
  - name: b
    command: "sleep 1"
    port: 3000
    healthcheck: "http://localhost:3000/other"
"#,
    )
    .unwrap();

    let validate = Command::new(warden_binary())
        .args(["-c", config_path.to_str().unwrap(), "validate"])
        .output()
        .expect("run warden validate");
    assert!(!validate.status.success());
    let stderr = String::from_utf8_lossy(&validate.stderr);
    assert!(stderr.contains("reuses port"), "got: {}", stderr);
}
