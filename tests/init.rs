use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_benchsift"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "benchsift init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".benchsift.toml");
    assert!(config_path.exists(), ".benchsift.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[filters]"));
    assert!(content.contains("[oracle]"));
    assert!(content.contains("[judge]"));

    let config: benchsift_core::BenchsiftConfig = toml::from_str(&content).unwrap();
    config.validate().unwrap();
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".benchsift.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_benchsift"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let existing = std::fs::read_to_string(dir.path().join(".benchsift.toml")).unwrap();
    assert_eq!(existing, "# existing");
}

#[test]
fn doctor_reports_json_checks() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_benchsift"))
        .args(["doctor", "--format", "json"])
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let checks = json["checks"].as_array().unwrap();
    let clone = checks
        .iter()
        .find(|c| c["name"] == "local_clone")
        .unwrap();
    assert_eq!(clone["status"], "fail");
    let runner = checks
        .iter()
        .find(|c| c["name"] == "test_runner")
        .unwrap();
    assert_eq!(runner["status"], "fail");
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".benchsift.toml"), "[batch]\nworkers = \"many\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_benchsift"))
        .args(["evaluate", "psf/requests", "--skip-oracle"])
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}
