use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[store]
path = "{}/data/precedent.sqlite"
dims = 8

[embedding]
provider = "disabled"
"#,
        root.display()
    );
    let config_path = config_dir.join("precedent.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("cases.json"),
        r#"[{"case_name": "Doe v. Roe", "year": 2023, "outcome": "Affirmed",
             "sections": {"facts": "Tenant withheld rent after repeated flooding."}}]"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run(config: &PathBuf, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_precedent"))
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run precedent binary")
}

#[test]
fn test_init_and_stats() {
    let (_tmp, config) = setup_test_env();

    let output = run(&config, &["init"]);
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("Store initialized"));

    // Idempotent.
    assert!(run(&config, &["init"]).status.success());

    let output = run(&config, &["stats"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cases:       0"));
    assert!(stdout.contains("Dimensions:  8"));
}

#[test]
fn test_index_requires_embedding_provider() {
    let (tmp, config) = setup_test_env();
    let cases = tmp.path().join("cases.json");

    let output = run(&config, &["index", cases.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("embedding provider is disabled"));
}

#[test]
fn test_bad_section_is_rejected() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["search", "warranty", "--section", "dicta"]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = run(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config file"));
}

#[test]
fn test_completions_without_config() {
    let tmp = TempDir::new().unwrap();
    let output = run(&tmp.path().join("nope.toml"), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("precedent"));
}
