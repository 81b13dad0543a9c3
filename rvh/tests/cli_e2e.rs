//! CLI end-to-end tests against the mock transport (`RVH_MOCK_SSH=1`).

use std::path::Path;
use std::process::{Command, Output};

fn rvh(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rvh"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RVH_MOCK_SSH", "1")
        .env("RVH_LOG_LEVEL", "warn")
        .env_remove("RVH_HOST")
        .output()
        .expect("failed to run rvh")
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        "[session]\nhost = \"10.0.0.4\"\n\n[transfer]\nchunk_size_mib = 1\n",
    )
    .unwrap();
    path
}

#[test]
fn exec_succeeds_with_mock() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = rvh(&config, &["exec", "kubectl get nodes"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn push_prints_digest_and_parts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let source = dir.path().join("artifact.bin");
    std::fs::write(&source, vec![7u8; 1024 * 1024 + 10]).unwrap();

    let output = rvh(&config, &["push", source.to_str().unwrap(), "/data"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let digest = stdout.split_whitespace().next().unwrap();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(stdout.contains("2 parts"));
}

#[test]
fn push_rejects_bad_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let source = dir.path().join("artifact.bin");
    std::fs::write(&source, b"abc").unwrap();

    let output = rvh(&config, &["push", source.to_str().unwrap(), "/data", "--mode", "rwx"]);
    assert!(!output.status.success());
}

#[test]
fn ready_with_mock_answers_first_probe() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = rvh(&config, &["ready", "--settle-secs", "0"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ready after 1 probe"));
}

#[test]
fn steps_pass_and_fail() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let passing = dir.path().join("pass.toml");
    std::fs::write(&passing, "[[step]]\nname = \"uptime\"\ncommand = \"uptime\"\n").unwrap();
    let output = rvh(&config, &["steps", passing.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["name"], "uptime");
    assert_eq!(reports[0]["attempts"], 1);

    let failing = dir.path().join("fail.toml");
    std::fs::write(
        &failing,
        "[[step]]\nname = \"pods\"\ncommand = \"kubectl get pods\"\nexpect_contains = [\"Running\"]\n",
    )
    .unwrap();
    let output = rvh(&config, &["steps", failing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Running"));
}

#[test]
fn missing_config_file_is_an_error() {
    let output = rvh(Path::new("/nonexistent/rvh.toml"), &["exec", "true"]);
    assert!(!output.status.success());
}
