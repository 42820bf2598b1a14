//! CLI command integration tests.
//! Each test uses a temp directory via FLUX_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn flux_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("flux").unwrap();
    cmd.env("FLUX_DATA_DIR", data_dir.path());
    cmd
}

/// Run `process` and return the emitted capsule.
fn process(dir: &TempDir, session: &str, text: &str, seed: u64) -> Value {
    let output = flux_cmd(dir)
        .args(["process", "--session", session, "--seed", &seed.to_string(), text])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    serde_json::from_slice(&output.stdout).unwrap()
}

fn extract_stat_value<'a>(stdout: &'a str, label: &str) -> &'a str {
    stdout
        .lines()
        .find(|l| l.starts_with(label))
        .map(|l| l[label.len()..].trim())
        .unwrap_or("")
}

#[test]
fn stats_fresh_session() {
    let dir = TempDir::new().unwrap();
    flux_cmd(&dir)
        .args(["stats", "--session", "fresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("session:    fresh"))
        .stdout(predicate::str::contains("capsules:   0"))
        .stdout(predicate::str::contains("state:      presence"));
}

#[test]
fn process_emits_capsule_json() {
    let dir = TempDir::new().unwrap();
    let capsule = process(&dir, "emit", "the cat sat on the mat", 7);

    assert!(capsule["capsule_id"].is_string());
    assert!(capsule["prev_capsule_id"].is_string());
    assert_eq!(capsule["agent_trace"].as_array().unwrap().len(), 1);
    assert!(capsule["signature"].is_object());
    let tokens: Vec<&str> = capsule["tokens"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(tokens.ends_with(&["the", "cat", "sat", "on", "the", "mat"]));
}

#[test]
fn process_persists_and_resumes() {
    let dir = TempDir::new().unwrap();
    let first = process(&dir, "resume", "first batch", 1);
    let second = process(&dir, "resume", "second batch", 2);

    // second raw capsule links to the first stored capsule, so the lineage
    // of the second spans four capsules
    let output = flux_cmd(&dir)
        .args(["lineage", "--session", "resume"])
        .arg(second["capsule_id"].as_str().unwrap())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("4 capsules"), "{stdout}");
    let first_short = &first["capsule_id"].as_str().unwrap()[..8];
    assert!(stdout.contains(first_short));

    let output = flux_cmd(&dir)
        .args(["stats", "--session", "resume"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(extract_stat_value(&stdout, "capsules:"), "4");
    assert!(!extract_stat_value(&stdout, "bias:").is_empty());
    assert!(!extract_stat_value(&stdout, "coherence:").is_empty());
    assert!(matches!(extract_stat_value(&stdout, "diverged:"), "true" | "false"));
}

#[test]
fn process_same_seed_is_reproducible() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let ca = process(&a, "s", "repeatable words here", 42);
    let cb = process(&b, "s", "repeatable words here", 42);
    assert_eq!(ca["entropy"], cb["entropy"]);
    assert_eq!(ca["curvature"], cb["curvature"]);
    assert_eq!(ca["state"], cb["state"]);
}

#[test]
fn process_rejects_empty_input() {
    let dir = TempDir::new().unwrap();
    flux_cmd(&dir)
        .args(["process", "  ...  "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no tokens"));
}

#[test]
fn show_by_prefix() {
    let dir = TempDir::new().unwrap();
    let capsule = process(&dir, "show", "look at me", 3);
    let id = capsule["capsule_id"].as_str().unwrap();

    flux_cmd(&dir)
        .args(["show", "--session", "show", &id[..8]])
        .assert()
        .success()
        .stdout(predicate::str::contains(id));
}

#[test]
fn show_unknown_fails() {
    let dir = TempDir::new().unwrap();
    flux_cmd(&dir)
        .args(["show", "deadbeef"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown capsule"));
}

#[test]
fn sessions_are_isolated() {
    let dir = TempDir::new().unwrap();
    process(&dir, "one", "only here", 5);
    flux_cmd(&dir)
        .args(["stats", "--session", "two"])
        .assert()
        .success()
        .stdout(predicate::str::contains("capsules:   0"));
}

#[test]
fn export_import_roundtrip() {
    let dir = TempDir::new().unwrap();
    process(&dir, "src", "carry this across", 9);
    let path = dir.path().join("journal.json");

    flux_cmd(&dir)
        .args(["export", "--session", "src"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported to"));

    flux_cmd(&dir)
        .args(["import", "--session", "dst"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("inserted=2"))
        .stdout(predicate::str::contains("snapshot=true"));

    flux_cmd(&dir)
        .args(["stats", "--session", "dst"])
        .assert()
        .success()
        .stdout(predicate::str::contains("capsules:   2"));
}

#[test]
fn merge_two_capsules() {
    let dir = TempDir::new().unwrap();
    let a = process(&dir, "m", "left branch", 1);
    let b = process(&dir, "m", "right branch", 2);

    let output = flux_cmd(&dir)
        .args(["merge", "--session", "m"])
        .arg(a["capsule_id"].as_str().unwrap())
        .arg(b["capsule_id"].as_str().unwrap())
        .output()
        .unwrap();
    assert!(output.status.success());
    let merged: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(merged["prev_capsule_id"], a["capsule_id"]);
    assert_eq!(merged["agent_trace"].as_array().unwrap().len(), 2);

    flux_cmd(&dir)
        .args(["stats", "--session", "m"])
        .assert()
        .success()
        .stdout(predicate::str::contains("capsules:   5"));
}

#[test]
fn config_file_is_honoured() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("flux.toml"), "device_id = \"bench-rig\"\n").unwrap();
    let capsule = process(&dir, "cfg", "configured run", 4);
    assert_eq!(capsule["device_id"], "bench-rig");
}

#[test]
fn out_of_range_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("flux.toml"), "entropy_jitter = inf\n").unwrap();
    flux_cmd(&dir)
        .args(["process", "--seed", "1", "still safe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("entropy_jitter"));
}
