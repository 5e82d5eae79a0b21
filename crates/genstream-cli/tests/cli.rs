//! End-to-end tests for the genstream binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vocab.txt"),
            "<unk>\n<s>\n</s>\n▁hello\n▁world\n▁stop\n!\n",
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("genstream").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.path("config.toml"));
        cmd
    }

    fn vocab(&self) -> PathBuf {
        self.path("vocab.txt")
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_run_trims_stop_sequence() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["run", "--vocab", arg(&fx.vocab())])
        .args(["--transcript", "hello world stop hello"])
        .args(["--stop", "stop", "--start-token", "1", "--max-tokens", "32"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"))
        .stdout(predicate::str::contains("stop").not());
}

#[test]
fn test_run_ends_at_end_of_sequence_when_transcript_runs_out() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["run", "--vocab", arg(&fx.vocab()), "--transcript", "hello"])
        .args(["--start-token", "1", "--max-tokens", "6"])
        .assert()
        .success()
        .stdout(" hello\n");

    let output = fx
        .cmd()
        .args(["--json", "run", "--vocab", arg(&fx.vocab()), "--transcript", "hello"])
        .args(["--start-token", "1", "--max-tokens", "6"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["text"], " hello");
    assert_eq!(outcome["finish_reason"], "stop_sequence");
    assert_eq!(outcome["tokens_generated"], 2);
}

#[test]
fn test_run_stream_json_ends_with_done_chunk() {
    let fx = Fixture::new();
    let output = fx
        .cmd()
        .args(["--json", "run", "--stream", "--vocab", arg(&fx.vocab())])
        .args(["--transcript", "hello world hello world", "--max-tokens", "5"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let chunks: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.iter().filter(|c| c["done"] == true).count(), 1);
    assert_eq!(chunks.last().unwrap()["done"], true);
    let text: String = chunks
        .iter()
        .flat_map(|c| c["responses"].as_array().unwrap().clone())
        .map(|r| r.as_str().unwrap().to_string())
        .collect();
    assert_eq!(text, " hello world hello world");
}

#[test]
fn test_run_with_prompt_filling_budget() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["run", "--vocab", arg(&fx.vocab())])
        .args(["--transcript", "hello", "--prompt", "hello hello hello", "--max-tokens", "4"])
        .assert()
        .success()
        .stderr(predicate::str::contains("nothing was generated"));
}

#[test]
fn test_run_requires_transcript() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["run", "--vocab", arg(&fx.vocab())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No model output specified"));
}

#[test]
fn test_run_rejects_gpu_backend() {
    let fx = Fixture::new();
    let engine_config = fx.path("engine.toml");
    std::fs::write(&engine_config, "backend = \"gpu\"\n").unwrap();

    fx.cmd()
        .args(["run", "--vocab", arg(&fx.vocab()), "--transcript", "hello"])
        .args(["--engine-config", arg(&engine_config)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOT_IMPLEMENTED"));
}

#[test]
fn test_count_tokens() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["--json", "count", "--vocab", arg(&fx.vocab()), "hello world!"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tokens\": 3"));
}

#[test]
fn test_count_requires_input() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["count", "--vocab", arg(&fx.vocab())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input specified"));
}
