//! End-to-end tests for the `lt` binary.
//!
//! Stdout is a pipe under test, so every command answers in JSON. `--quiet`
//! keeps log lines off stderr, leaving only the structured error.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("data").join("lifetrack.db")
    }

    fn lt(&self) -> Command {
        let mut cmd = Command::cargo_bin("lt").unwrap();
        cmd.env_remove("LT_DB")
            .env_remove("LT_ENDPOINT")
            .env_remove("RUST_LOG")
            .env("HOME", self.dir.path())
            .arg("--quiet")
            .arg("--db")
            .arg(self.db());
        cmd
    }

    fn init(&self) {
        self.lt().arg("init").assert().success();
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.lt().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }
}

fn stderr_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}

fn mock_ok(server: &MockServer, action: &str, data: Value) {
    server.mock(|when, then| {
        when.path("/exec").query_param("action", action);
        then.status(200)
            .json_body(json!({"success": true, "data": data}));
    });
}

#[test]
fn test_version() {
    let env = Env::new();
    let version = env.json(&["version"]);
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_uninitialized_database_fails_with_storage_exit_code() {
    let env = Env::new();
    let output = env.lt().args(["mood", "show"]).assert().code(2).get_output().clone();

    let error = stderr_json(&output.stderr);
    assert_eq!(error["error"]["code"], "NOT_INITIALIZED");
    assert!(error["error"]["hint"].as_str().unwrap().contains("lt init"));
}

#[test]
fn test_init_seeds_habits_into_queue() {
    let env = Env::new();
    let init = env.json(&["init"]);
    assert_eq!(init["habits_seeded"], 5);

    let habits = env.json(&["habit", "list"]);
    assert_eq!(habits.as_array().unwrap().len(), 5);
    assert_eq!(env.json(&["sync", "queue"]).as_array().unwrap().len(), 5);

    env.lt().arg("init").assert().code(2);
}

#[test]
fn test_offline_log_is_stored_and_queued() {
    let env = Env::new();
    env.init();

    let record = env.json(&[
        "mood", "log", "4", "3", "2", "--date", "2024-03-01", "--notes", "ok", "--offline",
    ]);
    assert_eq!(record["synced"], false);
    assert_eq!(record["fields"]["mood"], 4);

    // Same day again updates in place.
    env.json(&["mood", "log", "5", "3", "2", "--date", "2024-03-01", "--offline"]);
    let moods = env.json(&["records", "list", "moodEntries"]);
    assert_eq!(moods.as_array().unwrap().len(), 1);
    assert_eq!(moods[0]["fields"]["mood"], 5);

    let status = env.json(&["sync", "status", "--offline"]);
    assert_eq!(status["online"], false);
    assert_eq!(status["queueSize"], 6);
}

#[test]
fn test_invalid_rating_is_rejected() {
    let env = Env::new();
    env.init();

    env.lt()
        .args(["mood", "log", "9", "3", "2", "--offline"])
        .assert()
        .code(4);
    let moods = env.json(&["records", "list", "moodEntries"]);
    assert!(moods.as_array().unwrap().is_empty());
}

#[test]
fn test_drain_delivers_queued_add() {
    let env = Env::new();
    env.init();
    env.lt().args(["sync", "clear-queue", "--force"]).assert().success();
    env.json(&["dopamine", "log", "passed", "--date", "2024-03-01", "--offline"]);

    let server = MockServer::start();
    mock_ok(&server, "add", json!({"id": 41}));
    let endpoint = server.url("/exec");

    let report = env.json(&["sync", "drain", "--endpoint", &endpoint]);
    assert_eq!(report["queued"], 0);
    assert_eq!(report["report"]["drain"]["succeeded"], 1);

    let entries = env.json(&["records", "list", "dopamineEntries"]);
    assert_eq!(entries[0]["remoteId"], "41");
    assert_eq!(entries[0]["synced"], true);
}

#[test]
fn test_rejected_drain_keeps_queue_and_exits_nonzero() {
    let env = Env::new();
    env.init();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/exec");
        then.status(200)
            .json_body(json!({"success": false, "error": "Sheet not found"}));
    });
    let endpoint = server.url("/exec");

    let output = env
        .lt()
        .args(["sync", "drain", "--endpoint", &endpoint])
        .assert()
        .code(6)
        .get_output()
        .clone();
    let error = stderr_json(&output.stderr);
    assert_eq!(error["error"]["code"], "REMOTE_REJECTED");
    assert!(error["error"]["message"].as_str().unwrap().contains("Sheet not found"));

    assert_eq!(env.json(&["sync", "queue"]).as_array().unwrap().len(), 5);
}

#[test]
fn test_pull_replaces_local_collection() {
    let env = Env::new();
    env.init();
    env.lt().args(["sync", "clear-queue", "--force"]).assert().success();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/exec")
            .query_param("action", "getAll")
            .query_param("sheet", "Mood");
        then.status(200).json_body(json!({
            "success": true,
            "data": [{"id": 3, "date": "2024-02-02", "mood": 2, "energy": 2, "numb": 4}]
        }));
    });
    for sheet in ["Dopamine", "HygieneHabits", "HygieneCompletions"] {
        server.mock(|when, then| {
            when.method(GET)
                .path("/exec")
                .query_param("action", "getAll")
                .query_param("sheet", sheet);
            then.status(200).json_body(json!({"success": true, "data": []}));
        });
    }
    let endpoint = server.url("/exec");

    env.json(&["sync", "pull", "--endpoint", &endpoint]);

    let moods = env.json(&["records", "list", "moodEntries"]);
    assert_eq!(moods.as_array().unwrap().len(), 1);
    assert_eq!(moods[0]["remoteId"], "3");
    // Empty sheets leave local data alone.
    assert_eq!(env.json(&["habit", "list"]).as_array().unwrap().len(), 5);
}

#[test]
fn test_sync_without_endpoint_is_config_error() {
    let env = Env::new();
    env.init();

    let output = env.lt().args(["sync", "push"]).assert().code(7).get_output().clone();
    assert_eq!(stderr_json(&output.stderr)["error"]["code"], "CONFIG_ERROR");
}

#[test]
fn test_clear_queue_requires_force() {
    let env = Env::new();
    env.init();

    env.lt().args(["sync", "clear-queue"]).assert().code(4);
    let cleared = env.json(&["sync", "clear-queue", "--force"]);
    assert_eq!(cleared["removed"], 5);
}

#[test]
fn test_export_writes_pending_document() {
    let env = Env::new();
    env.init();
    let out = env.dir.path().join("pending.json");

    env.json(&["sync", "export", "--output", out.to_str().unwrap()]);

    let document: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(document["queue"].as_array().unwrap().len(), 5);
    assert_eq!(document["unsynced"]["hygieneHabits"].as_array().unwrap().len(), 5);
}

#[test]
fn test_config_set_and_show() {
    let env = Env::new();

    env.json(&["config", "set", "endpoint", "https://sheets.example/exec"]);
    env.json(&["config", "set", "auto_sync", "off"]);

    let config = env.json(&["config", "show"]);
    assert_eq!(config["endpoint"], "https://sheets.example/exec");
    assert_eq!(config["settings"]["autoSync"], false);
    assert!(Path::new(config["path"].as_str().unwrap()).exists());

    env.lt().args(["config", "set", "endpoint", "ftp://nope"]).assert().code(4);
}

#[test]
fn test_habit_toggle_and_cascade_delete() {
    let env = Env::new();
    env.init();

    let habit = env.json(&["habit", "add", "Stretch", "--offline"]);
    let id = habit["localId"].as_i64().unwrap().to_string();
    assert_eq!(habit["fields"]["order"], 6);

    let done = env.json(&["habit", "done", &id, "--date", "2024-03-01", "--offline"]);
    assert_eq!(done["fields"]["completed"], true);

    let removed = env.json(&["habit", "delete", &id, "--offline"]);
    assert_eq!(removed["completions"], 1);
    assert!(env.json(&["records", "list", "hygieneCompletions"]).as_array().unwrap().is_empty());
}
