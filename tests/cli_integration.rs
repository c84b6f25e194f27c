//! Integration tests for the `tm` CLI.
//!
//! Each test creates a temp workspace, runs `tm` as a subprocess, and
//! verifies stdout and/or file contents.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pretty_assertions::assert_eq;

/// Get the path to the built `tm` binary.
fn tm_bin() -> PathBuf {
    // cargo test builds to target/debug/
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tm");
    path
}

/// Run `tm` with the given args in the given directory, returning (stdout, stderr, success).
fn run_tm(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(tm_bin())
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run tm");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `tm` expecting success, return stdout.
fn run_tm_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tm(dir, args);
    if !success {
        panic!("tm {:?} failed:\nstdout: {}\nstderr: {}", args, stdout, stderr);
    }
    stdout
}

/// Run `tm` expecting failure, return stderr.
fn run_tm_err(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tm(dir, args);
    if success {
        panic!("tm {:?} unexpectedly succeeded:\nstdout: {}", args, stdout);
    }
    stderr
}

/// Initialized workspace with `user` signed in
fn workspace_for(user: &str) -> tempfile::TempDir {
    let tmp = tempfile::TempDir::new().unwrap();
    run_tm_ok(tmp.path(), &["init"]);
    run_tm_ok(tmp.path(), &["login", user]);
    tmp
}

fn store_json(dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(dir.join(".taskmirror/store.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ---------------------------------------------------------------------------
// Workspace and session
// ---------------------------------------------------------------------------

#[test]
fn test_init_creates_workspace() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = run_tm_ok(tmp.path(), &["init"]);
    assert!(out.contains("Initialized taskmirror workspace"));
    assert!(tmp.path().join(".taskmirror/config.toml").exists());
    assert_eq!(store_json(tmp.path())["next_id"], 0);

    let err = run_tm_err(tmp.path(), &["init"]);
    assert!(err.contains("already initialized"));
}

#[test]
fn test_outside_workspace_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let err = run_tm_err(tmp.path(), &["list"]);
    assert!(err.starts_with("error: not a taskmirror workspace"));
}

#[test]
fn test_workspace_dir_flag() {
    let tmp = workspace_for("alice");
    let elsewhere = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().to_string_lossy().to_string();
    run_tm_ok(elsewhere.path(), &["-C", &dir, "add", "From afar"]);
    let out = run_tm_ok(tmp.path(), &["list"]);
    assert!(out.contains("From afar"));
}

#[test]
fn test_login_preserves_config_comments() {
    let tmp = workspace_for("alice");
    let config = fs::read_to_string(tmp.path().join(".taskmirror/config.toml")).unwrap();
    assert!(config.contains("user = \"alice\""));
    assert!(config.contains("# taskmirror workspace settings"));

    let out = run_tm_ok(tmp.path(), &["logout"]);
    assert_eq!(out, "Signed out\n");
    let out = run_tm_ok(tmp.path(), &["logout"]);
    assert_eq!(out, "Already signed out\n");
}

#[test]
fn test_list_signed_out() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_tm_ok(tmp.path(), &["init"]);
    let out = run_tm_ok(tmp.path(), &["list"]);
    assert!(out.contains("Not signed in"));

    let err = run_tm_err(tmp.path(), &["add", "Nope"]);
    assert!(err.contains("not signed in"));
}

// ---------------------------------------------------------------------------
// Task commands
// ---------------------------------------------------------------------------

#[test]
fn test_add_and_list_grouped_by_date() {
    let tmp = workspace_for("alice");
    assert_eq!(run_tm_ok(tmp.path(), &["add", "Pay rent", "--deadline", "2099-06-01 10:00"]), "t1\n");
    run_tm_ok(tmp.path(), &["add", "Dentist", "--deadline", "2099-06-02 16:30"]);
    run_tm_ok(tmp.path(), &["add", "Someday"]);
    run_tm_ok(tmp.path(), &["add", "Early", "--deadline", "2099-06-01 08:00"]);

    let out = run_tm_ok(tmp.path(), &["list"]);
    assert_eq!(
        out,
        "\
-- Mon 01 Jun 2099 --
[ ] t4 Early     08:00
[ ] t1 Pay rent  10:00

-- Tue 02 Jun 2099 --
[ ] t2 Dentist   16:30

-- No deadline --
[ ] t3 Someday
"
    );
}

#[test]
fn test_empty_list() {
    let tmp = workspace_for("alice");
    assert_eq!(run_tm_ok(tmp.path(), &["list"]), "No tasks\n");
}

#[test]
fn test_deadline_in_past_rejected() {
    let tmp = workspace_for("alice");
    let err = run_tm_err(tmp.path(), &["add", "Too late", "--deadline", "2001-01-01 09:00"]);
    assert!(err.contains("is not after"));
    assert_eq!(store_json(tmp.path())["tasks"], serde_json::json!({}));

    let err = run_tm_err(tmp.path(), &["add", "Vague", "--deadline", "soon"]);
    assert!(err.contains("invalid deadline"));
}

#[test]
fn test_done_and_undo() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Water plants"]);

    assert_eq!(run_tm_ok(tmp.path(), &["done", "t1"]), "t1 [x] Water plants\n");
    assert!(run_tm_ok(tmp.path(), &["list"]).contains("[x] t1 Water plants"));
    assert_eq!(store_json(tmp.path())["tasks"]["t1"]["completed"], true);

    run_tm_ok(tmp.path(), &["done", "t1", "--undo"]);
    assert!(run_tm_ok(tmp.path(), &["list"]).contains("[ ] t1 Water plants"));
}

#[test]
fn test_hide_completed_from_config() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Finished", "--deadline", "2099-06-01 10:00"]);
    run_tm_ok(tmp.path(), &["add", "Open"]);
    run_tm_ok(tmp.path(), &["done", "t1"]);

    let config_path = tmp.path().join(".taskmirror/config.toml");
    let config = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, config.replace("show_completed = true", "show_completed = false")).unwrap();

    let out = run_tm_ok(tmp.path(), &["list"]);
    assert_eq!(out, "-- No deadline --\n[ ] t2 Open\n");
}

#[test]
fn test_edit_fields() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Draft", "--deadline", "2099-06-01 10:00"]);
    run_tm_ok(
        tmp.path(),
        &["edit", "t1", "--title", "Final", "-d", "with notes", "--no-deadline"],
    );

    let task = &store_json(tmp.path())["tasks"]["t1"];
    assert_eq!(task["title"], "Final");
    assert_eq!(task["description"], "with notes");
    assert!(task.get("deadline").is_none());
    assert_eq!(task["user_uid"], "alice");
}

#[test]
fn test_users_see_only_their_tasks() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Alice's task"]);
    run_tm_ok(tmp.path(), &["login", "bob"]);
    run_tm_ok(tmp.path(), &["add", "Bob's task"]);

    let out = run_tm_ok(tmp.path(), &["list"]);
    assert!(out.contains("Bob's task"));
    assert!(!out.contains("Alice's task"));

    let all = run_tm_ok(tmp.path(), &["list", "--all"]);
    assert!(all.contains("Bob's task"));
    assert!(all.contains("Alice's task"));

    let err = run_tm_err(tmp.path(), &["done", "t1"]);
    assert!(err.contains("belongs to another user"));
    // Viewing is allowed
    assert!(run_tm_ok(tmp.path(), &["show", "t1"]).contains("Alice's task"));
}

#[test]
fn test_rm_deletes_task_and_subtasks() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Trip"]);
    run_tm_ok(tmp.path(), &["sub", "add", "t1", "Book train"]);

    assert_eq!(run_tm_ok(tmp.path(), &["rm", "t1"]), "Deleted t1\n");
    let store = store_json(tmp.path());
    assert_eq!(store["tasks"], serde_json::json!({}));
    assert_eq!(store["subtasks"], serde_json::json!({}));

    let err = run_tm_err(tmp.path(), &["rm", "t1"]);
    assert!(err.contains("t1"));
}

#[test]
fn test_list_json() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Pay rent", "--deadline", "2099-06-01 10:00"]);
    run_tm_ok(tmp.path(), &["add", "Someday", "-d", "eventually"]);

    let out = run_tm_ok(tmp.path(), &["list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({ "state": "ready", "sections": [
            { "date": "2099-06-01", "tasks": [
                { "id": "t1", "title": "Pay rent", "completed": false, "deadline": "2099-06-01T10:00:00" }
            ]},
            { "date": null, "tasks": [
                { "id": "t2", "title": "Someday", "description": "eventually", "completed": false }
            ]}
        ]})
    );
}

#[test]
fn test_list_json_signed_out() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_tm_ok(tmp.path(), &["init"]);

    let out = run_tm_ok(tmp.path(), &["list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed, serde_json::json!({ "state": "no_data", "sections": [] }));
}

// ---------------------------------------------------------------------------
// Subtasks
// ---------------------------------------------------------------------------

#[test]
fn test_subtask_lifecycle() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Groceries"]);
    assert_eq!(run_tm_ok(tmp.path(), &["sub", "add", "t1", "milk"]), "t1: Added subtask 0\n");
    run_tm_ok(tmp.path(), &["sub", "add", "t1", "eggs"]);
    run_tm_ok(tmp.path(), &["sub", "add", "t1", "bread"]);
    run_tm_ok(tmp.path(), &["sub", "done", "t1", "1"]);
    run_tm_ok(tmp.path(), &["sub", "title", "t1", "2", "rye bread"]);
    run_tm_ok(tmp.path(), &["sub", "rm", "t1", "0"]);

    let out = run_tm_ok(tmp.path(), &["sub", "list", "t1"]);
    assert_eq!(out, "0 [x] eggs\n1 [ ] rye bread\n");

    let subtasks = &store_json(tmp.path())["subtasks"]["t1"];
    assert_eq!(subtasks.as_object().unwrap().len(), 2);

    let err = run_tm_err(tmp.path(), &["sub", "done", "t1", "7"]);
    assert!(err.contains("no subtask at index 7"));
}

#[test]
fn test_show_detail_and_json() {
    let tmp = workspace_for("alice");
    run_tm_ok(
        tmp.path(),
        &["add", "Pay rent", "--deadline", "2099-06-01 10:00", "-d", "new account"],
    );
    run_tm_ok(tmp.path(), &["sub", "add", "t1", "find IBAN"]);

    let out = run_tm_ok(tmp.path(), &["show", "t1"]);
    assert_eq!(
        out,
        "\
[ ] t1 Pay rent
deadline: Mon 01 Jun 2099 10:00
description:
  new account

subtasks:
  0 [ ] find IBAN
"
    );

    let parsed: serde_json::Value =
        serde_json::from_str(&run_tm_ok(tmp.path(), &["show", "t1", "--json"])).unwrap();
    assert_eq!(parsed["subtasks"][0]["title"], "find IBAN");
    assert_eq!(parsed["subtasks"][0]["id"], "s2");
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

#[test]
fn test_watch_prints_initial_list_as_inserts() {
    let tmp = workspace_for("alice");
    run_tm_ok(tmp.path(), &["add", "Pay rent", "--deadline", "2099-06-01 10:00"]);

    let out = run_tm_ok(tmp.path(), &["watch", "--for", "500"]);
    assert_eq!(out, "+0 -- Mon 01 Jun 2099 --\n+1 [ ] t1 Pay rent  10:00\n");
}

#[test]
fn test_watch_signed_out() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_tm_ok(tmp.path(), &["init"]);
    let out = run_tm_ok(tmp.path(), &["watch", "--for", "300"]);
    assert_eq!(out, "(signed out)\n");
}
