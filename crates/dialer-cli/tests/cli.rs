use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::process::Output;
use tempfile::TempDir;

fn dialer(temp: &TempDir, json: bool, args: &[&str]) -> Output {
    let db_path = temp.path().join("dialer.sqlite3");
    let mut cmd = cargo_bin_cmd!("dialer");
    cmd.env("XDG_CONFIG_HOME", temp.path().join("config"))
        .args(["--db-path", db_path.to_str().expect("db path")]);
    if json {
        cmd.arg("--json");
    }
    cmd.args(args).output().expect("run command")
}

fn run_cmd(temp: &TempDir, args: &[&str]) -> String {
    let output = dialer(temp, false, args);
    assert!(output.status.success(), "command failed: {:?}", output);
    String::from_utf8(output.stdout).expect("utf8")
}

fn run_cmd_json(temp: &TempDir, args: &[&str]) -> Value {
    let output = dialer(temp, true, args);
    assert!(output.status.success(), "command failed: {:?}", output);
    serde_json::from_slice(&output.stdout).expect("parse json")
}

fn exit_code(temp: &TempDir, args: &[&str]) -> Option<i32> {
    dialer(temp, false, args).status.code()
}

fn db_exists(temp: &TempDir) -> bool {
    temp.path().join("dialer.sqlite3").exists()
}

#[test]
fn lead_add_list_show_flow() {
    let temp = TempDir::new().expect("temp dir");

    let created = run_cmd_json(
        &temp,
        &["lead", "add", "--phone", "(555) 010-2000", "--name", "Ada"],
    );
    assert_eq!(created["phone"], "5550102000");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["priority"], "medium");
    assert!(db_exists(&temp));

    run_cmd(
        &temp,
        &["lead", "add", "--phone", "5550102001", "--priority", "urgent"],
    );

    let list = run_cmd_json(&temp, &["lead", "list"]);
    let items = list.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["priority"], "urgent");
    assert_eq!(items[1]["name"], "Ada");

    let id = created["id"].as_str().expect("id");
    let detail = run_cmd_json(&temp, &["lead", "show", id]);
    assert_eq!(detail["attempt_count"], 0);
    assert!(detail["call_attempts"].as_array().expect("attempts").is_empty());
}

#[test]
fn lead_edit_and_retire() {
    let temp = TempDir::new().expect("temp dir");
    let created = run_cmd_json(&temp, &["lead", "add", "--phone", "5550102010"]);
    let id = created["id"].as_str().expect("id").to_string();

    let edited = run_cmd_json(
        &temp,
        &[
            "lead",
            "edit",
            &id,
            "--priority",
            "high",
            "--notes",
            "call after lunch",
            "--not-before",
            "2099-01-01 09:30",
        ],
    );
    assert_eq!(edited["priority"], "high");
    assert_eq!(edited["notes"], "call after lunch");
    assert!(edited["next_eligible_at"].is_number());

    let cleared = run_cmd_json(&temp, &["lead", "edit", &id, "--clear-not-before"]);
    assert!(cleared["next_eligible_at"].is_null());

    assert_eq!(exit_code(&temp, &["lead", "edit", &id]), Some(3));

    let retired = run_cmd_json(&temp, &["lead", "retire", &id]);
    assert_eq!(retired["active"], false);

    let active = run_cmd_json(&temp, &["lead", "list"]);
    assert!(active.as_array().expect("array").is_empty());
    let all = run_cmd_json(&temp, &["lead", "list", "--include-retired"]);
    assert_eq!(all.as_array().expect("array").len(), 1);
}

#[test]
fn lead_input_errors_map_to_exit_codes() {
    let temp = TempDir::new().expect("temp dir");
    run_cmd(&temp, &["lead", "add", "--phone", "5550102020"]);

    assert_eq!(
        exit_code(&temp, &["lead", "add", "--phone", "555-010-2020"]),
        Some(3)
    );
    assert_eq!(exit_code(&temp, &["lead", "add", "--phone", "call me"]), Some(3));
    assert_eq!(
        exit_code(
            &temp,
            &["lead", "add", "--phone", "5550102021", "--priority", "asap"]
        ),
        Some(3)
    );
    assert_eq!(exit_code(&temp, &["lead", "show", "not-a-uuid"]), Some(3));
    assert_eq!(
        exit_code(
            &temp,
            &["lead", "show", "00000000-0000-4000-8000-000000000000"]
        ),
        Some(2)
    );
    assert_eq!(
        exit_code(&temp, &["lead", "list", "--status", "sleeping"]),
        Some(3)
    );
}

#[test]
fn agent_availability_flow() {
    let temp = TempDir::new().expect("temp dir");
    let agent = run_cmd_json(
        &temp,
        &["agent", "add", "--name", "Grace", "--phone", "5550109001"],
    );
    assert_eq!(agent["available"], true);
    assert_eq!(agent["phone"], "5550109001");
    let id = agent["id"].as_str().expect("id").to_string();

    let paused = run_cmd_json(&temp, &["agent", "unavailable", &id]);
    assert_eq!(paused["available"], false);
    let back = run_cmd_json(&temp, &["agent", "available", &id]);
    assert_eq!(back["available"], true);

    let listed = run_cmd(&temp, &["agent", "list"]);
    assert!(listed.contains("Grace"));
    assert!(listed.contains("available"));

    run_cmd(&temp, &["agent", "deactivate", &id]);
    let active = run_cmd_json(&temp, &["agent", "list"]);
    assert!(active.as_array().expect("array").is_empty());
    let all = run_cmd_json(&temp, &["agent", "list", "--include-inactive"]);
    assert_eq!(all[0]["active"], false);

    assert_eq!(
        exit_code(&temp, &["agent", "add", "--name", " ", "--phone", "5550109002"]),
        Some(3)
    );
}

#[test]
fn outcome_for_unknown_call_is_not_found() {
    let temp = TempDir::new().expect("temp dir");
    assert_eq!(
        exit_code(&temp, &["outcome", "CA-missing", "completed"]),
        Some(2)
    );
    assert_eq!(
        exit_code(&temp, &["outcome", "CA-missing", "teleported"]),
        Some(3)
    );
    assert_eq!(
        exit_code(&temp, &["outcome", "CA-missing", "completed", "--duration=-5"]),
        Some(3)
    );
}

#[test]
fn reset_stuck_and_stats_on_idle_queue() {
    let temp = TempDir::new().expect("temp dir");
    run_cmd(&temp, &["lead", "add", "--phone", "5550102030"]);
    run_cmd(&temp, &["lead", "add", "--phone", "5550102031"]);
    run_cmd(
        &temp,
        &["agent", "add", "--name", "Linus", "--phone", "5550109003"],
    );

    let recovered = run_cmd_json(&temp, &["reset-stuck"]);
    assert!(recovered.as_array().expect("array").is_empty());
    assert_eq!(
        exit_code(&temp, &["reset-stuck", "--threshold-secs", "0"]),
        Some(3)
    );
    assert_eq!(
        exit_code(&temp, &["reset-stuck", "--answered-threshold-secs", "0"]),
        Some(3)
    );

    let stats = run_cmd_json(&temp, &["stats"]);
    assert_eq!(stats["leads"]["pending"], 2);
    assert_eq!(stats["calls"]["total"], 0);
    assert!(stats["calls"]["average_talk_secs"].is_null());
    assert_eq!(stats["selectable_agents"], 1);
}

#[test]
fn run_requires_a_telephony_endpoint() {
    let temp = TempDir::new().expect("temp dir");
    let output = dialer(&temp, false, &["run"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("telephony.endpoint"));
}

#[test]
fn completions_do_not_touch_the_database() {
    let temp = TempDir::new().expect("temp dir");
    let script = run_cmd(&temp, &["completions", "bash"]);
    assert!(script.contains("dialer"));
    assert!(!db_exists(&temp));
}

#[test]
fn help_describes_every_subcommand() {
    let temp = TempDir::new().expect("temp dir");
    let help = run_cmd(&temp, &["--help"]);
    let stats_line = help
        .lines()
        .find(|line| line.trim_start().starts_with("stats"))
        .expect("stats listed");
    assert!(stats_line.contains("Summarize"));
}
