//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify outputs.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const SIX_AM: &str = "2025-03-10T06:00:00+07:00";

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_classbell"))
        .args(args)
        .env("CLASSBELL_DATA_DIR", data_dir)
        .env_remove("CLASSBELL_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn loaded_data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let timetable = dir.path().join("timetable.json");
    std::fs::write(
        &timetable,
        r#"[
            {"subjectName": "Math", "teacherName": "Lan", "roomName": "A1", "date": "10-03-2025", "start": "07:00", "end": "09:00"},
            {"subjectName": "Art", "date": "10-03-2025", "start": "13:00", "end": "15:00"},
            {"subjectName": "Broken", "date": "not a date", "start": "13:00", "end": "15:00"}
        ]"#,
    )
    .unwrap();

    let (code, stdout, stderr) = run_cli(
        dir.path(),
        &["reload", "--file", timetable.to_str().unwrap(), "--at", SIX_AM],
    );
    assert_eq!(code, 0, "reload failed: {stderr}");
    assert!(stdout.contains("Normalized 2 of 3 entries (1 skipped)."), "{stdout}");
    assert!(stdout.contains("2 scheduled"), "{stdout}");
    dir
}

#[test]
fn test_schedule_list_groups_by_day() {
    let dir = loaded_data_dir();
    let (code, stdout, _) = run_cli(dir.path(), &["schedule", "list", "--at", SIX_AM]);
    assert_eq!(code, 0);
    assert!(stdout.starts_with("Thứ Hai, 10/03/2025"), "{stdout}");
    let math = stdout.find("Math").unwrap();
    let art = stdout.find("Art").unwrap();
    assert!(math < art);
    assert!(stdout.contains("07:00 - 09:00  Math  [A1] Lan"), "{stdout}");
    assert!(stdout.contains("[Chưa có]"), "{stdout}");
}

#[test]
fn test_schedule_next_json() {
    let dir = loaded_data_dir();
    let (code, stdout, _) = run_cli(
        dir.path(),
        &["schedule", "next", "--json", "--at", "2025-03-10T08:00:00+07:00"],
    );
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["subjectName"], "Art");
    assert_eq!(parsed["startTimeFormatted"], "13:00");
}

#[test]
fn test_lead_set_snaps_and_reschedules() {
    let dir = loaded_data_dir();
    let (code, stdout, _) = run_cli(dir.path(), &["lead", "set", "28", "--at", SIX_AM]);
    assert_eq!(code, 0);
    assert!(stdout.contains("lead time set to 30 minutes (requested 28)"), "{stdout}");

    let (_, stdout, _) = run_cli(dir.path(), &["lead", "get"]);
    assert_eq!(stdout.trim(), "30");

    let (_, stdout, _) = run_cli(dir.path(), &["reminders", "list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert_eq!(parsed[0]["triggerInstant"], "2025-03-09T23:30:00Z");
}

#[test]
fn test_reminders_due_pops_fired_reminders() {
    let dir = loaded_data_dir();
    let (code, stdout, _) = run_cli(
        dir.path(),
        &["reminders", "due", "--json", "--at", "2025-03-10T06:50:00+07:00"],
    );
    assert_eq!(code, 0);
    let fired: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(fired.as_array().unwrap().len(), 1);
    assert_eq!(fired[0]["payload"]["title"], "Math sắp bắt đầu");

    let (_, stdout, _) = run_cli(dir.path(), &["reminders", "list", "--json"]);
    let pending: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[test]
fn test_out_of_range_minutes_are_handled() {
    let dir = loaded_data_dir();
    let (code, stdout, stderr) = run_cli(dir.path(), &["lead", "set", "9223372036854775807", "--at", SIX_AM]);
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("lead time set to 120 minutes"), "{stdout}");

    let (code, _, stderr) = run_cli(
        dir.path(),
        &["config", "set", "reload.min_interval_minutes", "9223372036854775807"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("reload.min_interval_minutes"), "{stderr}");

    let (code, stdout, _) = run_cli(dir.path(), &["reload", "--if-stale", "--at", SIX_AM]);
    assert_eq!(code, 0);
    assert!(stdout.contains("fresh"), "{stdout}");
}

#[test]
fn test_config_get_set() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "reminders.lead_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "15");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "locale", "en"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "locale"]);
    assert_eq!(stdout.trim(), "en");

    let (_, stdout, _) = run_cli(dir.path(), &["config", "list"]);
    assert!(stdout.contains("timezone = Asia/Ho_Chi_Minh"), "{stdout}");
}

#[test]
fn test_errors_exit_nonzero() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error: unknown key: no.such.key"), "{stderr}");

    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "timezone", "Nowhere/City"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");

    let (code, _, stderr) = run_cli(dir.path(), &["reload"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("No bearer credential"), "{stderr}");
}
