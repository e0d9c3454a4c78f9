#![forbid(unsafe_code)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::tempdir;
use uuid::Uuid;

fn cli(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("releve-cli").unwrap();
    cmd.env_remove("RELEVE_DB").arg("--db").arg(db);
    cmd
}

fn json(cmd: &mut Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

#[test]
fn roster_lifecycle_end_to_end() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tenant.db");

    let roster = json(cli(&db).args([
        "roster",
        "create",
        "--name",
        "ops",
        "--timezone",
        "Europe/Paris",
        "--handoff-time",
        "09:00",
        "--handoff-day",
        "1",
        "--weeks-ahead",
        "4",
    ]));
    assert_eq!(roster["handoff_time"], "09:00");
    let id = roster["id"].as_str().unwrap().to_string();

    for name in ["Alice", "Bob"] {
        let user = Uuid::new_v4().to_string();
        let member = json(cli(&db).args(["members", "add", &id, &user, "--name", name]));
        assert_eq!(member["name"], name);
    }

    // l'ajout de membres a régénéré le planning en arrière-plan
    let weeks = json(cli(&db).args(["schedule", "show", &id]));
    assert_eq!(weeks.as_array().unwrap().len(), 4);

    let on_call = json(cli(&db).args(["oncall", &id]));
    assert_eq!(on_call["source"], "schedule");
    assert!(on_call["primary"].is_string());
    assert_ne!(on_call["primary"], on_call["secondary"]);

    let ics = dir.path().join("ops.ics");
    cli(&db)
        .args(["export", &id, "--out"])
        .arg(&ics)
        .assert()
        .success()
        .stdout(predicate::str::contains("Calendar written"));
    let doc = std::fs::read_to_string(&ics).unwrap();
    assert!(doc.starts_with("BEGIN:VCALENDAR\r\n"));
    assert_eq!(doc.matches("BEGIN:VEVENT").count(), 4);
}

#[test]
fn invalid_input_is_reported() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tenant.db");

    cli(&db)
        .args(["oncall", &Uuid::new_v4().to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("roster not found"));

    cli(&db)
        .args([
            "roster",
            "create",
            "--name",
            "ops",
            "--timezone",
            "Mars/Olympus_Mons",
            "--handoff-time",
            "09:00",
            "--handoff-day",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("timezone"));

    cli(&db)
        .args(["oncall", "not-a-uuid"])
        .assert()
        .failure();
}

#[test]
fn coverage_without_rosters_exits_with_warning_code() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tenant.db");
    cli(&db)
        .args([
            "coverage",
            "--from",
            "2026-03-02T00:00:00Z",
            "--to",
            "2026-03-02T06:00:00Z",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"total_gap_hours\": 6.0"));
}

#[test]
fn unlinked_sibling_no_longer_blocks_delete() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("tenant.db");
    let create = |name: &str, extra: &[&str]| {
        let mut cmd = cli(&db);
        cmd.args([
            "roster",
            "create",
            "--name",
            name,
            "--timezone",
            "UTC",
            "--handoff-time",
            "08:00",
            "--handoff-day",
            "1",
        ])
        .args(extra);
        json(&mut cmd)["id"].as_str().unwrap().to_string()
    };
    let emea = create("emea", &[]);
    let apac = create("apac", &["--linked", &emea]);

    cli(&db)
        .args(["roster", "delete", &emea])
        .assert()
        .failure()
        .stderr(predicate::str::contains("linked"));

    let updated = json(cli(&db).args(["roster", "update", &apac, "--unlink"]));
    assert!(updated.get("linked_roster_id").map_or(true, Value::is_null));

    cli(&db)
        .args(["roster", "delete", &emea])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted"));
}
