#![forbid(unsafe_code)]
use chrono::{Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use releve::{
    model::{HandoffDay, NewRoster, RosterId, ScheduleEntry, User},
    timeutil, CallContext, CoverageAnalyzer, RosterRepository,
};

/// Roster follow-the-sun UTC, relève le lundi 08:00, fenêtre `[start, end)`.
fn follow_the_sun(
    repo: &RosterRepository,
    name: &str,
    start: &str,
    end: &str,
    linked: Option<RosterId>,
) -> RosterId {
    let mut new = NewRoster::new(
        name,
        Tz::UTC,
        timeutil::parse_time_of_day("08:00").unwrap(),
        HandoffDay::new(1).unwrap(),
    );
    new.is_follow_the_sun = true;
    new.active_hours_start = Some(timeutil::parse_time_of_day(start).unwrap());
    new.active_hours_end = Some(timeutil::parse_time_of_day(end).unwrap());
    new.linked_roster_id = linked;
    repo.create_roster(&new).unwrap().id
}

fn staff_week(repo: &RosterRepository, roster: RosterId, who: &str) {
    let user = User::new(who);
    repo.upsert_user(&user).unwrap();
    repo.add_member(roster, user.id).unwrap();
    let week = timeutil::parse_date("2026-03-02").unwrap();
    repo.upsert_generated_week(&ScheduleEntry::generated(roster, week, Some(user.id), None))
        .unwrap();
}

#[test]
fn complementary_windows_leave_no_gap() {
    let repo = RosterRepository::open_in_memory().unwrap();
    let day = follow_the_sun(&repo, "emea", "08:00", "20:00", None);
    let night = follow_the_sun(&repo, "apac", "20:00", "08:00", Some(day));
    staff_week(&repo, day, "alice");
    staff_week(&repo, night, "bob");

    let from = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
    let to = from + Duration::hours(48);
    let report = CoverageAnalyzer::new(&repo)
        .coverage(&CallContext::background(), from, to, Duration::minutes(60))
        .unwrap();

    assert_eq!(report.slots.len(), 48);
    assert!(report.gaps.is_empty());
    assert_eq!(report.total_gap_hours, 0.0);
    for slot in &report.slots {
        assert_eq!(slot.coverage.len(), 1, "slot {}", slot.start);
        let expected = if (8..20).contains(&slot.start.hour()) {
            day
        } else {
            night
        };
        assert_eq!(slot.coverage[0].roster_id, expected);
    }
}

#[test]
fn missing_night_shift_shows_as_gap_runs() {
    let repo = RosterRepository::open_in_memory().unwrap();
    let day = follow_the_sun(&repo, "emea", "08:00", "20:00", None);
    // roster de nuit sans planning
    follow_the_sun(&repo, "apac", "20:00", "08:00", Some(day));
    staff_week(&repo, day, "alice");

    let from = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();
    let to = from + Duration::hours(48);
    let report = CoverageAnalyzer::new(&repo)
        .coverage(&CallContext::background(), from, to, Duration::minutes(30))
        .unwrap();

    let runs: Vec<(i64, i64)> = report
        .gaps
        .iter()
        .map(|g| ((g.start - from).num_hours(), g.duration_minutes))
        .collect();
    // 00:00-08:00, 20:00-08:00, 20:00-24:00 (fermé à `to`)
    assert_eq!(runs, vec![(0, 480), (20, 720), (44, 240)]);
    assert!((report.total_gap_hours - 24.0).abs() < 1e-9);
    let gap_slots = report.slots.iter().filter(|s| s.gap).count();
    assert_eq!(gap_slots as i64 * 30, 24 * 60);
}
