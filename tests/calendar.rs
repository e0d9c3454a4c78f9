#![forbid(unsafe_code)]
use chrono::{TimeZone, Utc};
use releve::{
    calendar::{render_calendar, CalendarExporter},
    model::{
        parse_timezone, HandoffDay, NewOverride, NewRoster, Override, OverrideId, Roster,
        RosterId, ScheduleEntry, User, UserId,
    },
    timeutil, CallContext, RosterRepository, ScheduleGenerator,
};
use std::collections::HashMap;
use uuid::Uuid;

fn payments() -> Roster {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    Roster {
        id: RosterId::new(Uuid::from_u128(1)),
        name: "Payments".into(),
        description: None,
        timezone: parse_timezone("Europe/Paris").unwrap(),
        handoff_time: timeutil::parse_time_of_day("09:00").unwrap(),
        handoff_day: HandoffDay::new(1).unwrap(),
        schedule_weeks_ahead: 12,
        max_consecutive_weeks: 2,
        is_follow_the_sun: false,
        linked_roster_id: None,
        active_hours_start: None,
        active_hours_end: None,
        escalation_policy_id: None,
        end_date: None,
        is_active: true,
        created_at: created,
        updated_at: created,
    }
}

#[test]
fn calendar_document_is_stable() {
    let roster = payments();
    let alice = UserId::new(Uuid::from_u128(0xa));
    let bob = UserId::new(Uuid::from_u128(0xb));

    let first = ScheduleEntry::generated(
        roster.id,
        timeutil::parse_date("2026-03-02").unwrap(),
        Some(alice),
        Some(bob),
    );
    // après le passage à l'heure d'été : relève à 07:00 UTC
    let mut frozen = ScheduleEntry::generated(
        roster.id,
        timeutil::parse_date("2026-03-30").unwrap(),
        None,
        None,
    );
    frozen.notes = Some("Freeze, see runbook; no deploys".into());

    let cover = Override {
        id: OverrideId::new(Uuid::from_u128(0xf)),
        roster_id: roster.id,
        user_id: bob,
        start_at: Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap(),
        end_at: Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap(),
        reason: None,
        created_by: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
    };
    let names = HashMap::from([(alice, "Alice Martin".to_string()), (bob, "Bob".to_string())]);

    let doc = render_calendar(
        &roster,
        &[first, frozen],
        &[cover],
        &names,
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    );
    assert!(doc.ends_with("END:VCALENDAR\r\n"));
    assert!(!doc.replace("\r\n", "").contains('\n'));

    let normalized = doc.replace("\r\n", "\n");
    insta::assert_snapshot!(normalized.trim_end(), @r"
    BEGIN:VCALENDAR
    VERSION:2.0
    PRODID:-//releve//on-call rotations//EN
    CALSCALE:GREGORIAN
    METHOD:PUBLISH
    X-WR-CALNAME:Payments on-call
    X-WR-TIMEZONE:Europe/Paris
    BEGIN:VEVENT
    UID:00000000-0000-0000-0000-000000000001-20260302@releve
    DTSTAMP:20260301T120000Z
    DTSTART:20260302T080000Z
    DTEND:20260309T080000Z
    SUMMARY:On-call: Alice Martin
    DESCRIPTION:Primary: Alice Martin\nSecondary: Bob
    TRANSP:TRANSPARENT
    END:VEVENT
    BEGIN:VEVENT
    UID:00000000-0000-0000-0000-000000000001-20260330@releve
    DTSTAMP:20260301T120000Z
    DTSTART:20260330T070000Z
    DTEND:20260406T070000Z
    SUMMARY:Unassigned
    DESCRIPTION:Primary: unassigned\nFreeze\, see runbook\; no deploys
    TRANSP:TRANSPARENT
    END:VEVENT
    BEGIN:VEVENT
    UID:00000000-0000-0000-0000-00000000000f@releve
    DTSTAMP:20260301T120000Z
    DTSTART:20260304T180000Z
    DTEND:20260305T060000Z
    SUMMARY:Override: Bob
    DESCRIPTION:Manual override
    TRANSP:TRANSPARENT
    END:VEVENT
    END:VCALENDAR
    ");
}

#[test]
fn one_event_per_week_and_override() {
    let repo = RosterRepository::open_in_memory().unwrap();
    let roster = repo
        .create_roster(&NewRoster::new(
            "Search & Ranking",
            parse_timezone("America/New_York").unwrap(),
            timeutil::parse_time_of_day("10:00").unwrap(),
            HandoffDay::new(3).unwrap(),
        ))
        .unwrap();
    let users: Vec<User> = ["ana", "ben", "chloé"].into_iter().map(User::new).collect();
    for u in &users {
        repo.upsert_user(u).unwrap();
        repo.add_member(roster.id, u.id).unwrap();
    }
    ScheduleGenerator::new(&repo)
        .generate(
            &CallContext::background(),
            roster.id,
            timeutil::parse_date("2026-03-01").unwrap(),
            5,
        )
        .unwrap();
    for day in [10, 12] {
        let start = Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, day + 1, 0, 0, 0).unwrap();
        let mut new = NewOverride::new(users[2].id, start, end).unwrap();
        new.reason = Some("covering, long story".into());
        repo.create_override(roster.id, &new, None).unwrap();
    }

    let doc = CalendarExporter::new(&repo)
        .export(roster.id, Utc::now())
        .unwrap();
    assert_eq!(doc.matches("BEGIN:VEVENT").count(), 5 + 2);
    assert_eq!(
        doc.matches("BEGIN:VEVENT").count(),
        doc.matches("END:VEVENT").count()
    );
    assert!(doc.contains("SUMMARY:Override: chloé"));
    assert!(doc.contains("DESCRIPTION:covering\\, long story"));
    assert_eq!(CalendarExporter::file_name(&roster), "search---ranking-oncall.ics");
}

#[test]
fn override_for_non_member_uses_user_name() {
    let repo = RosterRepository::open_in_memory().unwrap();
    let roster = repo
        .create_roster(&NewRoster::new(
            "Edge",
            parse_timezone("Europe/Paris").unwrap(),
            timeutil::parse_time_of_day("09:00").unwrap(),
            HandoffDay::new(1).unwrap(),
        ))
        .unwrap();
    let member = User::new("ana");
    repo.upsert_user(&member).unwrap();
    repo.add_member(roster.id, member.id).unwrap();
    // jamais membre du roster, seulement connue dans `users`
    let outsider = User::new("dana");
    repo.upsert_user(&outsider).unwrap();

    let start = Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 3, 4, 6, 0, 0).unwrap();
    repo.create_override(
        roster.id,
        &NewOverride::new(outsider.id, start, end).unwrap(),
        None,
    )
    .unwrap();

    let doc = CalendarExporter::new(&repo)
        .export(roster.id, Utc::now())
        .unwrap();
    assert!(doc.contains("SUMMARY:Override: dana"));
    assert!(!doc.contains(&outsider.id.to_string()));
}
