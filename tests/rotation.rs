#![forbid(unsafe_code)]
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use releve::{
    model::{HandoffDay, NewOverride, NewRoster, User, UserId, WeekEdit},
    timeutil, CallContext, OnCallResolver, RosterRepository, ScheduleGenerator, Source,
};
use std::collections::HashMap;

fn setup(people: &[&str]) -> (RosterRepository, releve::Roster, Vec<UserId>) {
    let repo = RosterRepository::open_in_memory().unwrap();
    let roster = repo
        .create_roster(&NewRoster::new(
            "platform",
            Tz::UTC,
            timeutil::parse_time_of_day("09:00").unwrap(),
            HandoffDay::new(1).unwrap(),
        ))
        .unwrap();
    for name in people {
        let u = User::new(*name);
        repo.upsert_user(&u).unwrap();
        repo.add_member(roster.id, u.id).unwrap();
    }
    // ordre de la liste des membres = ordre de départage
    let order = repo
        .list_members(roster.id, true)
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    (repo, roster, order)
}

#[test]
fn three_members_rotate_evenly() {
    let (repo, roster, m) = setup(&["alice", "bob", "carol"]);
    let from = timeutil::parse_date("2026-03-04").unwrap(); // mercredi
    let weeks = ScheduleGenerator::new(&repo)
        .generate(&CallContext::background(), roster.id, from, 6)
        .unwrap();

    assert_eq!(weeks.len(), 6);
    assert_eq!(weeks[0].week_start, timeutil::parse_date("2026-03-02").unwrap());
    let primaries: Vec<_> = weeks.iter().map(|w| w.primary.unwrap()).collect();
    assert_eq!(primaries, vec![m[0], m[1], m[2], m[0], m[1], m[2]]);

    let mut served: HashMap<UserId, u32> = HashMap::new();
    for w in &weeks {
        assert!(w.generated && !w.locked);
        assert_ne!(w.secondary, w.primary);
        assert!(w.secondary.is_some());
        *served.entry(w.primary.unwrap()).or_default() += 1;
    }
    assert!(served.values().all(|&n| n == 2));
}

#[test]
fn manual_edit_survives_regeneration() {
    let (repo, roster, m) = setup(&["alice", "bob"]);
    let ctx = CallContext::background();
    let from = timeutil::parse_date("2026-03-02").unwrap();
    let generator = ScheduleGenerator::new(&repo);
    generator.generate(&ctx, roster.id, from, 4).unwrap();

    let second = timeutil::parse_date("2026-03-09").unwrap();
    let edited = repo
        .update_week(
            roster.id,
            second,
            &WeekEdit {
                primary: Some(m[0]),
                secondary: None,
                notes: Some("swap with bob".into()),
            },
        )
        .unwrap();
    assert!(edited.locked);
    assert!(!edited.generated);

    let again = generator.generate(&ctx, roster.id, from, 4).unwrap();
    let kept = again.iter().find(|w| w.week_start == second).unwrap();
    assert_eq!(kept.primary, Some(m[0]));
    assert_eq!(kept.notes.as_deref(), Some("swap with bob"));
    assert!(kept.locked);
    // le plafond de 2 semaines consécutives tient compte de la semaine verrouillée
    for pair in again.windows(3) {
        let same = pair.iter().all(|w| w.primary == pair[0].primary);
        assert!(!same, "three consecutive weeks for {:?}", pair[0].primary);
    }
}

#[test]
fn resolver_prefers_override_then_schedule() {
    let (repo, roster, m) = setup(&["alice", "bob"]);
    let ctx = CallContext::background();
    ScheduleGenerator::new(&repo)
        .generate(&ctx, roster.id, timeutil::parse_date("2026-02-02").unwrap(), 2)
        .unwrap();

    let outsider = User::new("dana");
    repo.upsert_user(&outsider).unwrap();
    let start = Utc.with_ymd_and_hms(2026, 2, 3, 18, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 2, 4, 6, 0, 0).unwrap();
    repo.create_override(
        roster.id,
        &NewOverride::new(outsider.id, start, end).unwrap(),
        Some(m[1]),
    )
    .unwrap();

    let resolver = OnCallResolver::new(&repo);
    let during = resolver
        .resolve(&ctx, roster.id, Utc.with_ymd_and_hms(2026, 2, 3, 23, 0, 0).unwrap())
        .unwrap();
    assert_eq!(during.assignment.source(), Source::Override);
    assert_eq!(during.assignment.primary(), Some(outsider.id));
    assert_eq!(during.assignment.secondary(), Some(m[1]));

    // fin d'override exclue
    let after = resolver.resolve(&ctx, roster.id, end).unwrap();
    assert_eq!(after.assignment.source(), Source::Schedule);
    assert_eq!(after.assignment.primary(), Some(m[0]));

    let later = resolver
        .resolve(&ctx, roster.id, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        .unwrap();
    assert_eq!(later.assignment.source(), Source::Unassigned);
}
