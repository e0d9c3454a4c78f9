//! Passe périodique de complétion des plannings, tous tenants confondus.

use crate::context::CallContext;
use crate::error::Result;
use crate::model::RosterId;
use crate::scheduler::{GenerateOptions, ScheduleGenerator};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

/// Base d'un tenant, désignée par son nom.
pub struct Tenant<'a> {
    pub name: &'a str,
    pub repo: &'a RosterRepository,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopupFailure {
    pub tenant: String,
    pub roster_id: Option<RosterId>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopupReport {
    pub rosters: usize,
    pub weeks_written: usize,
    pub skipped_ended: usize,
    pub failures: Vec<TopupFailure>,
}

/// Génère `schedule_weeks_ahead` semaines pour chaque roster actif de
/// chaque tenant, l'un après l'autre. Un échec est journalisé et consigné,
/// la passe continue.
pub fn topup_tenants(
    ctx: &CallContext,
    tenants: &[Tenant<'_>],
    options: &GenerateOptions,
    now: DateTime<Utc>,
) -> Result<TopupReport> {
    let mut report = TopupReport::default();
    for tenant in tenants {
        let rosters = match tenant.repo.list_rosters(true) {
            Ok(r) => r,
            Err(err) => {
                error!(tenant = tenant.name, error = %err, "listing rosters failed");
                report.failures.push(TopupFailure {
                    tenant: tenant.name.to_string(),
                    roster_id: None,
                    error: err.to_string(),
                });
                continue;
            }
        };
        let generator = ScheduleGenerator::with_options(tenant.repo, options.clone());
        for roster in rosters {
            ctx.check("schedule top-up")?;
            if roster.ended_before(timeutil::local_date(roster.timezone, now)) {
                report.skipped_ended += 1;
                continue;
            }
            report.rosters += 1;
            match generator.generate_ahead(ctx, roster.id, now) {
                Ok(weeks) => report.weeks_written += weeks.len(),
                Err(err) => {
                    error!(tenant = tenant.name, roster = %roster.id, error = %err, "schedule top-up failed");
                    report.failures.push(TopupFailure {
                        tenant: tenant.name.to_string(),
                        roster_id: Some(roster.id),
                        error: err.to_string(),
                    });
                }
            }
        }
    }
    info!(
        rosters = report.rosters,
        weeks = report.weeks_written,
        failures = report.failures.len(),
        "schedule top-up done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HandoffDay, NewRoster, User};
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;

    fn roster(repo: &RosterRepository, name: &str) -> RosterId {
        let r = repo
            .create_roster(&NewRoster::new(
                name,
                Tz::UTC,
                timeutil::parse_time_of_day("09:00").unwrap(),
                HandoffDay::new(1).unwrap(),
            ))
            .unwrap();
        let u = User::new(format!("{name}-oncall"));
        repo.upsert_user(&u).unwrap();
        repo.add_member(r.id, u.id).unwrap();
        r.id
    }

    #[test]
    fn one_failing_roster_does_not_stop_the_pass() {
        let a = RosterRepository::open_in_memory().unwrap();
        let b = RosterRepository::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        roster(&a, "api");
        let busy = roster(&b, "db");
        roster(&b, "web");
        // un autre générateur tient le bail de "db" (horloge réelle)
        assert!(b
            .try_acquire_lease(busy, "someone-else", Utc::now(), Duration::minutes(5))
            .unwrap());

        let tenants = [Tenant { name: "acme", repo: &a }, Tenant { name: "globex", repo: &b }];
        let report = topup_tenants(
            &CallContext::background(),
            &tenants,
            &GenerateOptions::default(),
            now,
        )
        .unwrap();
        assert_eq!(report.rosters, 3);
        assert_eq!(report.weeks_written, 24);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].tenant, "globex");
        assert_eq!(report.failures[0].roster_id, Some(busy));
    }

    #[test]
    fn ended_rosters_are_skipped() {
        let repo = RosterRepository::open_in_memory().unwrap();
        let mut new = NewRoster::new(
            "legacy",
            Tz::UTC,
            timeutil::parse_time_of_day("09:00").unwrap(),
            HandoffDay::new(1).unwrap(),
        );
        new.end_date = Some(timeutil::parse_date("2026-01-01").unwrap());
        repo.create_roster(&new).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let report = topup_tenants(
            &CallContext::background(),
            &[Tenant { name: "acme", repo: &repo }],
            &GenerateOptions::default(),
            now,
        )
        .unwrap();
        assert_eq!(report.skipped_ended, 1);
        assert_eq!(report.rosters, 0);
    }
}
