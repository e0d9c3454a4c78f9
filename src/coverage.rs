//! Matrice de couverture multi-rosters et intervalles sans astreinte.
//!
//! Plannings et overrides sont chargés une fois par roster pour toute la
//! plage ; chaque créneau n'est ensuite résolu qu'en mémoire.

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::model::{Override, Roster, RosterId, ScheduleEntry, UserId};
use crate::resolver::{Assignment, Source};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_RESOLUTION_MINUTES: i64 = 60;
const MAX_SLOTS: i64 = 20_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterCoverage {
    pub roster_id: RosterId,
    pub roster_name: String,
    pub source: Source,
    pub primary: UserId,
    pub secondary: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub coverage: Vec<RosterCoverage>,
    pub gap: bool,
}

/// Plus longue suite contiguë de créneaux sans couverture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Affichage seulement, tronqué à la minute.
    pub duration_minutes: i64,
}

impl GapInfo {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub resolution_minutes: i64,
    pub slots: Vec<CoverageSlot>,
    pub gaps: Vec<GapInfo>,
    pub total_gap_hours: f64,
}

/// Données d'un roster pour toute la plage demandée, propres à la requête.
struct RosterCache {
    roster: Roster,
    entries: Vec<ScheduleEntry>,
    overrides: Vec<Override>,
}

impl RosterCache {
    fn load(
        repo: &RosterRepository,
        roster: Roster,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Self> {
        // une semaine en arrière pour attraper la semaine partielle du début
        let from_date = timeutil::local_date(roster.timezone, from) - Duration::days(7);
        let to_date = timeutil::local_date(roster.timezone, to) + Duration::days(1);
        let entries = repo.list_schedule(roster.id, Some(from_date), Some(to_date))?;
        let overrides = repo.list_overrides(roster.id, Some(from), Some(to))?;
        Ok(Self {
            roster,
            entries,
            overrides,
        })
    }

    fn on_duty(&self, at: DateTime<Utc>) -> bool {
        if !self.roster.is_follow_the_sun {
            return true;
        }
        let (start, end) = self.roster.active_window();
        let local = at.with_timezone(&self.roster.timezone).time();
        timeutil::within_window(local, start, end)
    }

    fn assignment_at(&self, at: DateTime<Utc>) -> Assignment {
        // overrides triés par début : le premier qui contient `at` gagne
        let active = self.overrides.iter().find(|o| o.contains(at));
        let week = timeutil::week_start_containing(&self.roster, at);
        let entry = self.entries.iter().find(|e| e.week_start == week);
        Assignment::select(active, entry)
    }

    fn coverage_at(&self, at: DateTime<Utc>) -> Option<RosterCoverage> {
        if !self.on_duty(at) {
            return None;
        }
        let assignment = self.assignment_at(at);
        assignment.primary().map(|primary| RosterCoverage {
            roster_id: self.roster.id,
            roster_name: self.roster.name.clone(),
            source: assignment.source(),
            primary,
            secondary: assignment.secondary(),
        })
    }
}

pub struct CoverageAnalyzer<'a> {
    repo: &'a RosterRepository,
}

impl<'a> CoverageAnalyzer<'a> {
    pub fn new(repo: &'a RosterRepository) -> Self {
        Self { repo }
    }

    /// Couverture de `[from, to)` découpée en créneaux de `resolution`.
    pub fn coverage(
        &self,
        ctx: &CallContext,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        resolution: Duration,
    ) -> Result<CoverageReport> {
        if to <= from {
            return Err(Error::validation("coverage range end must be after start"));
        }
        if resolution < Duration::minutes(1) {
            return Err(Error::validation("coverage resolution must be at least one minute"));
        }
        let slot_count = (to - from).num_minutes() / resolution.num_minutes();
        if slot_count > MAX_SLOTS {
            return Err(Error::validation(format!(
                "coverage range too large: {slot_count} slots (max {MAX_SLOTS})"
            )));
        }

        let mut caches = Vec::new();
        for roster in self.repo.list_rosters(true)? {
            ctx.check("coverage")?;
            caches.push(RosterCache::load(self.repo, roster, from, to)?);
        }
        debug!(rosters = caches.len(), slots = slot_count, "coverage caches loaded");

        let mut slots = Vec::new();
        let mut gaps = Vec::new();
        let mut open_gap: Option<DateTime<Utc>> = None;
        let mut start = from;
        while start < to {
            ctx.check("coverage")?;
            let end = start
                .checked_add_signed(resolution)
                .map_or(to, |end| end.min(to));
            let coverage: Vec<RosterCoverage> =
                caches.iter().filter_map(|c| c.coverage_at(start)).collect();
            let gap = coverage.is_empty();

            match (gap, open_gap) {
                (true, None) => open_gap = Some(start),
                (false, Some(gap_start)) => {
                    gaps.push(GapInfo::new(gap_start, start));
                    open_gap = None;
                }
                _ => {}
            }

            slots.push(CoverageSlot {
                start,
                end,
                coverage,
                gap,
            });
            start = end;
        }
        if let Some(gap_start) = open_gap {
            gaps.push(GapInfo::new(gap_start, to));
        }

        // à la seconde près : `duration_minutes` est tronqué
        let total_seconds: i64 = gaps.iter().map(|g| g.duration().num_seconds()).sum();
        Ok(CoverageReport {
            from,
            to,
            resolution_minutes: resolution.num_minutes(),
            slots,
            gaps,
            total_gap_hours: total_seconds as f64 / 3600.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HandoffDay, NewRoster, ScheduleEntry};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    #[test]
    fn contiguous_gap_slots_collapse_into_one_gap() {
        let repo = RosterRepository::open_in_memory().unwrap();
        let roster = repo
            .create_roster(&NewRoster::new(
                "db",
                Tz::UTC,
                timeutil::parse_time_of_day("00:00").unwrap(),
                HandoffDay::new(0).unwrap(),
            ))
            .unwrap();
        // semaine du dimanche 2026-02-01 seulement
        let week = timeutil::parse_date("2026-02-01").unwrap();
        repo.upsert_generated_week(&ScheduleEntry::generated(
            roster.id,
            week,
            Some(UserId::random()),
            None,
        ))
        .unwrap();

        let from = Utc.with_ymd_and_hms(2026, 2, 7, 20, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 8, 3, 0, 0).unwrap();
        let report = CoverageAnalyzer::new(&repo)
            .coverage(&CallContext::background(), from, to, Duration::minutes(60))
            .unwrap();
        assert_eq!(report.slots.len(), 7);
        assert_eq!(report.gaps.len(), 1);
        let gap = &report.gaps[0];
        assert_eq!(gap.start, Utc.with_ymd_and_hms(2026, 2, 8, 0, 0, 0).unwrap());
        assert_eq!(gap.end, to);
        assert_eq!(gap.duration(), Duration::hours(3));
        assert!((report.total_gap_hours - 3.0).abs() < f64::EPSILON);
        assert!(report.slots.iter().filter(|s| s.gap).all(|s| s.coverage.is_empty()));
    }

    #[test]
    fn gap_total_keeps_seconds() {
        let repo = RosterRepository::open_in_memory().unwrap();
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 30).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 1, 1, 0, 0).unwrap();
        let report = CoverageAnalyzer::new(&repo)
            .coverage(&CallContext::background(), from, to, Duration::minutes(60))
            .unwrap();
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].duration(), Duration::seconds(3570));
        assert!((report.total_gap_hours - 3570.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_resolution_yields_one_clipped_slot() {
        let repo = RosterRepository::open_in_memory().unwrap();
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let to = from + Duration::hours(1);
        let report = CoverageAnalyzer::new(&repo)
            .coverage(
                &CallContext::background(),
                from,
                to,
                Duration::days(365 * 300_000),
            )
            .unwrap();
        assert_eq!(report.slots.len(), 1);
        assert_eq!(report.slots[0].end, to);
        assert!((report.total_gap_hours - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_range() {
        let repo = RosterRepository::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let err = CoverageAnalyzer::new(&repo)
            .coverage(&CallContext::background(), at, at, Duration::minutes(60))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
