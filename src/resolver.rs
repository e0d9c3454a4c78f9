//! Qui est d'astreinte, pour un roster et un instant donnés.
//!
//! Priorité : override > planning > personne.

use crate::context::CallContext;
use crate::error::Result;
use crate::model::{Override, Roster, RosterId, ScheduleEntry, UserId};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Provenance d'une réponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Override,
    Schedule,
    Unassigned,
}

/// Résultat de la résolution : chaque variante doit être traitée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Override actif ; le secondaire éventuel vient du planning, pour affichage.
    Override {
        active: Override,
        secondary: Option<UserId>,
        week_start: Option<NaiveDate>,
    },
    Schedule {
        week_start: NaiveDate,
        primary: Option<UserId>,
        secondary: Option<UserId>,
    },
    Unassigned,
}

impl Assignment {
    /// Applique la priorité override > planning > personne.
    pub fn select(active: Option<&Override>, entry: Option<&ScheduleEntry>) -> Self {
        match (active, entry) {
            (Some(ov), entry) => Self::Override {
                active: ov.clone(),
                secondary: entry.and_then(|e| e.secondary),
                week_start: entry.map(|e| e.week_start),
            },
            (None, Some(e)) => Self::Schedule {
                week_start: e.week_start,
                primary: e.primary,
                secondary: e.secondary,
            },
            (None, None) => Self::Unassigned,
        }
    }

    pub fn source(&self) -> Source {
        match self {
            Self::Override { .. } => Source::Override,
            Self::Schedule { .. } => Source::Schedule,
            Self::Unassigned => Source::Unassigned,
        }
    }

    pub fn primary(&self) -> Option<UserId> {
        match self {
            Self::Override { active, .. } => Some(active.user_id),
            Self::Schedule { primary, .. } => *primary,
            Self::Unassigned => None,
        }
    }

    pub fn secondary(&self) -> Option<UserId> {
        match self {
            Self::Override { secondary, .. } | Self::Schedule { secondary, .. } => *secondary,
            Self::Unassigned => None,
        }
    }

    pub fn week_start(&self) -> Option<NaiveDate> {
        match self {
            Self::Override { week_start, .. } => *week_start,
            Self::Schedule { week_start, .. } => Some(*week_start),
            Self::Unassigned => None,
        }
    }
}

/// Réponse complète, sérialisée au format de `GET /rosters/{id}/oncall`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "OnCallBody")]
pub struct OnCall {
    pub roster_id: RosterId,
    pub roster_name: String,
    pub queried_at: DateTime<Utc>,
    pub assignment: Assignment,
}

#[derive(Serialize)]
struct OnCallBody {
    roster_id: RosterId,
    roster_name: String,
    queried_at: DateTime<Utc>,
    source: Source,
    primary: Option<UserId>,
    secondary: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    week_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_override: Option<Override>,
}

impl From<OnCall> for OnCallBody {
    fn from(on_call: OnCall) -> Self {
        let a = &on_call.assignment;
        Self {
            source: a.source(),
            primary: a.primary(),
            secondary: a.secondary(),
            week_start: a.week_start(),
            active_override: match a {
                Assignment::Override { active, .. } => Some(active.clone()),
                _ => None,
            },
            roster_id: on_call.roster_id,
            roster_name: on_call.roster_name,
            queried_at: on_call.queried_at,
        }
    }
}

pub struct OnCallResolver<'a> {
    repo: &'a RosterRepository,
}

impl<'a> OnCallResolver<'a> {
    pub fn new(repo: &'a RosterRepository) -> Self {
        Self { repo }
    }

    pub fn resolve(&self, ctx: &CallContext, roster: RosterId, at: DateTime<Utc>) -> Result<OnCall> {
        ctx.check("on-call resolution")?;
        let r = self.repo.get_roster(roster)?;
        let active = self.repo.active_override(roster, at)?;
        let entry = self.entry_at(&r, at)?;
        Ok(OnCall {
            roster_id: r.id,
            roster_name: r.name,
            queried_at: at,
            assignment: Assignment::select(active.as_ref(), entry.as_ref()),
        })
    }

    /// Semaine de planning dont `[début, fin)` (relève locale) contient `at`.
    fn entry_at(&self, roster: &Roster, at: DateTime<Utc>) -> Result<Option<ScheduleEntry>> {
        let week = timeutil::week_start_containing(roster, at);
        self.repo.get_week(roster.id, week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HandoffDay, NewOverride, NewRoster, ScheduleEntry};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn setup() -> (RosterRepository, Roster) {
        let repo = RosterRepository::open_in_memory().unwrap();
        let new = NewRoster::new(
            "payments",
            Tz::UTC,
            timeutil::parse_time_of_day("08:00").unwrap(),
            HandoffDay::new(0).unwrap(),
        );
        let roster = repo.create_roster(&new).unwrap();
        (repo, roster)
    }

    #[test]
    fn override_beats_schedule() {
        let (repo, roster) = setup();
        let (x, y, z) = (UserId::random(), UserId::random(), UserId::random());
        let week = timeutil::parse_date("2026-02-01").unwrap(); // dimanche
        repo.upsert_generated_week(&ScheduleEntry::generated(roster.id, week, Some(y), Some(z)))
            .unwrap();
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        repo.create_override(roster.id, &NewOverride::new(x, start, end).unwrap(), None)
            .unwrap();

        let resolver = OnCallResolver::new(&repo);
        let ctx = CallContext::background();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let on_call = resolver.resolve(&ctx, roster.id, at).unwrap();
        assert_eq!(on_call.assignment.source(), Source::Override);
        assert_eq!(on_call.assignment.primary(), Some(x));
        assert_eq!(on_call.assignment.secondary(), Some(z));

        let later = Utc.with_ymd_and_hms(2026, 2, 3, 12, 0, 0).unwrap();
        let on_call = resolver.resolve(&ctx, roster.id, later).unwrap();
        assert_eq!(on_call.assignment.source(), Source::Schedule);
        assert_eq!(on_call.assignment.primary(), Some(y));
    }

    #[test]
    fn before_handoff_time_belongs_to_previous_week() {
        let (repo, roster) = setup();
        let y = UserId::random();
        let week = timeutil::parse_date("2026-02-01").unwrap();
        repo.upsert_generated_week(&ScheduleEntry::generated(roster.id, week, Some(y), None))
            .unwrap();
        let resolver = OnCallResolver::new(&repo);
        let ctx = CallContext::background();

        let early = Utc.with_ymd_and_hms(2026, 2, 1, 7, 59, 0).unwrap();
        let on_call = resolver.resolve(&ctx, roster.id, early).unwrap();
        assert_eq!(on_call.assignment, Assignment::Unassigned);

        let last_minute = Utc.with_ymd_and_hms(2026, 2, 8, 7, 59, 0).unwrap();
        let on_call = resolver.resolve(&ctx, roster.id, last_minute).unwrap();
        assert_eq!(on_call.assignment.primary(), Some(y));
    }

    #[test]
    fn serializes_with_source_tag() {
        let (repo, roster) = setup();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let on_call = OnCallResolver::new(&repo)
            .resolve(&CallContext::background(), roster.id, at)
            .unwrap();
        let json = serde_json::to_value(&on_call).unwrap();
        assert_eq!(json["source"], "unassigned");
        assert_eq!(json["roster_name"], "payments");
        assert!(json["primary"].is_null());
        assert!(json.get("week_start").is_none());
    }
}
