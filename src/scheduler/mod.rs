//! Génération des semaines d'astreinte.
//!
//! Les semaines sont traitées strictement dans l'ordre : les compteurs
//! d'équité et la chaîne de semaines consécutives en dépendent.

mod fairness;
mod types;

pub use fairness::{FairnessState, Tally};
pub use types::GenerateOptions;

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::model::{Roster, RosterId, ScheduleEntry, UserId, MAX_WEEKS_AHEAD};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Générateur : emprunte la connexion du dépôt pour la durée d'une passe.
pub struct ScheduleGenerator<'a> {
    repo: &'a RosterRepository,
    options: GenerateOptions,
}

impl<'a> ScheduleGenerator<'a> {
    pub fn new(repo: &'a RosterRepository) -> Self {
        Self::with_options(repo, GenerateOptions::default())
    }

    pub fn with_options(repo: &'a RosterRepository, options: GenerateOptions) -> Self {
        Self { repo, options }
    }

    /// Complète le planning jusqu'à `schedule_weeks_ahead` semaines après `now`.
    pub fn generate_ahead(
        &self,
        ctx: &CallContext,
        roster: RosterId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleEntry>> {
        let r = self.repo.get_roster(roster)?;
        // avant l'heure de relève, la semaine en cours a commencé 7 jours plus tôt
        let from = timeutil::week_start_containing(&r, now);
        self.generate(ctx, roster, from, r.schedule_weeks_ahead)
    }

    /// Produit ou met à jour `weeks` semaines consécutives à partir de la
    /// semaine de relève contenant `from`.
    ///
    /// Renvoie les semaines touchées (verrouillées conservées et générées),
    /// dans l'ordre. Une erreur ou une annulation en cours de route laisse
    /// les semaines déjà écrites en base.
    pub fn generate(
        &self,
        ctx: &CallContext,
        roster: RosterId,
        from: NaiveDate,
        weeks: u32,
    ) -> Result<Vec<ScheduleEntry>> {
        ctx.check("schedule generation")?;
        if weeks > MAX_WEEKS_AHEAD {
            return Err(Error::validation(format!(
                "cannot generate more than {MAX_WEEKS_AHEAD} weeks at once, got {weeks}"
            )));
        }
        let r = self.repo.get_roster(roster)?;

        let holder = self.options.lease_holder.as_str();
        if !self
            .repo
            .try_acquire_lease(roster, holder, Utc::now(), self.options.lease_ttl)?
        {
            return Err(Error::Conflict(format!(
                "schedule generation already running for roster {roster}"
            )));
        }

        let result = self.generate_leased(ctx, &r, from, weeks);

        if let Err(err) = self.repo.release_lease(roster, holder) {
            warn!(roster = %roster, error = %err, "failed to release generation lease");
        }
        result
    }

    fn generate_leased(
        &self,
        ctx: &CallContext,
        roster: &Roster,
        from: NaiveDate,
        weeks: u32,
    ) -> Result<Vec<ScheduleEntry>> {
        let members: Vec<UserId> = self
            .repo
            .list_members(roster.id, true)?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        if members.is_empty() {
            warn!(roster = %roster.id, name = %roster.name, "no active members, nothing to generate");
            return Ok(Vec::new());
        }
        if weeks == 0 {
            return Ok(Vec::new());
        }

        let start = timeutil::align_to_handoff_day(from, roster.handoff_day);
        let end = start
            .checked_add_signed(Duration::weeks(i64::from(weeks)))
            .ok_or_else(|| Error::validation(format!("week {start} is out of range")))?;

        // Seules les semaines antérieures à la fenêtre comptent : celles de la
        // fenêtre vont être réécrites.
        let primary = self.repo.primary_weeks_served(roster.id, Some(start))?;
        let secondary = self.repo.secondary_weeks_served(roster.id, Some(start))?;
        let (last, consecutive) = self.seed_chain(roster, start)?;
        let mut state =
            FairnessState::seeded(&members, &primary, &secondary, roster.max_consecutive_weeks)
                .with_chain(last, consecutive);

        let existing: HashMap<NaiveDate, ScheduleEntry> = self
            .repo
            .list_schedule(roster.id, Some(start), Some(end))?
            .into_iter()
            .map(|e| (e.week_start, e))
            .collect();

        // `weeks` borné par MAX_WEEKS_AHEAD plus haut
        let mut out = Vec::with_capacity(weeks as usize);
        for i in 0..weeks {
            ctx.check("schedule generation")?;
            let week_start = start + Duration::weeks(i64::from(i));
            if roster.ended_before(week_start) {
                debug!(roster = %roster.id, %week_start, "roster end date reached");
                break;
            }

            if let Some(locked) = existing.get(&week_start).filter(|e| e.locked) {
                state = state.after_week(locked.primary, locked.secondary);
                out.push(locked.clone());
                continue;
            }

            let entry = next_entry(&state, roster.id, week_start);
            if self.repo.upsert_generated_week(&entry)? {
                debug!(
                    roster = %roster.id,
                    %week_start,
                    primary = ?entry.primary,
                    secondary = ?entry.secondary,
                    "week generated"
                );
                state = state.after_week(entry.primary, entry.secondary);
                out.push(entry);
            } else {
                // verrouillée entre la lecture et l'écriture : on la garde
                let locked = self.repo.require_week(roster.id, week_start)?;
                state = state.after_week(locked.primary, locked.secondary);
                out.push(locked);
            }
        }

        info!(
            roster = %roster.id,
            %start,
            weeks = out.len(),
            locked = out.iter().filter(|e| e.locked).count(),
            "schedule generated"
        );
        Ok(out)
    }

    /// Remonte semaine par semaine tant que le même primaire se répète,
    /// au plus `max_consecutive_weeks` lectures.
    fn seed_chain(&self, roster: &Roster, first_week: NaiveDate) -> Result<(Option<UserId>, u32)> {
        let mut last = None;
        let mut count = 0u32;
        for i in 1..=roster.max_consecutive_weeks {
            let week = first_week - Duration::weeks(i64::from(i));
            let Some(primary) = self
                .repo
                .get_week(roster.id, week)?
                .and_then(|e| e.primary)
            else {
                break;
            };
            match last {
                None => {
                    last = Some(primary);
                    count = 1;
                }
                Some(l) if l == primary => count += 1,
                Some(_) => break,
            }
        }
        Ok((last, count))
    }
}

fn next_entry(state: &FairnessState, roster: RosterId, week_start: NaiveDate) -> ScheduleEntry {
    let primary = state.pick_primary();
    let secondary = primary.and_then(|p| state.pick_secondary(p));
    ScheduleEntry::generated(roster, week_start, primary, secondary)
}
