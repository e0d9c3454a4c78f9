use crate::context::CallContext;
use crate::error::Result;
use crate::model::{Roster, RosterId, UserId};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tracing::{debug, error, warn};

/// Passage de relais détecté pour un roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoffEvent {
    pub roster_id: RosterId,
    pub roster_name: String,
    pub at: DateTime<Utc>,
    pub week_start: NaiveDate,
    pub outgoing: Option<Crew>,
    pub incoming: Option<Crew>,
}

/// Équipe d'une semaine, avec les noms d'affichage connus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crew {
    pub primary: Option<UserId>,
    pub primary_name: Option<String>,
    pub secondary: Option<UserId>,
    pub secondary_name: Option<String>,
}

/// Permet de customiser le rendu du message (texte, chat, etc.).
pub trait HandoffRenderer {
    fn render(&self, event: &HandoffEvent) -> String;
}

/// Gabarit texte simple.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextHandoff;

impl HandoffRenderer for TextHandoff {
    fn render(&self, event: &HandoffEvent) -> String {
        let who = |crew: &Option<Crew>| {
            crew
                .as_ref()
                .and_then(|s| s.primary_name.clone().or_else(|| s.primary.map(|u| u.to_string())))
                .unwrap_or_else(|| "nobody".to_string())
        };
        format!(
            "Handoff for {roster} at {at}: {out} -> {inc} (week of {week}).\n",
            roster = event.roster_name,
            at = event.at.to_rfc3339(),
            out = who(&event.outgoing),
            inc = who(&event.incoming),
            week = event.week_start,
        )
    }
}

/// Destination des événements ; la livraison elle-même est externe.
pub trait HandoffSink {
    fn deliver(&mut self, event: &HandoffEvent) -> anyhow::Result<()>;
}

impl HandoffSink for Vec<HandoffEvent> {
    fn deliver(&mut self, event: &HandoffEvent) -> anyhow::Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Détecte, tick après tick, les relèves tombées dans `(dernier tick, now]`.
#[derive(Debug, Clone)]
pub struct HandoffTicker {
    last_tick: DateTime<Utc>,
}

impl HandoffTicker {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { last_tick: start }
    }

    pub fn last_tick(&self) -> DateTime<Utc> {
        self.last_tick
    }

    pub fn tick(&mut self, repo: &RosterRepository, now: DateTime<Utc>) -> Result<Vec<HandoffEvent>> {
        if now <= self.last_tick {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();
        for roster in repo.list_rosters(true)? {
            events.extend(handoffs_between(repo, &roster, self.last_tick, now)?);
        }
        events.sort_by_key(|e| e.at);
        self.last_tick = now;
        Ok(events)
    }
}

/// Relèves d'un roster dans `(after, until]`, dans l'ordre chronologique.
pub fn handoffs_between(
    repo: &RosterRepository,
    roster: &Roster,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<HandoffEvent>> {
    let mut weeks = Vec::new();
    let mut week = timeutil::week_start_containing(roster, until);
    loop {
        let at = timeutil::handoff_instant(roster, week);
        if at <= after {
            break;
        }
        weeks.push((week, at));
        week = week - Duration::weeks(1);
    }
    if weeks.is_empty() {
        return Ok(Vec::new());
    }
    weeks.reverse();

    let names: HashMap<UserId, String> = repo
        .list_members(roster.id, false)?
        .into_iter()
        .filter_map(|m| m.name.clone().map(|n| (m.user_id, n)))
        .collect();
    let crew_of = |date: NaiveDate| -> Result<Option<Crew>> {
        Ok(repo.get_week(roster.id, date)?.map(|e| Crew {
            primary: e.primary,
            primary_name: e.primary.and_then(|u| names.get(&u).cloned()),
            secondary: e.secondary,
            secondary_name: e.secondary.and_then(|u| names.get(&u).cloned()),
        }))
    };

    let mut out = Vec::with_capacity(weeks.len());
    for (week_start, at) in weeks {
        out.push(HandoffEvent {
            roster_id: roster.id,
            roster_name: roster.name.clone(),
            at,
            week_start,
            outgoing: crew_of(week_start - Duration::weeks(1))?,
            incoming: crew_of(week_start)?,
        });
    }
    debug!(roster = %roster.id, count = out.len(), "handoffs detected");
    Ok(out)
}

/// Boucle du worker : un tick par intervalle jusqu'à annulation du contexte.
///
/// Une erreur de tick ou de livraison est journalisée, jamais propagée.
pub fn run_ticker<S: HandoffSink>(
    repo: &RosterRepository,
    ctx: &CallContext,
    ticker: &mut HandoffTicker,
    interval: StdDuration,
    sink: &mut S,
) {
    let step = StdDuration::from_millis(200).min(interval);
    while !ctx.is_cancelled() {
        match ticker.tick(repo, Utc::now()) {
            Ok(events) => {
                for event in &events {
                    if let Err(err) = sink.deliver(event) {
                        warn!(roster = %event.roster_id, error = %err, "handoff delivery failed");
                    }
                }
            }
            Err(err) => error!(error = %err, "handoff tick failed"),
        }
        let mut waited = StdDuration::ZERO;
        while waited < interval && !ctx.is_cancelled() {
            std::thread::sleep(step);
            waited += step;
        }
    }
}
