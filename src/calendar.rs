//! Export iCalendar (RFC 5545) du planning résolu d'un roster.

use crate::error::Result;
use crate::model::{Override, Roster, RosterId, ScheduleEntry, UserId};
use crate::storage::RosterRepository;
use crate::timeutil;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
const PRODID: &str = "-//releve//on-call rotations//EN";
const UID_DOMAIN: &str = "releve";
const MAX_LINE_OCTETS: usize = 75;

pub struct CalendarExporter<'a> {
    repo: &'a RosterRepository,
}

impl<'a> CalendarExporter<'a> {
    pub fn new(repo: &'a RosterRepository) -> Self {
        Self { repo }
    }

    /// Document complet : une VEVENT par semaine et une par override.
    pub fn export(&self, roster: RosterId, generated_at: DateTime<Utc>) -> Result<String> {
        let r = self.repo.get_roster(roster)?;
        let entries = self.repo.list_schedule(roster, None, None)?;
        let overrides = self.repo.list_overrides(roster, None, None)?;
        let mut names: HashMap<UserId, String> = self
            .repo
            .list_members(roster, false)?
            .into_iter()
            .map(|m| (m.user_id, m.display_name()))
            .collect();
        // overrides et éditions manuelles peuvent viser des non-membres
        let referenced = overrides.iter().map(|o| o.user_id).chain(
            entries
                .iter()
                .flat_map(|e| e.primary.into_iter().chain(e.secondary)),
        );
        for user in referenced.collect::<Vec<_>>() {
            if names.contains_key(&user) {
                continue;
            }
            if let Some(u) = self.repo.get_user(user)? {
                names.insert(user, u.name);
            }
        }
        Ok(render_calendar(&r, &entries, &overrides, &names, generated_at))
    }

    /// Nom de fichier proposé dans `Content-Disposition`.
    pub fn file_name(roster: &Roster) -> String {
        let slug: String = roster
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("{}-oncall.ics", slug.trim_matches('-'))
    }
}

pub fn render_calendar(
    roster: &Roster,
    entries: &[ScheduleEntry],
    overrides: &[Override],
    names: &HashMap<UserId, String>,
    generated_at: DateTime<Utc>,
) -> String {
    let name_of = |user: UserId| {
        names
            .get(&user)
            .cloned()
            .unwrap_or_else(|| user.to_string())
    };
    let stamp = format_utc(generated_at);

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        format!("X-WR-CALNAME:{}", escape_text(&format!("{} on-call", roster.name))),
        format!("X-WR-TIMEZONE:{}", roster.timezone.name()),
    ];

    for entry in entries {
        let (start, end) = timeutil::week_bounds(roster, entry.week_start);
        let summary = match entry.primary {
            Some(p) => format!("On-call: {}", name_of(p)),
            None => "Unassigned".to_string(),
        };
        let mut description = vec![format!(
            "Primary: {}",
            entry.primary.map(name_of).unwrap_or_else(|| "unassigned".into())
        )];
        if let Some(s) = entry.secondary {
            description.push(format!("Secondary: {}", name_of(s)));
        }
        if let Some(notes) = &entry.notes {
            description.push(notes.clone());
        }
        lines.extend(event(
            &format!(
                "{}-{}@{UID_DOMAIN}",
                roster.id,
                entry.week_start.format("%Y%m%d")
            ),
            &stamp,
            start,
            end,
            &summary,
            &description.join("\n"),
        ));
    }

    for ov in overrides {
        let description = ov.reason.clone().unwrap_or_else(|| "Manual override".into());
        lines.extend(event(
            &format!("{}@{UID_DOMAIN}", ov.id),
            &stamp,
            ov.start_at,
            ov.end_at,
            &format!("Override: {}", name_of(ov.user_id)),
            &description,
        ));
    }

    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

fn event(
    uid: &str,
    stamp: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    summary: &str,
    description: &str,
) -> Vec<String> {
    vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{uid}"),
        format!("DTSTAMP:{stamp}"),
        format!("DTSTART:{}", format_utc(start)),
        format!("DTEND:{}", format_utc(end)),
        format!("SUMMARY:{}", escape_text(summary)),
        format!("DESCRIPTION:{}", escape_text(description)),
        "TRANSP:TRANSPARENT".to_string(),
        "END:VEVENT".to_string(),
    ]
}

fn format_utc(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Échappement TEXT (RFC 5545 §3.3.11).
fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Repli des lignes à 75 octets, sans couper un caractère UTF-8.
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    let mut limit = MAX_LINE_OCTETS;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > limit {
            out.push_str("\r\n ");
            width = 0;
            // l'espace de continuation compte dans la ligne
            limit = MAX_LINE_OCTETS - 1;
        }
        out.push(c);
        width += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_text_values() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn folds_long_lines_on_char_boundaries() {
        let line = format!("DESCRIPTION:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS, "{}", part.len());
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }
}
