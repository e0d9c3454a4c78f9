use crate::error::{Error, Result};
use crate::timeutil::{serde_hhmm, serde_hhmm_opt, serde_hhmm_patch};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| Error::validation(format!("invalid {} id: {s:?}", $kind)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifiant fort pour Roster
    RosterId,
    "roster"
);
uuid_id!(
    /// Identifiant fort pour un utilisateur (annuaire externe)
    UserId,
    "user"
);
uuid_id!(OverrideId, "override");
uuid_id!(EscalationPolicyId, "escalation policy");

/// Jour de relève : 0 = dimanche … 6 = samedi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HandoffDay(u8);

impl HandoffDay {
    pub fn new(day: u8) -> Result<Self> {
        if day > 6 {
            return Err(Error::validation(format!(
                "handoff_day must be in 0..=6 (0=Sunday), got {day}"
            )));
        }
        Ok(Self(day))
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        Self(weekday.num_days_from_sunday() as u8)
    }

    pub fn weekday(self) -> Weekday {
        match self.0 {
            0 => Weekday::Sun,
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            _ => Weekday::Sat,
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for HandoffDay {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HandoffDay> for u8 {
    fn from(day: HandoffDay) -> u8 {
        day.0
    }
}

pub const DEFAULT_WEEKS_AHEAD: u32 = 12;
pub const DEFAULT_MAX_CONSECUTIVE_WEEKS: u32 = 2;
/// Borne haute de l'horizon de génération, en semaines.
pub const MAX_WEEKS_AHEAD: u32 = 104;

/// Roster d'astreinte.
///
/// Le jour et l'heure de relève alignent toutes les semaines générées ; ils
/// sont exprimés dans le fuseau `timezone` du roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub id: RosterId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timezone: Tz,
    #[serde(with = "serde_hhmm")]
    pub handoff_time: NaiveTime,
    pub handoff_day: HandoffDay,
    pub schedule_weeks_ahead: u32,
    pub max_consecutive_weeks: u32,
    pub is_follow_the_sun: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_roster_id: Option<RosterId>,
    #[serde(default, with = "serde_hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub active_hours_start: Option<NaiveTime>,
    #[serde(default, with = "serde_hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub active_hours_end: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_policy_id: Option<EscalationPolicyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Roster {
    /// Fenêtre active locale `[start, end)` d'un roster follow-the-sun.
    ///
    /// Sans heures explicites, 12 h à partir de l'heure de relève.
    pub fn active_window(&self) -> (NaiveTime, NaiveTime) {
        match (self.active_hours_start, self.active_hours_end) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                let (end, _) = self
                    .handoff_time
                    .overflowing_add_signed(Duration::hours(12));
                (self.handoff_time, end)
            }
        }
    }

    /// Le roster a-t-il dépassé sa date de fin à `date` ?
    pub fn ended_before(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end < date)
    }
}

/// Données de création d'un roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoster {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub timezone: Tz,
    #[serde(with = "serde_hhmm")]
    pub handoff_time: NaiveTime,
    pub handoff_day: HandoffDay,
    #[serde(default = "default_weeks_ahead")]
    pub schedule_weeks_ahead: u32,
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive_weeks: u32,
    #[serde(default)]
    pub is_follow_the_sun: bool,
    #[serde(default)]
    pub linked_roster_id: Option<RosterId>,
    #[serde(default, with = "serde_hhmm_opt")]
    pub active_hours_start: Option<NaiveTime>,
    #[serde(default, with = "serde_hhmm_opt")]
    pub active_hours_end: Option<NaiveTime>,
    #[serde(default)]
    pub escalation_policy_id: Option<EscalationPolicyId>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_weeks_ahead() -> u32 {
    DEFAULT_WEEKS_AHEAD
}

fn default_max_consecutive() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_WEEKS
}

impl NewRoster {
    pub fn new<S: Into<String>>(
        name: S,
        timezone: Tz,
        handoff_time: NaiveTime,
        handoff_day: HandoffDay,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            timezone,
            handoff_time,
            handoff_day,
            schedule_weeks_ahead: DEFAULT_WEEKS_AHEAD,
            max_consecutive_weeks: DEFAULT_MAX_CONSECUTIVE_WEEKS,
            is_follow_the_sun: false,
            linked_roster_id: None,
            active_hours_start: None,
            active_hours_end: None,
            escalation_policy_id: None,
            end_date: None,
        }
    }

    /// Valide les champs indépendants de la base (le lien vers le roster
    /// frère est vérifié par le dépôt).
    pub fn validate(&self) -> Result<()> {
        validate_fields(
            &self.name,
            self.schedule_weeks_ahead,
            self.max_consecutive_weeks,
            self.active_hours_start,
            self.active_hours_end,
        )
    }
}

/// Mise à jour partielle d'un roster ; `None` laisse le champ inchangé.
///
/// Les champs facultatifs du roster sont doublement optionnels :
/// `Some(None)` (`null` en JSON) les efface.
///
/// Le jour et l'heure de relève ne sont pas modifiables : ils alignent les
/// semaines déjà générées.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "patch_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub timezone: Option<Tz>,
    #[serde(default)]
    pub schedule_weeks_ahead: Option<u32>,
    #[serde(default)]
    pub max_consecutive_weeks: Option<u32>,
    #[serde(default)]
    pub is_follow_the_sun: Option<bool>,
    #[serde(
        default,
        deserialize_with = "patch_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub linked_roster_id: Option<Option<RosterId>>,
    #[serde(default, with = "serde_hhmm_patch", skip_serializing_if = "Option::is_none")]
    pub active_hours_start: Option<Option<NaiveTime>>,
    #[serde(default, with = "serde_hhmm_patch", skip_serializing_if = "Option::is_none")]
    pub active_hours_end: Option<Option<NaiveTime>>,
    #[serde(
        default,
        deserialize_with = "patch_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub escalation_policy_id: Option<Option<EscalationPolicyId>>,
    #[serde(
        default,
        deserialize_with = "patch_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Champ présent : `null` devient `Some(None)`, absent reste `None` via `default`.
fn patch_field<'de, T, D>(d: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

impl RosterPatch {
    /// Applique le patch sur une copie du roster et valide le résultat.
    pub fn apply(&self, roster: &Roster) -> Result<Roster> {
        let mut out = roster.clone();
        if let Some(name) = &self.name {
            out.name = name.clone();
        }
        if let Some(desc) = &self.description {
            out.description = desc.clone();
        }
        if let Some(tz) = self.timezone {
            out.timezone = tz;
        }
        if let Some(w) = self.schedule_weeks_ahead {
            out.schedule_weeks_ahead = w;
        }
        if let Some(m) = self.max_consecutive_weeks {
            out.max_consecutive_weeks = m;
        }
        if let Some(fts) = self.is_follow_the_sun {
            out.is_follow_the_sun = fts;
        }
        if let Some(link) = self.linked_roster_id {
            out.linked_roster_id = link;
        }
        if let Some(t) = self.active_hours_start {
            out.active_hours_start = t;
        }
        if let Some(t) = self.active_hours_end {
            out.active_hours_end = t;
        }
        if let Some(p) = self.escalation_policy_id {
            out.escalation_policy_id = p;
        }
        if let Some(d) = self.end_date {
            out.end_date = d;
        }
        if let Some(active) = self.is_active {
            out.is_active = active;
        }
        validate_fields(
            &out.name,
            out.schedule_weeks_ahead,
            out.max_consecutive_weeks,
            out.active_hours_start,
            out.active_hours_end,
        )?;
        if out.linked_roster_id == Some(out.id) {
            return Err(Error::validation("a roster cannot be linked to itself"));
        }
        Ok(out)
    }
}

fn validate_fields(
    name: &str,
    weeks_ahead: u32,
    max_consecutive: u32,
    active_start: Option<NaiveTime>,
    active_end: Option<NaiveTime>,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("roster name cannot be empty"));
    }
    if !(1..=MAX_WEEKS_AHEAD).contains(&weeks_ahead) {
        return Err(Error::validation(format!(
            "schedule_weeks_ahead must be in 1..={MAX_WEEKS_AHEAD}, got {weeks_ahead}"
        )));
    }
    if max_consecutive == 0 {
        return Err(Error::validation("max_consecutive_weeks must be >= 1"));
    }
    if active_start.is_some() != active_end.is_some() {
        return Err(Error::validation(
            "active_hours_start and active_hours_end must be set together",
        ));
    }
    Ok(())
}

/// Utilisateur connu du dépôt (nom d'affichage uniquement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            id: UserId::random(),
            name: name.into(),
            email: None,
        }
    }
}

/// Membre d'un roster. Seuls les membres actifs participent à la génération.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub roster_id: RosterId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

impl Member {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

/// Semaine de planning `[week_start, week_end)`, une par (roster, week_start).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub roster_id: RosterId,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub primary: Option<UserId>,
    pub secondary: Option<UserId>,
    pub locked: bool,
    pub generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ScheduleEntry {
    /// Nouvelle semaine générée par l'algorithme.
    pub fn generated(
        roster_id: RosterId,
        week_start: NaiveDate,
        primary: Option<UserId>,
        secondary: Option<UserId>,
    ) -> Self {
        Self {
            roster_id,
            week_start,
            week_end: week_start + Duration::days(7),
            primary,
            secondary,
            locked: false,
            generated: true,
            notes: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.primary.is_some()
    }
}

/// Édition manuelle d'une semaine ; verrouille toujours la semaine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeekEdit {
    #[serde(default)]
    pub primary: Option<UserId>,
    #[serde(default)]
    pub secondary: Option<UserId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WeekEdit {
    pub fn validate(&self) -> Result<()> {
        if self.primary.is_some() && self.primary == self.secondary {
            return Err(Error::validation("primary and secondary must differ"));
        }
        Ok(())
    }
}

/// Override manuel, intervalle UTC semi-ouvert `[start_at, end_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub id: OverrideId,
    pub roster_id: RosterId,
    pub user_id: UserId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Override {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.end_at
    }
}

/// Données de création d'un override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOverride {
    pub user_id: UserId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl NewOverride {
    pub fn new(user_id: UserId, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Result<Self> {
        let out = Self {
            user_id,
            start_at,
            end_at,
            reason: None,
        };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_at <= self.start_at {
            return Err(Error::validation("override end must be after start"));
        }
        Ok(())
    }
}

/// Parse un fuseau IANA (`Europe/Paris`, `UTC`…).
pub fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| Error::validation(format!("unknown IANA timezone: {raw:?}")))
}
