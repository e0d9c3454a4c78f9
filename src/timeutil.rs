//! Arithmétique de dates et d'heures dans le fuseau d'un roster.
//!
//! Tout instant manipulé par la lib est en UTC ; les heures de relève et les
//! fenêtres actives sont locales au roster et converties ici.

use crate::error::{Error, Result};
use crate::model::{HandoffDay, Roster};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;

/// Parse `HH:MM` ou `HH:MM:SS` ; les secondes sont ignorées.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(|t| t.with_second(0).unwrap_or(t))
        .map_err(|_| Error::validation(format!("invalid time of day (HH:MM): {raw:?}")))
}

pub fn format_time_of_day(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("invalid date (YYYY-MM-DD): {raw:?}")))
}

/// Parse un instant RFC3339 et le ramène en UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::validation(format!("invalid RFC3339 instant: {raw:?}")))
}

/// Dernière occurrence du jour de relève, le jour même compris.
pub fn align_to_handoff_day(date: NaiveDate, day: HandoffDay) -> NaiveDate {
    let current = i64::from(date.weekday().num_days_from_sunday());
    let target = i64::from(day.get());
    let back = (current - target).rem_euclid(7);
    date - Duration::days(back)
}

/// Convertit une heure locale en UTC.
///
/// Heure ambiguë (retour à l'heure d'hiver) : la première occurrence.
/// Heure inexistante (passage à l'heure d'été) : décalée d'une heure.
pub fn localize(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
        LocalResult::None => match tz.from_local_datetime(&(local + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&local),
        },
    }
}

/// Date locale d'un instant dans le fuseau donné.
pub fn local_date(tz: Tz, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Instant UTC de relève d'un jour local donné.
pub fn handoff_instant(roster: &Roster, date: NaiveDate) -> DateTime<Utc> {
    localize(roster.timezone, date.and_time(roster.handoff_time))
}

/// Bornes UTC `[début, fin)` de la semaine qui commence à `week_start`.
pub fn week_bounds(roster: &Roster, week_start: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        handoff_instant(roster, week_start),
        handoff_instant(roster, week_start + Duration::days(7)),
    )
}

/// Début (date locale) de la semaine de rotation contenant `at`.
pub fn week_start_containing(roster: &Roster, at: DateTime<Utc>) -> NaiveDate {
    let aligned = align_to_handoff_day(local_date(roster.timezone, at), roster.handoff_day);
    if handoff_instant(roster, aligned) <= at {
        aligned
    } else {
        aligned - Duration::days(7)
    }
}

/// Heure locale dans la fenêtre `[start, end)` ; une fenêtre inversée
/// traverse minuit, une fenêtre vide (`start == end`) couvre 24 h.
pub fn within_window(local: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= local && local < end
    } else if start > end {
        local >= start || local < end
    } else {
        true
    }
}

pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Sérialisation `HH:MM` des heures locales.
pub mod serde_hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time_of_day(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time_of_day(&raw).map_err(de::Error::custom)
    }
}

pub mod serde_hhmm_opt {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_some(&super::format_time_of_day(*t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse_time_of_day(&raw)
                .map(Some)
                .map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Variante pour les patchs : `null` efface, champ absent laisse inchangé.
pub mod serde_hhmm_patch {
    use chrono::NaiveTime;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<Option<NaiveTime>>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(inner) => super::serde_hhmm_opt::serialize(inner, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Option<NaiveTime>>, D::Error> {
        super::serde_hhmm_opt::deserialize(d).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn align_monday_from_wednesday() {
        let d = parse_date("2026-02-25").unwrap();
        let aligned = align_to_handoff_day(d, HandoffDay::new(1).unwrap());
        assert_eq!(aligned, parse_date("2026-02-23").unwrap());
        assert_eq!(aligned.weekday(), Weekday::Mon);
    }

    #[test]
    fn align_is_within_last_seven_days_for_every_weekday() {
        let base = parse_date("2026-01-01").unwrap();
        for offset in 0..21 {
            let d = base + Duration::days(offset);
            for h in 0..7u8 {
                let day = HandoffDay::new(h).unwrap();
                let aligned = align_to_handoff_day(d, day);
                assert_eq!(aligned.weekday(), day.weekday());
                let back = (d - aligned).num_days();
                assert!((0..7).contains(&back), "{d} -> {aligned}");
            }
        }
    }

    #[test]
    fn time_of_day_is_normalized() {
        let t = parse_time_of_day("09:30:15").unwrap();
        assert_eq!(format_time_of_day(t), "09:30");
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("nine").is_err());
    }

    #[test]
    fn malformed_inputs_are_validation_errors() {
        assert!(matches!(parse_date("2026/02/01"), Err(Error::Validation(_))));
        assert!(matches!(parse_instant("yesterday"), Err(Error::Validation(_))));
    }

    #[test]
    fn window_wraps_past_midnight() {
        let t = |s| parse_time_of_day(s).unwrap();
        assert!(within_window(t("23:00"), t("20:00"), t("08:00")));
        assert!(within_window(t("07:59"), t("20:00"), t("08:00")));
        assert!(!within_window(t("08:00"), t("20:00"), t("08:00")));
        assert!(within_window(t("08:00"), t("08:00"), t("20:00")));
        assert!(within_window(t("03:00"), t("08:00"), t("08:00")));
    }

    #[test]
    fn localize_handles_dst_gap() {
        let tz: Tz = "Europe/Paris".parse().unwrap();
        // 2026-03-29 02:30 n'existe pas à Paris.
        let local = parse_date("2026-03-29")
            .unwrap()
            .and_time(parse_time_of_day("02:30").unwrap());
        let utc = localize(tz, local);
        assert_eq!(utc, parse_instant("2026-03-29T01:30:00Z").unwrap());
    }
}
