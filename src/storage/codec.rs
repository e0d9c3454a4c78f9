//! Encodage texte des dates/heures et décodage des lignes SQLite.

use crate::error::Error;
use crate::model::parse_timezone;
use crate::timeutil;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

/// Largeur fixe : l'ordre lexicographique suit l'ordre chronologique.
pub(crate) fn encode_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn encode_time(t: NaiveTime) -> String {
    timeutil::format_time_of_day(t)
}

fn conversion(idx: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decode<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> Result<T, Error>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| conversion(idx, e))
}

fn decode_opt<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> Result<T, Error>,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.as_deref()
        .map(parse)
        .transpose()
        .map_err(|e| conversion(idx, e))
}

pub(crate) fn instant(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    decode(row, idx, timeutil::parse_instant)
}

pub(crate) fn opt_instant(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    decode_opt(row, idx, timeutil::parse_instant)
}

pub(crate) fn date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    decode(row, idx, timeutil::parse_date)
}

pub(crate) fn opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    decode_opt(row, idx, timeutil::parse_date)
}

/// Heure locale normalisée en `HH:MM`, quel que soit le format stocké.
pub(crate) fn time_of_day(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    decode(row, idx, timeutil::parse_time_of_day)
}

pub(crate) fn opt_time_of_day(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveTime>> {
    decode_opt(row, idx, timeutil::parse_time_of_day)
}

pub(crate) fn timezone(row: &Row<'_>, idx: usize) -> rusqlite::Result<Tz> {
    decode(row, idx, parse_timezone)
}

pub(crate) fn id<T: FromStr<Err = Error>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    decode(row, idx, T::from_str)
}

pub(crate) fn opt_id<T: FromStr<Err = Error>>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    decode_opt(row, idx, T::from_str)
}
