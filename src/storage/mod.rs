//! Dépôt SQLite des rosters, membres, semaines de planning et overrides.
//!
//! Une instance possède une connexion bloquante ; le routage multi-tenant
//! choisit le fichier de base avant d'ouvrir le dépôt.

pub(crate) mod codec;

use crate::error::{Error, PersistContext, Result};
use crate::model::{
    Member, NewOverride, NewRoster, Override, OverrideId, Roster, RosterId, RosterPatch,
    ScheduleEntry, User, UserId, WeekEdit,
};
use crate::timeutil;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use codec::{encode_date, encode_instant, encode_time};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const SCHEMA: &str = include_str!("schema.sql");

const ROSTER_COLUMNS: &str = "id, name, description, timezone, handoff_time, handoff_day, \
     schedule_weeks_ahead, max_consecutive_weeks, is_follow_the_sun, linked_roster_id, \
     active_hours_start, active_hours_end, escalation_policy_id, end_date, is_active, \
     created_at, updated_at";

const MEMBER_SELECT: &str = "SELECT m.roster_id, m.user_id, u.name, u.email, m.is_active, \
     m.joined_at, m.left_at FROM roster_members m LEFT JOIN users u ON u.id = m.user_id";

const WEEK_COLUMNS: &str = "roster_id, week_start, week_end, primary_user_id, \
     secondary_user_id, is_locked, is_generated, notes";

const OVERRIDE_COLUMNS: &str =
    "id, roster_id, user_id, start_at, end_at, reason, created_by, created_at";

pub struct RosterRepository {
    conn: Connection,
}

impl RosterRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .persist_ctx(|| format!("opening database {}", path.display()))?;
        // le worker d'arrière-plan ouvre sa propre connexion sur le même fichier
        conn.busy_timeout(BUSY_TIMEOUT)
            .persist_ctx(|| "setting busy timeout")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().persist_ctx(|| "opening in-memory database")?;
        Self::from_connection(conn)
    }

    /// Prend une connexion déjà ciblée sur le bon tenant et crée le schéma.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .persist_ctx(|| "enabling foreign keys")?;
        conn.execute_batch(SCHEMA)
            .persist_ctx(|| "creating schema")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ---------------------------------------------------------------- rosters

    pub fn create_roster(&self, new: &NewRoster) -> Result<Roster> {
        new.validate()?;
        if let Some(link) = new.linked_roster_id {
            self.ensure_linked(link)?;
        }
        let id = RosterId::random();
        let now = encode_instant(Utc::now());
        self.conn
            .execute(
                &format!(
                    "INSERT INTO rosters ({ROSTER_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1, ?15, ?15)"
                ),
                params![
                    id.to_string(),
                    new.name.trim(),
                    new.description,
                    new.timezone.name(),
                    encode_time(new.handoff_time),
                    new.handoff_day.get(),
                    new.schedule_weeks_ahead,
                    new.max_consecutive_weeks,
                    new.is_follow_the_sun,
                    new.linked_roster_id.map(|r| r.to_string()),
                    new.active_hours_start.map(encode_time),
                    new.active_hours_end.map(encode_time),
                    new.escalation_policy_id.map(|p| p.to_string()),
                    new.end_date.map(encode_date),
                    now,
                ],
            )
            .persist_ctx(|| format!("inserting roster {:?}", new.name))?;
        debug!(roster = %id, name = %new.name, "roster created");
        self.get_roster(id)
    }

    pub fn list_rosters(&self, active_only: bool) -> Result<Vec<Roster>> {
        let sql = if active_only {
            format!("SELECT {ROSTER_COLUMNS} FROM rosters WHERE is_active = 1 ORDER BY name, id")
        } else {
            format!("SELECT {ROSTER_COLUMNS} FROM rosters ORDER BY name, id")
        };
        let mut stmt = self.conn.prepare_cached(&sql).persist_ctx(|| "listing rosters")?;
        let rows = stmt
            .query_map([], roster_from_row)
            .persist_ctx(|| "listing rosters")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .persist_ctx(|| "decoding rosters")
    }

    pub fn get_roster(&self, id: RosterId) -> Result<Roster> {
        self.conn
            .prepare_cached(&format!("SELECT {ROSTER_COLUMNS} FROM rosters WHERE id = ?1"))
            .and_then(|mut stmt| stmt.query_row([id.to_string()], roster_from_row).optional())
            .persist_ctx(|| format!("loading roster {id}"))?
            .ok_or_else(|| Error::not_found("roster", id))
    }

    pub fn update_roster(&self, id: RosterId, patch: &RosterPatch) -> Result<Roster> {
        let current = self.get_roster(id)?;
        let updated = patch.apply(&current)?;
        if let Some(link) = updated.linked_roster_id {
            self.ensure_linked(link)?;
        }
        self.conn
            .execute(
                "UPDATE rosters SET name = ?2, description = ?3, timezone = ?4, \
                 handoff_time = ?5, handoff_day = ?6, schedule_weeks_ahead = ?7, \
                 max_consecutive_weeks = ?8, is_follow_the_sun = ?9, linked_roster_id = ?10, \
                 active_hours_start = ?11, active_hours_end = ?12, escalation_policy_id = ?13, \
                 end_date = ?14, is_active = ?15, updated_at = ?16 WHERE id = ?1",
                params![
                    id.to_string(),
                    updated.name.trim(),
                    updated.description,
                    updated.timezone.name(),
                    encode_time(updated.handoff_time),
                    updated.handoff_day.get(),
                    updated.schedule_weeks_ahead,
                    updated.max_consecutive_weeks,
                    updated.is_follow_the_sun,
                    updated.linked_roster_id.map(|r| r.to_string()),
                    updated.active_hours_start.map(encode_time),
                    updated.active_hours_end.map(encode_time),
                    updated.escalation_policy_id.map(|p| p.to_string()),
                    updated.end_date.map(encode_date),
                    updated.is_active,
                    encode_instant(Utc::now()),
                ],
            )
            .persist_ctx(|| format!("updating roster {id}"))?;
        self.get_roster(id)
    }

    /// Supprime le roster et ses lignes (membres, semaines, overrides).
    ///
    /// Refusé tant qu'un autre roster le référence comme frère follow-the-sun.
    pub fn delete_roster(&self, id: RosterId) -> Result<()> {
        self.get_roster(id)?;
        let dependents: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM rosters WHERE linked_roster_id = ?1 AND id <> ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .persist_ctx(|| format!("counting dependents of roster {id}"))?;
        if dependents > 0 {
            return Err(Error::Conflict(format!(
                "roster {id} is linked by {dependents} follow-the-sun roster(s)"
            )));
        }
        self.conn
            .execute("DELETE FROM rosters WHERE id = ?1", [id.to_string()])
            .persist_ctx(|| format!("deleting roster {id}"))?;
        Ok(())
    }

    fn ensure_linked(&self, link: RosterId) -> Result<()> {
        match self.get_roster(link) {
            Ok(_) => Ok(()),
            Err(Error::NotFound { .. }) => Err(Error::validation(format!(
                "linked roster {link} does not exist"
            ))),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------ users

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, email = excluded.email",
                params![user.id.to_string(), user.name, user.email],
            )
            .persist_ctx(|| format!("upserting user {}", user.id))?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(User {
                        id: codec::id(row, 0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .optional()
            .persist_ctx(|| format!("loading user {id}"))
    }

    // ---------------------------------------------------------------- members

    /// Membres dans l'ordre d'arrivée (ordre de départage des égalités).
    pub fn list_members(&self, roster: RosterId, active_only: bool) -> Result<Vec<Member>> {
        self.get_roster(roster)?;
        let filter = if active_only { " AND m.is_active = 1" } else { "" };
        let sql = format!(
            "{MEMBER_SELECT} WHERE m.roster_id = ?1{filter} ORDER BY m.joined_at, m.user_id"
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .persist_ctx(|| format!("listing members of roster {roster}"))?;
        let rows = stmt
            .query_map([roster.to_string()], member_from_row)
            .persist_ctx(|| format!("listing members of roster {roster}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .persist_ctx(|| format!("decoding members of roster {roster}"))
    }

    pub fn get_member(&self, roster: RosterId, user: UserId) -> Result<Member> {
        self.conn
            .query_row(
                &format!("{MEMBER_SELECT} WHERE m.roster_id = ?1 AND m.user_id = ?2"),
                [roster.to_string(), user.to_string()],
                member_from_row,
            )
            .optional()
            .persist_ctx(|| format!("loading member {user} of roster {roster}"))?
            .ok_or_else(|| Error::not_found("member", format!("{roster}/{user}")))
    }

    /// Ajoute un membre, ou le réactive (ce qui efface `left_at`).
    pub fn add_member(&self, roster: RosterId, user: UserId) -> Result<Member> {
        self.get_roster(roster)?;
        self.conn
            .execute(
                "INSERT INTO roster_members (roster_id, user_id, is_active, joined_at, left_at) \
                 VALUES (?1, ?2, 1, ?3, NULL) \
                 ON CONFLICT(roster_id, user_id) DO UPDATE SET is_active = 1, left_at = NULL",
                params![roster.to_string(), user.to_string(), encode_instant(Utc::now())],
            )
            .persist_ctx(|| format!("adding member {user} to roster {roster}"))?;
        self.get_member(roster, user)
    }

    pub fn set_member_active(&self, roster: RosterId, user: UserId, active: bool) -> Result<Member> {
        let left_at = (!active).then(|| encode_instant(Utc::now()));
        let changed = self
            .conn
            .execute(
                "UPDATE roster_members SET is_active = ?3, left_at = ?4 \
                 WHERE roster_id = ?1 AND user_id = ?2",
                params![roster.to_string(), user.to_string(), active, left_at],
            )
            .persist_ctx(|| format!("updating member {user} of roster {roster}"))?;
        if changed == 0 {
            return Err(Error::not_found("member", format!("{roster}/{user}")));
        }
        self.get_member(roster, user)
    }

    /// Retrait doux : le membre reste en base, inactif.
    pub fn remove_member(&self, roster: RosterId, user: UserId) -> Result<Member> {
        self.set_member_active(roster, user, false)
    }

    // --------------------------------------------------------------- schedule

    /// Semaines qui intersectent `[from, to)` (bornes optionnelles), par date.
    pub fn list_schedule(
        &self,
        roster: RosterId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut sql = format!("SELECT {WEEK_COLUMNS} FROM schedule_weeks WHERE roster_id = ?1");
        let mut args = vec![roster.to_string()];
        if let Some(from) = from {
            args.push(encode_date(from));
            sql.push_str(&format!(" AND week_end > ?{}", args.len()));
        }
        if let Some(to) = to {
            args.push(encode_date(to));
            sql.push_str(&format!(" AND week_start < ?{}", args.len()));
        }
        sql.push_str(" ORDER BY week_start");

        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .persist_ctx(|| format!("listing schedule of roster {roster}"))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), week_from_row)
            .persist_ctx(|| format!("listing schedule of roster {roster}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .persist_ctx(|| format!("decoding schedule of roster {roster}"))
    }

    pub fn get_week(&self, roster: RosterId, week_start: NaiveDate) -> Result<Option<ScheduleEntry>> {
        self.conn
            .prepare_cached(&format!(
                "SELECT {WEEK_COLUMNS} FROM schedule_weeks WHERE roster_id = ?1 AND week_start = ?2"
            ))
            .and_then(|mut stmt| {
                stmt.query_row(
                    [roster.to_string(), encode_date(week_start)],
                    week_from_row,
                )
                .optional()
            })
            .persist_ctx(|| format!("loading week {week_start} of roster {roster}"))
    }

    pub fn require_week(&self, roster: RosterId, week_start: NaiveDate) -> Result<ScheduleEntry> {
        self.get_week(roster, week_start)?
            .ok_or_else(|| Error::not_found("schedule week", format!("{roster}/{week_start}")))
    }

    /// Écrit une semaine générée, idempotent sur (roster, week_start).
    ///
    /// Une ligne verrouillée n'est jamais écrasée : renvoie `false` dans ce cas.
    pub fn upsert_generated_week(&self, entry: &ScheduleEntry) -> Result<bool> {
        let now = encode_instant(Utc::now());
        let changed = self
            .conn
            .execute(
                "INSERT INTO schedule_weeks (roster_id, week_start, week_end, primary_user_id, \
                 secondary_user_id, is_locked, is_generated, notes, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 1, ?6, ?7, ?7) \
                 ON CONFLICT(roster_id, week_start) DO UPDATE SET \
                 week_end = excluded.week_end, primary_user_id = excluded.primary_user_id, \
                 secondary_user_id = excluded.secondary_user_id, is_locked = 0, \
                 is_generated = 1, notes = excluded.notes, updated_at = excluded.updated_at \
                 WHERE schedule_weeks.is_locked = 0",
                params![
                    entry.roster_id.to_string(),
                    encode_date(entry.week_start),
                    encode_date(entry.week_end),
                    entry.primary.map(|u| u.to_string()),
                    entry.secondary.map(|u| u.to_string()),
                    entry.notes,
                    now,
                ],
            )
            .persist_ctx(|| {
                format!(
                    "upserting week {} of roster {}",
                    entry.week_start, entry.roster_id
                )
            })?;
        Ok(changed > 0)
    }

    /// Édition manuelle : verrouille la semaine et la marque non générée.
    pub fn update_week(
        &self,
        roster: RosterId,
        week_start: NaiveDate,
        edit: &WeekEdit,
    ) -> Result<ScheduleEntry> {
        edit.validate()?;
        let r = self.get_roster(roster)?;
        if timeutil::align_to_handoff_day(week_start, r.handoff_day) != week_start {
            return Err(Error::validation(format!(
                "week start {week_start} is not on the roster handoff day ({})",
                r.handoff_day.weekday()
            )));
        }
        let changed = self
            .conn
            .execute(
                "UPDATE schedule_weeks SET primary_user_id = ?3, secondary_user_id = ?4, \
                 notes = COALESCE(?5, notes), is_locked = 1, is_generated = 0, updated_at = ?6 \
                 WHERE roster_id = ?1 AND week_start = ?2",
                params![
                    roster.to_string(),
                    encode_date(week_start),
                    edit.primary.map(|u| u.to_string()),
                    edit.secondary.map(|u| u.to_string()),
                    edit.notes,
                    encode_instant(Utc::now()),
                ],
            )
            .persist_ctx(|| format!("updating week {week_start} of roster {roster}"))?;
        if changed == 0 {
            return Err(Error::not_found(
                "schedule week",
                format!("{roster}/{week_start}"),
            ));
        }
        self.require_week(roster, week_start)
    }

    /// Rend la semaine à la régénération automatique.
    pub fn unlock_week(&self, roster: RosterId, week_start: NaiveDate) -> Result<ScheduleEntry> {
        let changed = self
            .conn
            .execute(
                "UPDATE schedule_weeks SET is_locked = 0, updated_at = ?3 \
                 WHERE roster_id = ?1 AND week_start = ?2",
                params![
                    roster.to_string(),
                    encode_date(week_start),
                    encode_instant(Utc::now())
                ],
            )
            .persist_ctx(|| format!("unlocking week {week_start} of roster {roster}"))?;
        if changed == 0 {
            return Err(Error::not_found(
                "schedule week",
                format!("{roster}/{week_start}"),
            ));
        }
        self.require_week(roster, week_start)
    }

    /// Semaines servies en primaire, éventuellement avant `before` (exclu).
    pub fn primary_weeks_served(
        &self,
        roster: RosterId,
        before: Option<NaiveDate>,
    ) -> Result<HashMap<UserId, u32>> {
        self.weeks_served(roster, "primary_user_id", before)
    }

    pub fn secondary_weeks_served(
        &self,
        roster: RosterId,
        before: Option<NaiveDate>,
    ) -> Result<HashMap<UserId, u32>> {
        self.weeks_served(roster, "secondary_user_id", before)
    }

    fn weeks_served(
        &self,
        roster: RosterId,
        column: &'static str,
        before: Option<NaiveDate>,
    ) -> Result<HashMap<UserId, u32>> {
        let mut sql = format!(
            "SELECT {column}, COUNT(*) FROM schedule_weeks \
             WHERE roster_id = ?1 AND {column} IS NOT NULL"
        );
        let mut args = vec![roster.to_string()];
        if let Some(before) = before {
            args.push(encode_date(before));
            sql.push_str(" AND week_start < ?2");
        }
        sql.push_str(&format!(" GROUP BY {column}"));

        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .persist_ctx(|| format!("counting {column} weeks of roster {roster}"))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((codec::id::<UserId>(row, 0)?, row.get::<_, u32>(1)?))
            })
            .persist_ctx(|| format!("counting {column} weeks of roster {roster}"))?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .persist_ctx(|| format!("decoding {column} counts of roster {roster}"))
    }

    // -------------------------------------------------------------- overrides

    pub fn create_override(
        &self,
        roster: RosterId,
        new: &NewOverride,
        created_by: Option<UserId>,
    ) -> Result<Override> {
        new.validate()?;
        self.get_roster(roster)?;
        let id = OverrideId::random();
        self.conn
            .execute(
                &format!(
                    "INSERT INTO overrides ({OVERRIDE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    id.to_string(),
                    roster.to_string(),
                    new.user_id.to_string(),
                    encode_instant(new.start_at),
                    encode_instant(new.end_at),
                    new.reason,
                    created_by.map(|u| u.to_string()),
                    encode_instant(Utc::now()),
                ],
            )
            .persist_ctx(|| format!("inserting override for roster {roster}"))?;
        self.get_override(roster, id)
    }

    pub fn get_override(&self, roster: RosterId, id: OverrideId) -> Result<Override> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM overrides WHERE id = ?1 AND roster_id = ?2"
                ),
                [id.to_string(), roster.to_string()],
                override_from_row,
            )
            .optional()
            .persist_ctx(|| format!("loading override {id}"))?
            .ok_or_else(|| Error::not_found("override", id))
    }

    /// Overrides qui intersectent `[from, to)`, triés par début.
    pub fn list_overrides(
        &self,
        roster: RosterId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Override>> {
        let mut sql = format!("SELECT {OVERRIDE_COLUMNS} FROM overrides WHERE roster_id = ?1");
        let mut args = vec![roster.to_string()];
        if let Some(from) = from {
            args.push(encode_instant(from));
            sql.push_str(&format!(" AND end_at > ?{}", args.len()));
        }
        if let Some(to) = to {
            args.push(encode_instant(to));
            sql.push_str(&format!(" AND start_at < ?{}", args.len()));
        }
        sql.push_str(" ORDER BY start_at, id");

        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .persist_ctx(|| format!("listing overrides of roster {roster}"))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), override_from_row)
            .persist_ctx(|| format!("listing overrides of roster {roster}"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .persist_ctx(|| format!("decoding overrides of roster {roster}"))
    }

    /// Override actif à `at` ; à égalité, le plus tôt commencé.
    pub fn active_override(&self, roster: RosterId, at: DateTime<Utc>) -> Result<Option<Override>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {OVERRIDE_COLUMNS} FROM overrides \
                     WHERE roster_id = ?1 AND start_at <= ?2 AND end_at > ?2 \
                     ORDER BY start_at, id LIMIT 1"
                ),
                [roster.to_string(), encode_instant(at)],
                override_from_row,
            )
            .optional()
            .persist_ctx(|| format!("looking up active override of roster {roster} at {at}"))
    }

    pub fn delete_override(&self, roster: RosterId, id: OverrideId) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM overrides WHERE id = ?1 AND roster_id = ?2",
                [id.to_string(), roster.to_string()],
            )
            .persist_ctx(|| format!("deleting override {id}"))?;
        if changed == 0 {
            return Err(Error::not_found("override", id));
        }
        Ok(())
    }

    // ----------------------------------------------------------------- leases

    /// Prend le bail de génération du roster s'il est libre, expiré ou déjà
    /// détenu par `holder`.
    pub fn try_acquire_lease(
        &self,
        roster: RosterId,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO generation_leases (roster_id, holder, expires_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(roster_id) DO UPDATE SET holder = excluded.holder, \
                 expires_at = excluded.expires_at \
                 WHERE generation_leases.expires_at <= ?4 \
                 OR generation_leases.holder = excluded.holder",
                params![
                    roster.to_string(),
                    holder,
                    encode_instant(now + ttl),
                    encode_instant(now),
                ],
            )
            .persist_ctx(|| format!("acquiring generation lease of roster {roster}"))?;
        Ok(changed > 0)
    }

    pub fn release_lease(&self, roster: RosterId, holder: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM generation_leases WHERE roster_id = ?1 AND holder = ?2",
                params![roster.to_string(), holder],
            )
            .persist_ctx(|| format!("releasing generation lease of roster {roster}"))?;
        Ok(())
    }
}

fn roster_from_row(row: &Row<'_>) -> rusqlite::Result<Roster> {
    let day: u8 = row.get(5)?;
    Ok(Roster {
        id: codec::id(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        timezone: codec::timezone(row, 3)?,
        handoff_time: codec::time_of_day(row, 4)?,
        handoff_day: crate::model::HandoffDay::new(day).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        schedule_weeks_ahead: row.get(6)?,
        max_consecutive_weeks: row.get(7)?,
        is_follow_the_sun: row.get(8)?,
        linked_roster_id: codec::opt_id(row, 9)?,
        active_hours_start: codec::opt_time_of_day(row, 10)?,
        active_hours_end: codec::opt_time_of_day(row, 11)?,
        escalation_policy_id: codec::opt_id(row, 12)?,
        end_date: codec::opt_date(row, 13)?,
        is_active: row.get(14)?,
        created_at: codec::instant(row, 15)?,
        updated_at: codec::instant(row, 16)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        roster_id: codec::id(row, 0)?,
        user_id: codec::id(row, 1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        is_active: row.get(4)?,
        joined_at: codec::instant(row, 5)?,
        left_at: codec::opt_instant(row, 6)?,
    })
}

fn week_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleEntry> {
    Ok(ScheduleEntry {
        roster_id: codec::id(row, 0)?,
        week_start: codec::date(row, 1)?,
        week_end: codec::date(row, 2)?,
        primary: codec::opt_id(row, 3)?,
        secondary: codec::opt_id(row, 4)?,
        locked: row.get(5)?,
        generated: row.get(6)?,
        notes: row.get(7)?,
    })
}

fn override_from_row(row: &Row<'_>) -> rusqlite::Result<Override> {
    Ok(Override {
        id: codec::id(row, 0)?,
        roster_id: codec::id(row, 1)?,
        user_id: codec::id(row, 2)?,
        start_at: codec::instant(row, 3)?,
        end_at: codec::instant(row, 4)?,
        reason: row.get(5)?,
        created_by: codec::opt_id(row, 6)?,
        created_at: codec::instant(row, 7)?,
    })
}
