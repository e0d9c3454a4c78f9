//! Imports et exports fichiers : membres (CSV), planning (CSV/JSON),
//! calendrier. Toute écriture passe par un fichier temporaire renommé.

use crate::model::{Member, Roster, RosterId, ScheduleEntry, User, UserId};
use crate::storage::RosterRepository;
use anyhow::Context;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[cfg(feature = "csv")]
use anyhow::bail;
#[cfg(feature = "csv")]
use csv::{ReaderBuilder, WriterBuilder};

/// Écrit `bytes` dans `path` de manière atomique.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("atomic rename to {}", path.display()))?;
    Ok(())
}

/// Lit des membres depuis un CSV: header `user_id,name[,email]`
#[cfg(feature = "csv")]
pub fn read_members_csv<R: std::io::Read>(reader: R) -> anyhow::Result<Vec<User>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let row = line + 2;
        let raw_id = rec.get(0).context("missing user_id")?.trim();
        let name = rec.get(1).context("missing name")?.trim();
        if raw_id.is_empty() || name.is_empty() {
            bail!("invalid member row {row} (empty)");
        }
        let id: UserId = raw_id
            .parse()
            .with_context(|| format!("invalid user_id on row {row}"))?;
        let email = rec
            .get(2)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        out.push(User {
            id,
            name: name.to_string(),
            email,
        });
    }
    Ok(out)
}

/// Importe les membres d'un CSV dans le roster, dans l'ordre du fichier.
///
/// Le fichier est entièrement validé avant la première écriture.
#[cfg(feature = "csv")]
pub fn import_members_csv<P: AsRef<Path>>(
    repo: &RosterRepository,
    roster: RosterId,
    path: P,
) -> anyhow::Result<Vec<Member>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("reading {}", path.display()))?;
    let users = read_members_csv(file)?;
    repo.get_roster(roster)?;
    let mut members = Vec::with_capacity(users.len());
    for user in &users {
        repo.upsert_user(user)?;
        members.push(repo.add_member(roster, user.id)?);
    }
    Ok(members)
}

/// Export CSV du planning: header
/// `week_start,week_end,primary,secondary,locked,generated,notes`
///
/// `names` remplace les identifiants par les noms connus.
#[cfg(feature = "csv")]
pub fn export_schedule_csv<P: AsRef<Path>>(
    path: P,
    entries: &[ScheduleEntry],
    names: &HashMap<UserId, String>,
) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    w.write_record([
        "week_start",
        "week_end",
        "primary",
        "secondary",
        "locked",
        "generated",
        "notes",
    ])?;
    let who = |u: Option<UserId>| {
        u.map(|id| names.get(&id).cloned().unwrap_or_else(|| id.to_string()))
            .unwrap_or_default()
    };
    for e in entries {
        let week_start = e.week_start.to_string();
        let week_end = e.week_end.to_string();
        let primary = who(e.primary);
        let secondary = who(e.secondary);
        w.write_record([
            week_start.as_str(),
            week_end.as_str(),
            primary.as_str(),
            secondary.as_str(),
            if e.locked { "true" } else { "false" },
            if e.generated { "true" } else { "false" },
            e.notes.as_deref().unwrap_or(""),
        ])?;
    }
    let bytes = w.into_inner().map_err(|e| anyhow::anyhow!("flushing csv: {e}"))?;
    write_atomic(path, &bytes)
}

/// Export JSON du planning (jolie mise en forme)
pub fn export_schedule_json<P: AsRef<Path>>(
    path: P,
    roster: &Roster,
    entries: &[ScheduleEntry],
) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct Document<'a> {
        roster: &'a Roster,
        weeks: &'a [ScheduleEntry],
    }
    let json = serde_json::to_vec_pretty(&Document {
        roster,
        weeks: entries,
    })?;
    write_atomic(path, &json)
}
