#![forbid(unsafe_code)]
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use releve::{
    calendar::CalendarExporter,
    config::Settings,
    coverage::CoverageAnalyzer,
    handoff::{run_ticker, HandoffEvent, HandoffRenderer, HandoffSink, HandoffTicker, TextHandoff},
    io,
    model::{
        parse_timezone, HandoffDay, NewOverride, NewRoster, OverrideId, RosterId, RosterPatch,
        ScheduleEntry, User, UserId, WeekEdit,
    },
    resolver::OnCallResolver,
    scheduler::{GenerateOptions, ScheduleGenerator},
    storage::RosterRepository,
    timeutil,
    worker::{topup_tenants, Tenant},
    BackgroundQueue, CallContext, JobOutcome,
};
use serde::Serialize;
#[cfg(feature = "csv")]
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI des rotations d'astreinte (SQLite, un fichier par tenant)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier de configuration TOML
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base SQLite (remplace la configuration et RELEVE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Identité de l'appelant, inscrite dans `created_by`
    #[arg(long = "as", global = true)]
    actor: Option<UserId>,

    /// Échéance de l'opération, en secondes
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Gestion des rosters
    #[command(subcommand)]
    Roster(RosterCmd),

    /// Qui est d'astreinte maintenant (ou à `--at`)
    Oncall {
        roster: RosterId,
        /// RFC3339
        #[arg(long)]
        at: Option<String>,
    },

    /// Planning hebdomadaire
    #[command(subcommand)]
    Schedule(ScheduleCmd),

    /// Membres d'un roster
    #[command(subcommand)]
    Members(MembersCmd),

    /// Utilisateurs connus
    #[command(subcommand)]
    Users(UsersCmd),

    /// Remplacements ponctuels
    #[command(subcommand)]
    Overrides(OverridesCmd),

    /// Matrice de couverture de tous les rosters actifs
    Coverage {
        /// RFC3339
        #[arg(long)]
        from: String,
        /// RFC3339
        #[arg(long)]
        to: String,
        /// Pas en minutes (défaut : configuration)
        #[arg(long)]
        resolution: Option<i64>,
    },

    /// Export iCalendar d'un roster
    Export {
        roster: RosterId,
        /// Fichier .ics (défaut : `<nom>-oncall.ics`)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Relèves survenues depuis `--since`
    Tick {
        /// RFC3339
        #[arg(long)]
        since: String,
        /// RFC3339 (défaut : maintenant)
        #[arg(long)]
        until: Option<String>,
        /// Rendu texte au lieu de JSON
        #[arg(long)]
        text: bool,
    },

    /// Surveille les relèves et les affiche au fil de l'eau
    Watch {
        /// Arrêt après N secondes (sinon jusqu'à interruption)
        #[arg(long)]
        for_secs: Option<u64>,
    },

    /// Complète les plannings de tous les rosters actifs
    Topup {
        /// `nom=chemin` ; répétable (défaut : la base courante)
        #[arg(long = "tenant")]
        tenants: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RosterCmd {
    Create(RosterCreate),
    List {
        /// Inclut les rosters inactifs
        #[arg(long)]
        all: bool,
    },
    Show {
        roster: RosterId,
    },
    Update(RosterUpdate),
    Delete {
        roster: RosterId,
    },
}

#[derive(Args, Debug)]
struct RosterCreate {
    #[arg(long)]
    name: String,
    /// Fuseau IANA, ex. Europe/Paris
    #[arg(long)]
    timezone: String,
    /// HH:MM, heure locale
    #[arg(long)]
    handoff_time: String,
    /// 0 = dimanche … 6 = samedi
    #[arg(long)]
    handoff_day: u8,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    weeks_ahead: Option<u32>,
    #[arg(long)]
    max_consecutive: Option<u32>,
    #[arg(long)]
    follow_the_sun: bool,
    #[arg(long)]
    linked: Option<RosterId>,
    /// HH:MM
    #[arg(long)]
    active_start: Option<String>,
    /// HH:MM
    #[arg(long)]
    active_end: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    end_date: Option<String>,
}

#[derive(Args, Debug)]
struct RosterUpdate {
    roster: RosterId,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    timezone: Option<String>,
    #[arg(long)]
    weeks_ahead: Option<u32>,
    #[arg(long)]
    max_consecutive: Option<u32>,
    #[arg(long)]
    follow_the_sun: Option<bool>,
    #[arg(long)]
    linked: Option<RosterId>,
    /// Supprime le lien follow-the-sun
    #[arg(long, conflicts_with = "linked")]
    unlink: bool,
    #[arg(long)]
    active_start: Option<String>,
    #[arg(long)]
    active_end: Option<String>,
    #[arg(long, conflicts_with_all = ["active_start", "active_end"])]
    clear_active_hours: bool,
    #[arg(long)]
    end_date: Option<String>,
    #[arg(long, conflicts_with = "end_date")]
    clear_end_date: bool,
    #[arg(long, conflicts_with = "description")]
    clear_description: bool,
    #[arg(long)]
    active: Option<bool>,
}

#[derive(Subcommand, Debug)]
enum ScheduleCmd {
    /// Semaines du planning, avec exports optionnels
    Show {
        roster: RosterId,
        /// YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        out_json: Option<PathBuf>,
        /// Export CSV (feature `csv`)
        #[arg(long)]
        out_csv: Option<PathBuf>,
    },
    /// (Re)génère les semaines à venir
    Generate {
        roster: RosterId,
        /// YYYY-MM-DD (défaut : aujourd'hui, heure locale du roster)
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        weeks: Option<u32>,
    },
    Get {
        roster: RosterId,
        /// YYYY-MM-DD, jour de relève
        week: String,
    },
    /// Édition manuelle ; verrouille la semaine
    Set {
        roster: RosterId,
        week: String,
        #[arg(long)]
        primary: Option<UserId>,
        #[arg(long)]
        secondary: Option<UserId>,
        #[arg(long)]
        notes: Option<String>,
    },
    Unlock {
        roster: RosterId,
        week: String,
    },
}

#[derive(Subcommand, Debug)]
enum MembersCmd {
    List {
        roster: RosterId,
        #[arg(long)]
        active: bool,
    },
    Add {
        roster: RosterId,
        user: UserId,
        /// Crée ou renomme l'utilisateur
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    Set {
        roster: RosterId,
        user: UserId,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    Remove {
        roster: RosterId,
        user: UserId,
    },
    /// Import CSV `user_id,name[,email]` (feature `csv`)
    Import {
        roster: RosterId,
        csv: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCmd {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        /// Identifiant imposé (défaut : aléatoire)
        #[arg(long)]
        id: Option<UserId>,
    },
}

#[derive(Subcommand, Debug)]
enum OverridesCmd {
    List {
        roster: RosterId,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Add {
        roster: RosterId,
        #[arg(long)]
        user: UserId,
        /// RFC3339
        #[arg(long)]
        start: String,
        /// RFC3339
        #[arg(long)]
        end: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Delete {
        roster: RosterId,
        id: OverrideId,
    },
}

struct PrintSink;

impl HandoffSink for PrintSink {
    fn deliver(&mut self, event: &HandoffEvent) -> anyhow::Result<()> {
        print!("{}", TextHandoff.render(event));
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn opt<T>(raw: Option<String>, parse: impl Fn(&str) -> releve::Result<T>) -> Result<Option<T>> {
    Ok(raw.map(|r| parse(&r)).transpose()?)
}

/// `--clear-*` l'emporte : `Some(None)` efface le champ.
fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        settings.database = db.clone();
    }

    #[cfg(feature = "logging")]
    if cli.log {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
        let _ = Subscriber::builder().with_env_filter(filter).try_init();
    }

    let ctx = match cli.timeout {
        Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)),
        None => CallContext::background(),
    };
    let options = GenerateOptions {
        lease_ttl: settings.lease_ttl(),
        ..GenerateOptions::default()
    };
    let repo = RosterRepository::open(&settings.database)
        .with_context(|| format!("opening {}", settings.database.display()))?;

    let code = match cli.cmd {
        Commands::Roster(cmd) => roster_cmd(&repo, cmd)?,
        Commands::Oncall { roster, at } => {
            let at = opt(at, timeutil::parse_instant)?.unwrap_or_else(Utc::now);
            print_json(&OnCallResolver::new(&repo).resolve(&ctx, roster, at)?)?;
            0
        }
        Commands::Schedule(cmd) => schedule_cmd(&repo, &ctx, &options, cmd)?,
        Commands::Members(cmd) => members_cmd(&repo, &settings, &options, cmd)?,
        Commands::Users(UsersCmd::Add { name, email, id }) => {
            if name.trim().is_empty() {
                bail!("user name must not be empty");
            }
            let user = User {
                id: id.unwrap_or_else(UserId::random),
                name,
                email,
            };
            repo.upsert_user(&user)?;
            print_json(&user)?;
            0
        }
        Commands::Overrides(cmd) => overrides_cmd(&repo, cli.actor, cmd)?,
        Commands::Coverage {
            from,
            to,
            resolution,
        } => {
            let from = timeutil::parse_instant(&from)?;
            let to = timeutil::parse_instant(&to)?;
            let resolution = resolution
                .map(chrono::Duration::minutes)
                .unwrap_or_else(|| settings.coverage_resolution());
            let report = CoverageAnalyzer::new(&repo).coverage(&ctx, from, to, resolution)?;
            print_json(&report)?;
            if report.gaps.is_empty() {
                0
            } else {
                eprintln!("{} coverage gap(s), {:.1} h", report.gaps.len(), report.total_gap_hours);
                // Code 2 = WARNING/INCOMPLETE
                2
            }
        }
        Commands::Export { roster, out } => {
            let r = repo.get_roster(roster)?;
            let ics = CalendarExporter::new(&repo).export(roster, Utc::now())?;
            let path = out.unwrap_or_else(|| PathBuf::from(CalendarExporter::file_name(&r)));
            io::write_atomic(&path, ics.as_bytes())?;
            println!("Calendar written to {}", path.display());
            0
        }
        Commands::Tick { since, until, text } => {
            let since = timeutil::parse_instant(&since)?;
            let until = opt(until, timeutil::parse_instant)?.unwrap_or_else(Utc::now);
            let events = HandoffTicker::new(since).tick(&repo, until)?;
            if text {
                for event in &events {
                    print!("{}", TextHandoff.render(event));
                }
            } else {
                print_json(&events)?;
            }
            0
        }
        Commands::Watch { for_secs } => {
            let ctx = match for_secs {
                Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)),
                None => ctx,
            };
            let mut ticker = HandoffTicker::new(Utc::now());
            run_ticker(&repo, &ctx, &mut ticker, settings.ticker_interval(), &mut PrintSink);
            0
        }
        Commands::Topup { tenants } => {
            let opened = open_tenants(&tenants)?;
            let list: Vec<Tenant<'_>> = if opened.is_empty() {
                vec![Tenant {
                    name: "default",
                    repo: &repo,
                }]
            } else {
                opened
                    .iter()
                    .map(|(name, r)| Tenant {
                        name: name.as_str(),
                        repo: r,
                    })
                    .collect()
            };
            let report = topup_tenants(&ctx, &list, &options, Utc::now())?;
            print_json(&report)?;
            if report.failures.is_empty() {
                0
            } else {
                2
            }
        }
    };

    std::process::exit(code);
}

fn open_tenants(specs: &[String]) -> Result<Vec<(String, RosterRepository)>> {
    specs
        .iter()
        .map(|spec| {
            let (name, path) = spec
                .split_once('=')
                .with_context(|| format!("invalid tenant `{spec}` (expected name=path)"))?;
            let repo = RosterRepository::open(Path::new(path.trim()))
                .with_context(|| format!("opening tenant {name}"))?;
            Ok((name.trim().to_string(), repo))
        })
        .collect()
}

fn roster_cmd(repo: &RosterRepository, cmd: RosterCmd) -> Result<i32> {
    match cmd {
        RosterCmd::Create(args) => {
            let mut new = NewRoster::new(
                args.name,
                parse_timezone(&args.timezone)?,
                timeutil::parse_time_of_day(&args.handoff_time)?,
                HandoffDay::new(args.handoff_day)?,
            );
            new.description = args.description;
            if let Some(w) = args.weeks_ahead {
                new.schedule_weeks_ahead = w;
            }
            if let Some(m) = args.max_consecutive {
                new.max_consecutive_weeks = m;
            }
            new.is_follow_the_sun = args.follow_the_sun;
            new.linked_roster_id = args.linked;
            new.active_hours_start = opt(args.active_start, timeutil::parse_time_of_day)?;
            new.active_hours_end = opt(args.active_end, timeutil::parse_time_of_day)?;
            new.end_date = opt(args.end_date, timeutil::parse_date)?;
            print_json(&repo.create_roster(&new)?)?;
        }
        RosterCmd::List { all } => print_json(&repo.list_rosters(!all)?)?,
        RosterCmd::Show { roster } => print_json(&repo.get_roster(roster)?)?,
        RosterCmd::Update(args) => {
            let patch = RosterPatch {
                name: args.name,
                description: clearable(args.description, args.clear_description),
                timezone: opt(args.timezone, parse_timezone)?,
                schedule_weeks_ahead: args.weeks_ahead,
                max_consecutive_weeks: args.max_consecutive,
                is_follow_the_sun: args.follow_the_sun,
                linked_roster_id: clearable(args.linked, args.unlink),
                active_hours_start: clearable(
                    opt(args.active_start, timeutil::parse_time_of_day)?,
                    args.clear_active_hours,
                ),
                active_hours_end: clearable(
                    opt(args.active_end, timeutil::parse_time_of_day)?,
                    args.clear_active_hours,
                ),
                escalation_policy_id: None,
                end_date: clearable(opt(args.end_date, timeutil::parse_date)?, args.clear_end_date),
                is_active: args.active,
            };
            print_json(&repo.update_roster(args.roster, &patch)?)?;
        }
        RosterCmd::Delete { roster } => {
            repo.delete_roster(roster)?;
            println!("Roster {roster} deleted");
        }
    }
    Ok(0)
}

fn schedule_cmd(
    repo: &RosterRepository,
    ctx: &CallContext,
    options: &GenerateOptions,
    cmd: ScheduleCmd,
) -> Result<i32> {
    match cmd {
        ScheduleCmd::Show {
            roster,
            from,
            to,
            out_json,
            out_csv,
        } => {
            let r = repo.get_roster(roster)?;
            let entries = repo.list_schedule(
                roster,
                opt(from, timeutil::parse_date)?,
                opt(to, timeutil::parse_date)?,
            )?;
            if let Some(path) = out_json {
                io::export_schedule_json(path, &r, &entries)?;
            }
            if let Some(path) = out_csv {
                export_csv(repo, roster, &entries, &path)?;
            }
            print_json(&entries)?;
        }
        ScheduleCmd::Generate {
            roster,
            from,
            weeks,
        } => {
            let generator = ScheduleGenerator::with_options(repo, options.clone());
            let entries = match (opt(from, timeutil::parse_date)?, weeks) {
                (None, None) => generator.generate_ahead(ctx, roster, Utc::now())?,
                (from, weeks) => {
                    let r = repo.get_roster(roster)?;
                    let from =
                        from.unwrap_or_else(|| timeutil::local_date(r.timezone, Utc::now()));
                    generator.generate(ctx, roster, from, weeks.unwrap_or(r.schedule_weeks_ahead))?
                }
            };
            print_json(&entries)?;
        }
        ScheduleCmd::Get { roster, week } => {
            print_json(&repo.require_week(roster, timeutil::parse_date(&week)?)?)?;
        }
        ScheduleCmd::Set {
            roster,
            week,
            primary,
            secondary,
            notes,
        } => {
            let edit = WeekEdit {
                primary,
                secondary,
                notes,
            };
            print_json(&repo.update_week(roster, timeutil::parse_date(&week)?, &edit)?)?;
        }
        ScheduleCmd::Unlock { roster, week } => {
            print_json(&repo.unlock_week(roster, timeutil::parse_date(&week)?)?)?;
        }
    }
    Ok(0)
}

fn members_cmd(
    repo: &RosterRepository,
    settings: &Settings,
    options: &GenerateOptions,
    cmd: MembersCmd,
) -> Result<i32> {
    let roster = match cmd {
        MembersCmd::List { roster, active } => {
            print_json(&repo.list_members(roster, active)?)?;
            return Ok(0);
        }
        MembersCmd::Add {
            roster,
            user,
            name,
            email,
        } => {
            if let Some(name) = name {
                repo.upsert_user(&User {
                    id: user,
                    name,
                    email,
                })?;
            }
            print_json(&repo.add_member(roster, user)?)?;
            roster
        }
        MembersCmd::Set {
            roster,
            user,
            active,
        } => {
            print_json(&repo.set_member_active(roster, user, active)?)?;
            roster
        }
        MembersCmd::Remove { roster, user } => {
            print_json(&repo.remove_member(roster, user)?)?;
            roster
        }
        MembersCmd::Import { roster, csv } => {
            import_members(repo, roster, &csv)?;
            roster
        }
    };
    regenerate_in_background(settings, options, roster)
}

/// Régénère le planning après un changement de membres, sur sa propre
/// connexion ; l'échec est signalé sans annuler le changement.
fn regenerate_in_background(
    settings: &Settings,
    options: &GenerateOptions,
    roster: RosterId,
) -> Result<i32> {
    let queue = BackgroundQueue::new(settings.queue_capacity)?;
    let db = settings.database.clone();
    let options = options.clone();
    queue.submit(format!("regenerate {roster}"), move || {
        let repo = RosterRepository::open(&db)?;
        ScheduleGenerator::with_options(&repo, options).generate_ahead(
            &CallContext::background(),
            roster,
            Utc::now(),
        )?;
        Ok(())
    })?;
    let mut code = 0;
    for report in queue.shutdown() {
        match report.outcome {
            JobOutcome::Succeeded => {}
            JobOutcome::Failed(msg) | JobOutcome::Panicked(msg) => {
                eprintln!("{}: {msg}", report.name);
                code = 2;
            }
        }
    }
    Ok(code)
}

#[cfg(feature = "csv")]
fn export_csv(
    repo: &RosterRepository,
    roster: RosterId,
    entries: &[ScheduleEntry],
    path: &Path,
) -> Result<()> {
    let names: HashMap<UserId, String> = repo
        .list_members(roster, false)?
        .into_iter()
        .map(|m| (m.user_id, m.display_name()))
        .collect();
    io::export_schedule_csv(path, entries, &names)
}

#[cfg(not(feature = "csv"))]
fn export_csv(_: &RosterRepository, _: RosterId, _: &[ScheduleEntry], _: &Path) -> Result<()> {
    bail!("CSV export needs the `csv` feature")
}

#[cfg(feature = "csv")]
fn import_members(repo: &RosterRepository, roster: RosterId, path: &Path) -> Result<()> {
    print_json(&io::import_members_csv(repo, roster, path)?)
}

#[cfg(not(feature = "csv"))]
fn import_members(_: &RosterRepository, _: RosterId, _: &Path) -> Result<()> {
    bail!("members import needs the `csv` feature")
}

fn overrides_cmd(repo: &RosterRepository, actor: Option<UserId>, cmd: OverridesCmd) -> Result<i32> {
    match cmd {
        OverridesCmd::List { roster, from, to } => {
            let from: Option<DateTime<Utc>> = opt(from, timeutil::parse_instant)?;
            let to: Option<DateTime<Utc>> = opt(to, timeutil::parse_instant)?;
            print_json(&repo.list_overrides(roster, from, to)?)?;
        }
        OverridesCmd::Add {
            roster,
            user,
            start,
            end,
            reason,
        } => {
            let mut new = NewOverride::new(
                user,
                timeutil::parse_instant(&start)?,
                timeutil::parse_instant(&end)?,
            )?;
            new.reason = reason;
            print_json(&repo.create_override(roster, &new, actor)?)?;
        }
        OverridesCmd::Delete { roster, id } => {
            repo.delete_override(roster, id)?;
            println!("Override {id} deleted");
        }
    }
    Ok(0)
}
