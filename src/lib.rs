#![forbid(unsafe_code)]
//! Relève — moteur de rotations d'astreinte hebdomadaires.
//!
//! - Stockage SQLite (un fichier par tenant).
//! - Génération équitable des semaines, plafond de semaines consécutives.
//! - Résolution override > planning > personne.
//! - Couverture multi-rosters (follow-the-sun) et trous de couverture.
//! - Export iCalendar, imports/exports CSV et JSON.
//! - Tout instant en UTC ; semaines alignées sur la relève locale du roster.

pub mod background;
pub mod calendar;
pub mod config;
pub mod context;
pub mod coverage;
pub mod error;
pub mod handoff;
pub mod io;
pub mod model;
pub mod resolver;
pub mod scheduler;
pub mod storage;
pub mod timeutil;
pub mod worker;

pub use background::{BackgroundQueue, JobOutcome, JobReport, SubmitError};
pub use calendar::{render_calendar, CalendarExporter};
pub use config::Settings;
pub use context::CallContext;
pub use coverage::{CoverageAnalyzer, CoverageReport, CoverageSlot, GapInfo, RosterCoverage};
pub use error::{Error, Result};
pub use handoff::{HandoffEvent, HandoffRenderer, HandoffSink, HandoffTicker, TextHandoff};
pub use model::{
    HandoffDay, Member, NewOverride, NewRoster, Override, OverrideId, Roster, RosterId,
    RosterPatch, ScheduleEntry, User, UserId, WeekEdit,
};
pub use resolver::{Assignment, OnCall, OnCallResolver, Source};
pub use scheduler::{FairnessState, GenerateOptions, ScheduleGenerator};
pub use storage::RosterRepository;
pub use worker::{topup_tenants, Tenant, TopupReport};
