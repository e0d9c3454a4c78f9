//! Réglages du binaire : fichier TOML optionnel, puis variables
//! d'environnement, puis drapeaux de la ligne de commande.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Variable d'environnement qui remplace le chemin de la base.
pub const DB_ENV: &str = "RELEVE_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base SQLite du tenant.
    pub database: PathBuf,
    /// Pas de la matrice de couverture, en minutes.
    pub coverage_resolution_minutes: i64,
    pub ticker_interval_secs: u64,
    pub queue_capacity: usize,
    /// Durée du bail de génération, en secondes.
    pub lease_ttl_secs: i64,
    /// Filtre `tracing` utilisé quand `RUST_LOG` est absent.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("releve.db"),
            coverage_resolution_minutes: crate::coverage::DEFAULT_RESOLUTION_MINUTES,
            ticker_interval_secs: 60,
            queue_capacity: 64,
            lease_ttl_secs: 300,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Charge `path` s'il est donné, applique `RELEVE_DB` et valide.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let settings = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let settings = settings.with_db_override(std::env::var(DB_ENV).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    fn with_db_override(mut self, db: Option<String>) -> Self {
        if let Some(db) = db.filter(|s| !s.trim().is_empty()) {
            self.database = PathBuf::from(db);
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.coverage_resolution_minutes < 1 {
            bail!("coverage_resolution_minutes must be at least 1");
        }
        if self.ticker_interval_secs == 0 {
            bail!("ticker_interval_secs must be greater than 0");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }
        if self.lease_ttl_secs < 1 {
            bail!("lease_ttl_secs must be at least 1");
        }
        Ok(())
    }

    pub fn coverage_resolution(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.coverage_resolution_minutes)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_secs)
    }

    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs)
    }
}
