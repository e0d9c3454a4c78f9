use thiserror::Error;

/// Erreurs du moteur d'astreinte.
///
/// La taxonomie suit ce que l'appelant doit en faire : une erreur de
/// validation ou un `NotFound` remonte au client tel quel, une erreur de
/// persistance est interne (l'appelant peut réessayer), un conflit signale
/// une génération déjà en cours ou une dépendance restante.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("operation cancelled: {0}")]
    Cancelled(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found<S: ToString>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Vrai pour les erreurs imputables à l'entrée de l'appelant.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound { .. } | Self::Conflict(_)
        )
    }

    /// Statut HTTP équivalent, pour les collaborateurs qui portent le transport.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Cancelled(_) => 499,
            Self::Persistence { .. } | Self::Other(_) => 500,
        }
    }
}

/// Équivalent de `anyhow::Context` pour les erreurs SQLite.
pub trait PersistContext<T> {
    fn persist_ctx<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> PersistContext<T> for rusqlite::Result<T> {
    fn persist_ctx<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| Error::Persistence {
            context: f().into(),
            source,
        })
    }
}
