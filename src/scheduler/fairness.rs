use crate::model::UserId;
use std::collections::HashMap;

/// Compteurs d'un membre actif.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub user: UserId,
    pub primary: u32,
    pub secondary: u32,
}

/// État d'équité d'une passe de génération.
///
/// Il est avancé semaine par semaine avec [`FairnessState::after_week`] :
/// chaque sélection dépend de toutes les semaines précédentes, dans l'ordre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FairnessState {
    tallies: Vec<Tally>,
    last_primary: Option<UserId>,
    consecutive: u32,
    max_consecutive: u32,
}

impl FairnessState {
    /// Compteurs à zéro, dans l'ordre de la liste des membres.
    pub fn new(members: &[UserId], max_consecutive: u32) -> Self {
        Self::seeded(members, &HashMap::new(), &HashMap::new(), max_consecutive)
    }

    /// Compteurs initialisés depuis l'historique ; les utilisateurs absents de
    /// `members` sont ignorés.
    pub fn seeded(
        members: &[UserId],
        primary: &HashMap<UserId, u32>,
        secondary: &HashMap<UserId, u32>,
        max_consecutive: u32,
    ) -> Self {
        let tallies = members
            .iter()
            .map(|user| Tally {
                user: *user,
                primary: primary.get(user).copied().unwrap_or(0),
                secondary: secondary.get(user).copied().unwrap_or(0),
            })
            .collect();
        Self {
            tallies,
            last_primary: None,
            consecutive: 0,
            max_consecutive,
        }
    }

    /// Reprend la chaîne de semaines consécutives en primaire.
    pub fn with_chain(mut self, last_primary: Option<UserId>, consecutive: u32) -> Self {
        self.last_primary = last_primary;
        self.consecutive = if last_primary.is_some() { consecutive } else { 0 };
        self
    }

    pub fn tallies(&self) -> &[Tally] {
        &self.tallies
    }

    pub fn tally(&self, user: UserId) -> Option<&Tally> {
        self.tallies.iter().find(|t| t.user == user)
    }

    pub fn last_primary(&self) -> Option<UserId> {
        self.last_primary
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    fn blocked(&self, user: UserId) -> bool {
        self.last_primary == Some(user) && self.consecutive >= self.max_consecutive
    }

    /// Membre le moins servi en primaire qui ne dépasse pas le plafond de
    /// semaines consécutives ; à égalité, le premier de la liste.
    ///
    /// Si tout le monde est bloqué (roster à un seul membre), le plafond est
    /// levé.
    pub fn pick_primary(&self) -> Option<UserId> {
        self.tallies
            .iter()
            .filter(|t| !self.blocked(t.user))
            .min_by_key(|t| t.primary)
            .or_else(|| self.tallies.iter().min_by_key(|t| t.primary))
            .map(|t| t.user)
    }

    /// Membre le moins chargé (primaire + secondaire) hors primaire.
    pub fn pick_secondary(&self, primary: UserId) -> Option<UserId> {
        if self.tallies.len() < 2 {
            return None;
        }
        self.tallies
            .iter()
            .filter(|t| t.user != primary)
            .min_by_key(|t| t.primary + t.secondary)
            .map(|t| t.user)
    }

    /// État après une semaine attribuée (générée ou verrouillée).
    pub fn after_week(mut self, primary: Option<UserId>, secondary: Option<UserId>) -> Self {
        match primary {
            Some(p) => {
                if let Some(t) = self.tallies.iter_mut().find(|t| t.user == p) {
                    t.primary += 1;
                }
                if self.last_primary == Some(p) {
                    self.consecutive += 1;
                } else {
                    self.last_primary = Some(p);
                    self.consecutive = 1;
                }
            }
            None => {
                self.last_primary = None;
                self.consecutive = 0;
            }
        }
        if let Some(s) = secondary {
            if let Some(t) = self.tallies.iter_mut().find(|t| t.user == s) {
                t.secondary += 1;
            }
        }
        self
    }
}
