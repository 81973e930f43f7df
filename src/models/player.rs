use super::guess::{cooldown, Guess, Outcome, PendingGuess};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Player record. Owns its guesses in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub guesses: Vec<Guess>,
}

impl Player {
    /// Create a player with no guesses
    pub fn new(player_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            player_id,
            created_at,
            guesses: Vec::new(),
        }
    }

    /// The unresolved guess, found by scanning every entry
    pub fn pending_guess(&self) -> Option<&PendingGuess> {
        self.guesses.iter().find_map(Guess::as_pending)
    }

    pub fn has_pending_guess(&self) -> bool {
        self.guesses.iter().any(Guess::is_pending)
    }

    /// A player may place a new guess only when nothing is pending
    pub fn can_play(&self) -> bool {
        !self.has_pending_guess()
    }

    /// Running score: number of winning resolved guesses
    pub fn score(&self) -> usize {
        self.guesses
            .iter()
            .filter(|guess| guess.outcome() == Some(Outcome::Win))
            .count()
    }

    /// Structural and invariant checks on a record, independent of storage
    pub fn validate(&self) -> Result<(), String> {
        let pending = self.guesses.iter().filter(|g| g.is_pending()).count();
        if pending > 1 {
            return Err(format!(
                "Player {} has {} pending guesses",
                self.player_id, pending
            ));
        }

        let mut seen = HashSet::with_capacity(self.guesses.len());
        for guess in &self.guesses {
            if !seen.insert(guess.guess_id()) {
                return Err(format!("Duplicate guess id {}", guess.guess_id()));
            }

            if let Guess::Resolved(resolved) = guess {
                if resolved.resolved_at < resolved.guess.created_at + cooldown() {
                    return Err(format!(
                        "Guess {} resolved before its cooldown elapsed",
                        guess.guess_id()
                    ));
                }
            }
        }

        Ok(())
    }
}
