use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Minimum time between placing a guess and resolving it, in milliseconds
pub const COOLDOWN_MS: i64 = 60_000;

/// Cooldown as a chrono duration
pub fn cooldown() -> Duration {
    Duration::milliseconds(COOLDOWN_MS)
}

/// Predicted price movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Up wins only on a strictly higher price, Down only on a strictly
    /// lower one. An unchanged price loses either way.
    pub fn judge(&self, reference_price: Decimal, price: Decimal) -> Outcome {
        let won = match self {
            Direction::Up => price > reference_price,
            Direction::Down => price < reference_price,
        };

        if won {
            Outcome::Win
        } else {
            Outcome::Lose
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("Invalid direction: {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
}

/// A guess awaiting cooldown and resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingGuess {
    pub guess_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub reference_price: Decimal,
    pub direction: Direction,
}

impl PendingGuess {
    pub fn new(
        guess_id: Uuid,
        created_at: DateTime<Utc>,
        reference_price: Decimal,
        direction: Direction,
    ) -> Self {
        Self {
            guess_id,
            created_at,
            reference_price,
            direction,
        }
    }

    /// Earliest instant at which the guess may be resolved
    pub fn resolvable_at(&self) -> DateTime<Utc> {
        self.created_at + cooldown()
    }

    /// Inclusive: exactly one cooldown after creation is resolvable.
    pub fn is_resolvable(&self, now: DateTime<Utc>) -> bool {
        now >= self.resolvable_at()
    }

    /// Finalize the guess against `price`. Every pending field carries over.
    pub fn resolve(self, resolved_at: DateTime<Utc>, resolved_price: Decimal) -> ResolvedGuess {
        let outcome = self.direction.judge(self.reference_price, resolved_price);
        ResolvedGuess {
            guess: self,
            resolved_at,
            resolved_price,
            outcome,
        }
    }
}

/// A finalized guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGuess {
    #[serde(flatten)]
    pub guess: PendingGuess,
    pub resolved_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub resolved_price: Decimal,
    pub outcome: Outcome,
}

/// A guess in either lifecycle state. `Pending` is initial, `Resolved` is
/// terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Guess {
    Pending(PendingGuess),
    Resolved(ResolvedGuess),
}

impl Guess {
    fn fields(&self) -> &PendingGuess {
        match self {
            Guess::Pending(pending) => pending,
            Guess::Resolved(resolved) => &resolved.guess,
        }
    }

    pub fn guess_id(&self) -> Uuid {
        self.fields().guess_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.fields().created_at
    }

    pub fn reference_price(&self) -> Decimal {
        self.fields().reference_price
    }

    pub fn direction(&self) -> Direction {
        self.fields().direction
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Guess::Pending(_))
    }

    pub fn as_pending(&self) -> Option<&PendingGuess> {
        match self {
            Guess::Pending(pending) => Some(pending),
            Guess::Resolved(_) => None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Guess::Pending(_) => None,
            Guess::Resolved(resolved) => Some(resolved.outcome),
        }
    }
}

impl From<PendingGuess> for Guess {
    fn from(guess: PendingGuess) -> Self {
        Guess::Pending(guess)
    }
}

impl From<ResolvedGuess> for Guess {
    fn from(guess: ResolvedGuess) -> Self {
        Guess::Resolved(guess)
    }
}
