//! Domain models for the guessing game.
//!
//! A `Player` owns an ordered list of `Guess` values; each guess is either
//! pending or resolved.

pub mod guess;
pub mod player;

// Re-export all models for convenient access
pub use guess::{cooldown, Direction, Guess, Outcome, PendingGuess, ResolvedGuess, COOLDOWN_MS};
pub use player::Player;
