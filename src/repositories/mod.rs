//! Player persistence.
//!
//! `PlayerStore` is the seam the guess engine depends on. Players are stored
//! whole, with their guesses embedded as an ordered list.

pub mod memory;
pub mod player_repository;

pub use memory::InMemoryPlayerRepository;
pub use player_repository::PlayerRepository;

use crate::error::RepositoryError;
use crate::models::{Guess, Player};
use async_trait::async_trait;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Durable keyed storage for player records
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Fetch a player, `None` if unknown
    async fn get(&self, player_id: Uuid) -> RepoResult<Option<Player>>;

    /// Insert a new player record
    async fn create(&self, player: &Player) -> RepoResult<()>;

    /// Replace the full record keyed by `player.player_id`
    async fn update(&self, player: &Player) -> RepoResult<()>;

    /// Replace the full record only if the stored guesses still equal
    /// `expected`. Returns `false` when another writer got there first.
    async fn compare_and_swap(&self, player: &Player, expected: &[Guess]) -> RepoResult<bool>;
}
