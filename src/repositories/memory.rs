use super::{PlayerStore, RepoResult};
use crate::error::RepositoryError;
use crate::models::{Guess, Player};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory player store.
///
/// Used when no database is configured and throughout the test suite.
#[derive(Default, Clone)]
pub struct InMemoryPlayerRepository {
    players: Arc<RwLock<HashMap<Uuid, Player>>>,
}

impl InMemoryPlayerRepository {
    /// Creates a new, empty in-memory player store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored players
    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }
}

#[async_trait]
impl PlayerStore for InMemoryPlayerRepository {
    async fn get(&self, player_id: Uuid) -> RepoResult<Option<Player>> {
        let players = self.players.read().await;
        Ok(players.get(&player_id).cloned())
    }

    async fn create(&self, player: &Player) -> RepoResult<()> {
        let mut players = self.players.write().await;
        if players.contains_key(&player.player_id) {
            return Err(RepositoryError::Duplicate(format!(
                "player {} already exists",
                player.player_id
            )));
        }
        players.insert(player.player_id, player.clone());
        Ok(())
    }

    async fn update(&self, player: &Player) -> RepoResult<()> {
        let mut players = self.players.write().await;
        match players.get_mut(&player.player_id) {
            Some(stored) => {
                *stored = player.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!(
                "player {}",
                player.player_id
            ))),
        }
    }

    async fn compare_and_swap(&self, player: &Player, expected: &[Guess]) -> RepoResult<bool> {
        let mut players = self.players.write().await;
        match players.get_mut(&player.player_id) {
            Some(stored) if stored.guesses.as_slice() == expected => {
                *stored = player.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!(
                "player {}",
                player.player_id
            ))),
        }
    }
}
