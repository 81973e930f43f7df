use super::{PlayerStore, RepoResult};
use crate::error::RepositoryError;
use crate::models::{Guess, Player};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct PlayerRow {
    player_id: Uuid,
    created_at: DateTime<Utc>,
    guesses: Json<Vec<Guess>>,
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Self {
        Self {
            player_id: row.player_id,
            created_at: row.created_at,
            guesses: row.guesses.0,
        }
    }
}

/// Postgres-backed player store
pub struct PlayerRepository {
    pool: PgPool,
}

impl PlayerRepository {
    /// Create a new PlayerRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerStore for PlayerRepository {
    async fn get(&self, player_id: Uuid) -> RepoResult<Option<Player>> {
        let row = sqlx::query_as::<_, PlayerRow>(
            r#"
            SELECT player_id, created_at, guesses
            FROM players
            WHERE player_id = $1
            "#,
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Player::from))
    }

    async fn create(&self, player: &Player) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO players (player_id, created_at, guesses)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(player.player_id)
        .bind(player.created_at)
        .bind(Json(&player.guesses))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, player: &Player) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE players
            SET created_at = $2, guesses = $3
            WHERE player_id = $1
            "#,
        )
        .bind(player.player_id)
        .bind(player.created_at)
        .bind(Json(&player.guesses))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!(
                "player {}",
                player.player_id
            )));
        }

        Ok(())
    }

    async fn compare_and_swap(&self, player: &Player, expected: &[Guess]) -> RepoResult<bool> {
        // jsonb equality is structural, so number formatting differences
        // between the stored and re-encoded documents do not matter.
        let result = sqlx::query(
            r#"
            UPDATE players
            SET created_at = $2, guesses = $3
            WHERE player_id = $1 AND guesses = $4
            "#,
        )
        .bind(player.player_id)
        .bind(player.created_at)
        .bind(Json(&player.guesses))
        .bind(Json(expected))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing player
        match self.get(player.player_id).await? {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!(
                "player {}",
                player.player_id
            ))),
        }
    }
}
