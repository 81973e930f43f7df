use crate::clock::{Clock, IdGenerator, RandomIds, SystemClock};
use crate::error::{AppError, AppResult};
use crate::models::{Direction, Guess, PendingGuess, Player, ResolvedGuess};
use crate::price_source::PriceSource;
use crate::repositories::PlayerStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MISSING_PLAYER_ID: &str = "missing playerId";
pub const MISSING_DIRECTION: &str = "missing direction";
pub const PLAYER_NOT_FOUND: &str = "player doesn't exist";
pub const ALREADY_PENDING: &str = "already has a pending guess";
pub const NOTHING_TO_RESOLVE: &str = "no pending guess to resolve";
pub const COOLDOWN_NOT_PASSED: &str = "cooldown not passed";
pub const CONCURRENT_UPDATE: &str = "concurrent update";

/// Read-validate-write attempts before giving up on a contended player
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Rules for creating and resolving guesses.
///
/// Holds no player state of its own. Every operation reads the player from
/// the store, validates, and writes back with a compare-and-swap on the
/// guess list, so two racing requests for one player cannot both leave a
/// pending guess behind.
pub struct GuessEngine {
    store: Arc<dyn PlayerStore>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl GuessEngine {
    /// Create an engine using the wall clock and random UUIDs
    pub fn new(store: Arc<dyn PlayerStore>, prices: Arc<dyn PriceSource>) -> Self {
        Self {
            store,
            prices,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id source
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Create and persist a player with no guesses
    pub async fn create_player(&self) -> AppResult<Player> {
        let player = Player::new(self.ids.next_id(), self.clock.now());
        self.store.create(&player).await?;

        info!("Created player {}", player.player_id);
        Ok(player)
    }

    /// Fetch a player. Unknown ids are `Ok(None)`, not an error.
    pub async fn get_player(&self, player_id: &str) -> AppResult<Option<Player>> {
        match parse_player_id(player_id)? {
            Some(id) => Ok(self.store.get(id).await?),
            None => Ok(None),
        }
    }

    /// Place a guess at the current price
    pub async fn make_guess(&self, player_id: &str, direction: &str) -> AppResult<PendingGuess> {
        let id = parse_player_id(player_id)?;
        let direction: Direction = direction
            .parse()
            .map_err(|_| AppError::Validation(MISSING_DIRECTION.to_string()))?;
        let id = id.ok_or_else(|| AppError::NotFound(PLAYER_NOT_FOUND.to_string()))?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let player = self.load(id).await?;

            if player.has_pending_guess() {
                debug!("Rejected guess for {}: already pending", id);
                return Err(AppError::Conflict(ALREADY_PENDING.to_string()));
            }

            let price = self.prices.get_price().await?;
            let guess = PendingGuess::new(self.ids.next_id(), self.clock.now(), price, direction);

            let mut updated = player.clone();
            updated.guesses.push(Guess::Pending(guess.clone()));
            updated.validate().map_err(AppError::Message)?;

            if self.store.compare_and_swap(&updated, &player.guesses).await? {
                info!(
                    "Player {} guessed {} from {} (guess {})",
                    id, direction, price, guess.guess_id
                );
                return Ok(guess);
            }

            warn!(
                "Player {} changed while placing a guess (attempt {}/{})",
                id, attempt, MAX_WRITE_ATTEMPTS
            );
        }

        Err(AppError::Conflict(CONCURRENT_UPDATE.to_string()))
    }

    /// Resolve the player's pending guess against the current price
    pub async fn resolve_guess(&self, player_id: &str) -> AppResult<ResolvedGuess> {
        let id = parse_player_id(player_id)?
            .ok_or_else(|| AppError::NotFound(PLAYER_NOT_FOUND.to_string()))?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let player = self.load(id).await?;

            let pending = player
                .pending_guess()
                .cloned()
                .ok_or_else(|| AppError::Conflict(NOTHING_TO_RESOLVE.to_string()))?;

            let now = self.clock.now();
            if !pending.is_resolvable(now) {
                debug!(
                    "Guess {} not resolvable until {}",
                    pending.guess_id,
                    pending.resolvable_at()
                );
                return Err(AppError::Conflict(COOLDOWN_NOT_PASSED.to_string()));
            }

            let price = self.prices.get_price().await?;
            let resolved_at = self.clock.now().max(now);
            let resolved = pending.clone().resolve(resolved_at, price);

            let mut updated = player.clone();
            for guess in updated.guesses.iter_mut() {
                if guess.guess_id() == pending.guess_id {
                    *guess = Guess::Resolved(resolved.clone());
                }
            }
            updated.validate().map_err(AppError::Message)?;

            if self.store.compare_and_swap(&updated, &player.guesses).await? {
                info!(
                    "Resolved guess {} for {}: {:?} ({} -> {})",
                    pending.guess_id, id, resolved.outcome, pending.reference_price, price
                );
                return Ok(resolved);
            }

            warn!(
                "Player {} changed while resolving (attempt {}/{})",
                id, attempt, MAX_WRITE_ATTEMPTS
            );
        }

        Err(AppError::Conflict(CONCURRENT_UPDATE.to_string()))
    }

    /// Current price of the tracked asset
    pub async fn get_price(&self) -> AppResult<Decimal> {
        self.prices.get_price().await
    }

    async fn load(&self, id: Uuid) -> AppResult<Player> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(PLAYER_NOT_FOUND.to_string()))
    }
}

/// Empty ids are a caller error. Ids that are not UUIDs cannot name any
/// stored player, so they resolve to `None`.
fn parse_player_id(raw: &str) -> AppResult<Option<Uuid>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation(MISSING_PLAYER_ID.to_string()));
    }
    Ok(Uuid::parse_str(raw).ok())
}
