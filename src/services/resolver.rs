use crate::clock::Clock;
use crate::error::AppError;
use crate::models::ResolvedGuess;
use crate::services::guess_engine::{GuessEngine, COOLDOWN_NOT_PASSED};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Published after a scheduled resolution succeeds
#[derive(Debug, Clone)]
pub struct ResolutionNotice {
    pub player_id: Uuid,
    pub guess: ResolvedGuess,
}

/// Exponential retry schedule
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    /// Delay after the given zero-based failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        self.base.saturating_mul(multiplier).min(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2,
            cap: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

/// Resolves pending guesses once their cooldown has elapsed.
///
/// The engine's cooldown check stays authoritative; the scheduler only picks
/// when to ask and keeps asking with backoff while the answer is "too early"
/// or the price/store call fails.
pub struct ResolutionScheduler {
    engine: Arc<GuessEngine>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    tx: broadcast::Sender<ResolutionNotice>,
}

impl ResolutionScheduler {
    /// Create a scheduler sharing the engine's clock
    pub fn new(engine: Arc<GuessEngine>) -> Self {
        let (tx, _) = broadcast::channel(256);
        let clock = engine.clock();

        Self {
            engine,
            clock,
            backoff: Backoff::default(),
            tx,
        }
    }

    /// Set retry schedule
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Receive notices for every guess this scheduler resolves
    pub fn subscribe(&self) -> broadcast::Receiver<ResolutionNotice> {
        self.tx.subscribe()
    }

    /// Spawn a task that resolves the player's guess at `resolvable_at`
    pub fn schedule(self: &Arc<Self>, player_id: Uuid, resolvable_at: DateTime<Utc>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let wait = (resolvable_at - scheduler.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        debug!("Scheduling resolution for {} in {:?}", player_id, wait);

        tokio::spawn(async move {
            time::sleep(wait).await;
            scheduler.resolve_with_retry(player_id).await;
        })
    }

    /// Try to resolve until success, a terminal domain answer, or the
    /// attempt budget runs out.
    pub async fn resolve_with_retry(&self, player_id: Uuid) -> Option<ResolvedGuess> {
        let id = player_id.to_string();

        for attempt in 0..self.backoff.max_attempts {
            match self.engine.resolve_guess(&id).await {
                Ok(guess) => {
                    info!("Auto-resolved guess {} for {}", guess.guess.guess_id, player_id);
                    // No receivers is fine
                    let _ = self.tx.send(ResolutionNotice {
                        player_id,
                        guess: guess.clone(),
                    });
                    return Some(guess);
                }
                Err(AppError::Conflict(msg)) if msg == COOLDOWN_NOT_PASSED => {
                    debug!("Guess for {} still cooling down", player_id);
                }
                Err(err) if err.is_domain() => {
                    // Resolved by the client already, or the player is gone
                    debug!("Nothing to auto-resolve for {}: {}", player_id, err);
                    return None;
                }
                Err(err) => {
                    warn!(
                        "Auto-resolve for {} failed (attempt {}/{}): {}",
                        player_id,
                        attempt + 1,
                        self.backoff.max_attempts,
                        err
                    );
                }
            }

            if attempt + 1 < self.backoff.max_attempts {
                time::sleep(self.backoff.delay(attempt)).await;
            }
        }

        warn!("Giving up auto-resolving guess for {}", player_id);
        None
    }
}
