#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use guessr_backend::clock::{IdGenerator, ManualClock};
use guessr_backend::error::{AppError, AppResult, RepositoryError};
use guessr_backend::models::{Direction, Guess, PendingGuess, Player};
use guessr_backend::price_source::PriceSource;
use guessr_backend::repositories::{InMemoryPlayerRepository, PlayerStore, RepoResult};
use guessr_backend::services::{GuessEngine, SessionService};
use guessr_backend::AppState;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

/// Fixed starting instant for every test clock
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn price(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

/// Price source returning whatever the test last set
pub struct FakePriceSource {
    price: Mutex<Decimal>,
    fail: AtomicBool,
    calls: AtomicUsize,
    /// The first `n` calls wait at the barrier before returning
    gate: Option<(Arc<Barrier>, usize)>,
}

impl FakePriceSource {
    pub fn new(initial: Decimal) -> Self {
        Self {
            price: Mutex::new(initial),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Hold the first `n` callers until all of them have arrived
    pub fn gated(initial: Decimal, n: usize) -> Self {
        Self {
            gate: Some((Arc::new(Barrier::new(n)), n)),
            ..Self::new(initial)
        }
    }

    pub fn set(&self, value: Decimal) {
        *self.price.lock().unwrap() = value;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePriceSource {
    async fn get_price(&self) -> AppResult<Decimal> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some((barrier, n)) = &self.gate {
            if call < *n {
                barrier.wait().await;
            }
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("ticker unreachable".to_string()));
        }
        Ok(*self.price.lock().unwrap())
    }
}

/// Store whose every call fails as if the database were down
pub struct UnavailableStore;

#[async_trait]
impl PlayerStore for UnavailableStore {
    async fn get(&self, _player_id: Uuid) -> RepoResult<Option<Player>> {
        Err(RepositoryError::Query(sqlx::Error::PoolTimedOut))
    }

    async fn create(&self, _player: &Player) -> RepoResult<()> {
        Err(RepositoryError::Query(sqlx::Error::PoolTimedOut))
    }

    async fn update(&self, _player: &Player) -> RepoResult<()> {
        Err(RepositoryError::Query(sqlx::Error::PoolTimedOut))
    }

    async fn compare_and_swap(&self, _player: &Player, _expected: &[Guess]) -> RepoResult<bool> {
        Err(RepositoryError::Query(sqlx::Error::PoolTimedOut))
    }
}

/// Deterministic ids: 00000000-0000-0000-0000-000000000001, ...02, ...
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Uuid {
        Uuid::from_u128(self.next.fetch_add(1, Ordering::SeqCst) as u128 + 1)
    }
}

/// Engine wired to in-memory collaborators with a pinned clock
pub struct TestContext {
    pub store: Arc<InMemoryPlayerRepository>,
    pub prices: Arc<FakePriceSource>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<GuessEngine>,
    pub session: Arc<SessionService>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_prices(FakePriceSource::new(price(50000)))
    }

    pub fn with_prices(prices: FakePriceSource) -> Self {
        let store = Arc::new(InMemoryPlayerRepository::new());
        let prices = Arc::new(prices);
        let clock = Arc::new(ManualClock::new(epoch()));

        let engine = Arc::new(
            GuessEngine::new(store.clone(), prices.clone())
                .with_clock(clock.clone())
                .with_ids(Arc::new(SequentialIds::default())),
        );
        let state = AppState::from_engine(store.clone(), prices.clone(), engine.clone());

        Self {
            store,
            prices,
            clock,
            engine,
            session: state.session,
        }
    }

    /// Move the clock past the cooldown of any guess made before the call
    pub fn wait_cooldown(&self) {
        self.clock.advance(Duration::milliseconds(60_000));
    }

    pub async fn stored(&self, player_id: Uuid) -> Player {
        self.store
            .get(player_id)
            .await
            .expect("store read failed")
            .expect("player missing")
    }
}

/// Insert a player directly, bypassing the engine
pub async fn seed_player(store: &InMemoryPlayerRepository, guesses: Vec<Guess>) -> Player {
    let player = Player {
        player_id: Uuid::new_v4(),
        created_at: epoch(),
        guesses,
    };
    store.create(&player).await.expect("Failed to seed player");
    player
}

pub fn pending_up_at(created_at: DateTime<Utc>, reference: Decimal) -> Guess {
    Guess::Pending(PendingGuess::new(
        Uuid::new_v4(),
        created_at,
        reference,
        Direction::Up,
    ))
}
