//! Guessr Backend Library
//!
//! BTC up/down guessing game: players guess whether the price will rise or
//! fall, and each guess is scored once at least a minute has passed.

pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod price_source;
pub mod repositories;
pub mod services;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use price_source::PriceSource;
use repositories::PlayerStore;
use services::{GuessEngine, SessionService};
use std::sync::Arc;

/// Application state shared by every transport
pub struct AppState {
    pub store: Arc<dyn PlayerStore>,
    pub prices: Arc<dyn PriceSource>,
    pub engine: Arc<GuessEngine>,
    pub session: Arc<SessionService>,
}

impl AppState {
    /// Wire the engine and session facade over the given collaborators
    pub fn new(store: Arc<dyn PlayerStore>, prices: Arc<dyn PriceSource>) -> Self {
        let engine = Arc::new(GuessEngine::new(store.clone(), prices.clone()));
        Self::from_engine(store, prices, engine)
    }

    /// Use a pre-configured engine (custom clock or ids)
    pub fn from_engine(
        store: Arc<dyn PlayerStore>,
        prices: Arc<dyn PriceSource>,
        engine: Arc<GuessEngine>,
    ) -> Self {
        let session = Arc::new(SessionService::new(engine.clone()));

        Self {
            store,
            prices,
            engine,
            session,
        }
    }
}
